//! Dripcourse — subscription email-course service.

pub mod account;
pub mod auth;
pub mod billing;
pub mod config;
pub mod email;
pub mod error;
pub mod goals;
pub mod plan;
pub mod scheduler;
pub mod server;
pub mod store;
