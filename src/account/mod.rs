//! Accounts: drip state, billing flags, and account endpoints.

pub mod model;
pub mod routes;

pub use model::{Account, AccountPatch, FieldUpdate};
