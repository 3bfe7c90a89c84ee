//! Persistence layer: the `Store` trait and its libSQL backend.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{EmailLogEntry, EmailLogStatus, Store};
