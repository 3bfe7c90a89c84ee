//! Authentication: magic links and cookie sessions.

pub mod magic_link;
pub mod routes;
pub mod session;

pub use magic_link::MagicLink;
