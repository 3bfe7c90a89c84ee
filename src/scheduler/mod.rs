//! Drip scheduling: the send cycle, cron trigger, and background ticker.

pub mod cycle;
pub mod routes;
pub mod ticker;

pub use cycle::{CycleReport, DripCycle, SendOutcome};
