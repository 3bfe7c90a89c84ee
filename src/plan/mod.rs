//! Email plans: generation, validation, and fallback content.

pub mod content;
pub mod generator;
pub mod model;

pub use generator::{OpenAiGenerator, PlanGenerator};
pub use model::{PlanEntryDraft, PlannedEmail};
