//! Goals: categories, lifecycle, and CRUD endpoints.

pub mod model;
pub mod routes;

pub use model::{ExperienceStage, Goal, GoalCategory};
