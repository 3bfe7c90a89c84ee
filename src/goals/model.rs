//! Goal model — a user's tracked objective.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConflictError, ValidationError};

/// Maximum goal text length in characters.
pub const GOAL_TEXT_MAX: usize = 200;

/// Goal category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Health,
    Relationships,
    Career,
    Money,
    Business,
    Learning,
    Productivity,
    Creativity,
}

impl std::str::FromStr for GoalCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "health" => Ok(Self::Health),
            "relationships" => Ok(Self::Relationships),
            "career" => Ok(Self::Career),
            "money" => Ok(Self::Money),
            "business" => Ok(Self::Business),
            "learning" => Ok(Self::Learning),
            "productivity" => Ok(Self::Productivity),
            "creativity" => Ok(Self::Creativity),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

impl std::fmt::Display for GoalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Health => "health",
            Self::Relationships => "relationships",
            Self::Career => "career",
            Self::Money => "money",
            Self::Business => "business",
            Self::Learning => "learning",
            Self::Productivity => "productivity",
            Self::Creativity => "creativity",
        };
        write!(f, "{s}")
    }
}

/// How far along the user already is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceStage {
    JustStarted,
    Intermediate,
    Advanced,
}

impl std::str::FromStr for ExperienceStage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "just_started" => Ok(Self::JustStarted),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(ValidationError::UnknownStage(other.to_string())),
        }
    }
}

impl std::fmt::Display for ExperienceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::JustStarted => "just_started",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        write!(f, "{s}")
    }
}

/// A goal created at onboarding.
///
/// At most one of `completed_at`/`cancelled_at` is ever set; once either is,
/// the goal is terminal and immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub account_id: Uuid,
    pub category: GoalCategory,
    pub goal_text: String,
    pub stage: ExperienceStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Goal {
    pub fn new(
        account_id: Uuid,
        category: GoalCategory,
        goal_text: impl Into<String>,
        stage: ExperienceStage,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            category,
            goal_text: goal_text.into(),
            stage,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            is_active: true,
        }
    }

    /// Whether this goal has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.completed_at.is_some() || self.cancelled_at.is_some()
    }

    /// Guard mutations: terminal goals reject edits, completion, cancellation.
    pub fn ensure_mutable(&self) -> Result<(), ConflictError> {
        if self.completed_at.is_some() {
            return Err(ConflictError {
                goal_id: self.id,
                state: "completed",
            });
        }
        if self.cancelled_at.is_some() {
            return Err(ConflictError {
                goal_id: self.id,
                state: "cancelled",
            });
        }
        Ok(())
    }
}

/// Validate and normalize a goal text field.
pub fn validate_goal_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() > GOAL_TEXT_MAX {
        return Err(ValidationError::GoalTextLength { max: GOAL_TEXT_MAX });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_roundtrip() {
        for name in [
            "health",
            "relationships",
            "career",
            "money",
            "business",
            "learning",
            "productivity",
            "creativity",
        ] {
            let cat: GoalCategory = name.parse().unwrap();
            assert_eq!(cat.to_string(), name);
        }
        assert!("cooking".parse::<GoalCategory>().is_err());
    }

    #[test]
    fn stage_roundtrip() {
        for name in ["just_started", "intermediate", "advanced"] {
            let stage: ExperienceStage = name.parse().unwrap();
            assert_eq!(stage.to_string(), name);
        }
        assert!("expert".parse::<ExperienceStage>().is_err());
    }

    #[test]
    fn new_goal_is_mutable() {
        let goal = Goal::new(
            Uuid::new_v4(),
            GoalCategory::Learning,
            "Learn Rust",
            ExperienceStage::JustStarted,
        );
        assert!(!goal.is_terminal());
        assert!(goal.ensure_mutable().is_ok());
    }

    #[test]
    fn completed_goal_rejects_mutation() {
        let mut goal = Goal::new(
            Uuid::new_v4(),
            GoalCategory::Health,
            "Run a marathon",
            ExperienceStage::Intermediate,
        );
        goal.completed_at = Some(Utc::now());
        goal.is_active = false;

        let err = goal.ensure_mutable().unwrap_err();
        assert_eq!(err.state, "completed");
    }

    #[test]
    fn cancelled_goal_rejects_mutation() {
        let mut goal = Goal::new(
            Uuid::new_v4(),
            GoalCategory::Money,
            "Save for a house",
            ExperienceStage::Advanced,
        );
        goal.cancelled_at = Some(Utc::now());

        let err = goal.ensure_mutable().unwrap_err();
        assert_eq!(err.state, "cancelled");
    }

    #[test]
    fn goal_text_validation() {
        assert_eq!(validate_goal_text("  Learn Rust  ").unwrap(), "Learn Rust");
        assert!(validate_goal_text("   ").is_err());
        assert!(validate_goal_text(&"x".repeat(201)).is_err());
        assert!(validate_goal_text(&"x".repeat(200)).is_ok());
    }
}
