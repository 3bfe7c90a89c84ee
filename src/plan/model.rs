//! Email plan model — the precomputed content sequence for a goal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PLAN_DAYS;
use crate::error::PlanGenerationError;

/// A single entry in a goal's email plan.
///
/// `sent_at` is stamped exactly once, by the send-and-advance cycle, and
/// never unset afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedEmail {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub day_number: u32,
    pub subject: String,
    /// Trial-safe preview text shown before the paywall.
    pub preview: String,
    pub content: String,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Raw entry as returned by the generative collaborator, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntryDraft {
    pub day_number: u32,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub content: String,
}

/// Validate a generated draft and materialize it into plan entries.
///
/// Requirements: exactly [`PLAN_DAYS`] entries, day numbers 1..=N contiguous
/// after sorting, and non-empty subject/preview/content on every entry.
pub fn validate_plan(
    goal_id: Uuid,
    mut drafts: Vec<PlanEntryDraft>,
) -> Result<Vec<PlannedEmail>, PlanGenerationError> {
    if drafts.len() != PLAN_DAYS as usize {
        return Err(PlanGenerationError::WrongEntryCount {
            expected: PLAN_DAYS as usize,
            got: drafts.len(),
        });
    }

    drafts.sort_by_key(|d| d.day_number);

    let mut entries = Vec::with_capacity(drafts.len());
    for (i, draft) in drafts.into_iter().enumerate() {
        let expected_day = i as u32 + 1;
        if draft.day_number != expected_day {
            return Err(PlanGenerationError::NonContiguousDays { position: i });
        }
        if draft.subject.trim().is_empty() {
            return Err(PlanGenerationError::MissingField {
                day: expected_day,
                field: "subject",
            });
        }
        if draft.preview.trim().is_empty() {
            return Err(PlanGenerationError::MissingField {
                day: expected_day,
                field: "preview",
            });
        }
        if draft.content.trim().is_empty() {
            return Err(PlanGenerationError::MissingField {
                day: expected_day,
                field: "content",
            });
        }

        entries.push(PlannedEmail {
            id: Uuid::new_v4(),
            goal_id,
            day_number: expected_day,
            subject: draft.subject.trim().to_string(),
            preview: draft.preview.trim().to_string(),
            content: draft.content.trim().to_string(),
            sent_at: None,
        });
    }

    Ok(entries)
}
