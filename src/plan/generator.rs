//! Plan generation — delegates text synthesis to a generative collaborator.
//!
//! The `PlanGenerator` trait is the seam: production uses `OpenAiGenerator`
//! (chat-completions JSON mode over HTTPS), tests swap in a canned generator.
//! The generator returns drafts; `validate_plan` decides whether they are
//! acceptable. A malformed response fails the whole onboarding transaction.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::{GeneratorConfig, PLAN_DAYS};
use crate::error::PlanGenerationError;
use crate::goals::model::{ExperienceStage, GoalCategory};
use crate::plan::model::PlanEntryDraft;

/// External generative collaborator producing a 14-day email course.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Generate drafts for the given goal. Non-retryable within the same
    /// request; callers surface the failure.
    async fn generate(
        &self,
        category: GoalCategory,
        goal_text: &str,
        stage: ExperienceStage,
    ) -> Result<Vec<PlanEntryDraft>, PlanGenerationError>;
}

/// Chat-completions backed generator.
pub struct OpenAiGenerator {
    config: GeneratorConfig,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, PlanGenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PlanGenerationError::RequestFailed(format!("client build failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn prompt(category: GoalCategory, goal_text: &str, stage: ExperienceStage) -> String {
        format!(
            "You are a personal coach helping someone achieve their goal. \
             Create a {PLAN_DAYS}-day email course.\n\n\
             Goal: {goal_text}\n\
             Category: {category}\n\
             Level: {stage}\n\n\
             Generate exactly {PLAN_DAYS} emails. For each email provide:\n\
             1. subject: Engaging subject line (max 60 chars)\n\
             2. preview: Short preview for the paywall (2-3 sentences, ~100 chars)\n\
             3. content: Full email content (200-300 words, motivational and actionable)\n\n\
             Return a JSON object {{\"emails\": [...]}} where each element has: \
             day_number, subject, preview, content.\n\n\
             Focus on:\n\
             - Day 1-3: Foundation and mindset\n\
             - Day 4-7: Building habits and momentum\n\
             - Day 8-10: Overcoming obstacles\n\
             - Day 11-14: Mastery and next steps\n\n\
             Make it personal, actionable, and encouraging."
        )
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmailsEnvelope {
    emails: Vec<PlanEntryDraft>,
}

#[async_trait]
impl PlanGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        category: GoalCategory,
        goal_text: &str,
        stage: ExperienceStage,
    ) -> Result<Vec<PlanEntryDraft>, PlanGenerationError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an expert personal development coach. Return only valid JSON.",
                },
                {
                    "role": "user",
                    "content": Self::prompt(category, goal_text, stage),
                },
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.api_base))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| PlanGenerationError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlanGenerationError::RequestFailed(format!(
                "generator returned status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PlanGenerationError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| {
                PlanGenerationError::InvalidResponse("empty completion".to_string())
            })?;

        parse_drafts(content)
    }
}

/// Parse the model's JSON output into drafts.
///
/// Accepts either `{"emails": [...]}` or a bare array.
pub fn parse_drafts(content: &str) -> Result<Vec<PlanEntryDraft>, PlanGenerationError> {
    if let Ok(envelope) = serde_json::from_str::<EmailsEnvelope>(content) {
        return Ok(envelope.emails);
    }
    serde_json::from_str::<Vec<PlanEntryDraft>>(content)
        .map_err(|e| PlanGenerationError::InvalidResponse(e.to_string()))
}
