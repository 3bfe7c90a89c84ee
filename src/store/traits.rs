//! Unified `Store` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::model::{Account, AccountPatch};
use crate::auth::magic_link::MagicLink;
use crate::error::DatabaseError;
use crate::goals::model::Goal;
use crate::plan::model::PlannedEmail;

/// Outcome of a single email send attempt, recorded in the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailLogStatus {
    Sent,
    Failed,
}

/// One immutable audit log row per send attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailLogEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub day_number: u32,
    pub subject: String,
    pub status: EmailLogStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EmailLogEntry {
    pub fn sent(account_id: Uuid, day_number: u32, subject: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            day_number,
            subject: subject.to_string(),
            status: EmailLogStatus::Sent,
            error: None,
            created_at: at,
        }
    }

    pub fn failed(
        account_id: Uuid,
        day_number: u32,
        subject: &str,
        error: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            day_number,
            subject: subject.to_string(),
            status: EmailLogStatus::Failed,
            error: Some(error),
            created_at: at,
        }
    }
}

/// Backend-agnostic persistence trait covering accounts, goals, plans,
/// magic links, and the email audit log.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Accounts ────────────────────────────────────────────────────

    async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError>;

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, DatabaseError>;

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError>;

    /// Delete an account and everything hanging off it (goals, plans,
    /// magic links, audit log) in one transaction.
    async fn delete_account(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Accounts due for a send at time `now`: scheduled, not cancelled,
    /// and within the trial allowance or subscribed. Pure read.
    async fn due_accounts(
        &self,
        now: DateTime<Utc>,
        trial_limit: u32,
    ) -> Result<Vec<Account>, DatabaseError>;

    /// Advance scheduling state after a successful delivery: one atomic
    /// UPDATE setting `emails_sent`, `last_email_sent_at`, `next_send_at`.
    /// The write only applies if the account is still at `emails_sent - 1`;
    /// a stale count errs rather than re-recording a send another writer
    /// already claimed.
    async fn record_send(
        &self,
        account_id: Uuid,
        emails_sent: u32,
        sent_at: DateTime<Utc>,
        next_send_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    /// Mark onboarding complete and schedule the first send.
    async fn complete_onboarding(
        &self,
        account_id: Uuid,
        first_send_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Apply a billing reconciliation patch as a single atomic UPDATE.
    /// Returns false if no such account exists.
    async fn apply_account_patch(
        &self,
        account_id: Uuid,
        patch: &AccountPatch,
    ) -> Result<bool, DatabaseError>;

    // ── Goals + plans ───────────────────────────────────────────────

    /// Insert a goal together with its full email plan, atomically.
    /// A goal must never exist without its plan, or vice versa.
    async fn insert_goal_with_plan(
        &self,
        goal: &Goal,
        entries: &[PlannedEmail],
    ) -> Result<(), DatabaseError>;

    async fn get_goal(&self, id: Uuid) -> Result<Option<Goal>, DatabaseError>;

    async fn list_goals(&self, account_id: Uuid) -> Result<Vec<Goal>, DatabaseError>;

    /// Persist edited category/text/stage on a non-terminal goal.
    async fn update_goal(&self, goal: &Goal) -> Result<(), DatabaseError>;

    /// One-way terminal transition: stamps `completed_at` or `cancelled_at`
    /// and clears `is_active`.
    async fn finish_goal(
        &self,
        id: Uuid,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Plan entry for the given day on the account's most recent active goal.
    async fn active_plan_entry(
        &self,
        account_id: Uuid,
        day_number: u32,
    ) -> Result<Option<PlannedEmail>, DatabaseError>;

    async fn list_plan_entries(&self, goal_id: Uuid) -> Result<Vec<PlannedEmail>, DatabaseError>;

    /// Stamp `sent_at` on a plan entry. Never unsets.
    async fn mark_plan_entry_sent(
        &self,
        entry_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Magic links ─────────────────────────────────────────────────

    /// Insert a fresh magic link, invalidating any prior ones for the
    /// same account.
    async fn replace_magic_link(&self, link: &MagicLink) -> Result<(), DatabaseError>;

    /// Consume a magic link: delete it and return it, if it existed.
    /// Expiry is the caller's concern — the token is gone either way.
    async fn take_magic_link(&self, token: &str) -> Result<Option<MagicLink>, DatabaseError>;

    // ── Email audit log ─────────────────────────────────────────────

    async fn insert_email_log(&self, entry: &EmailLogEntry) -> Result<(), DatabaseError>;

    async fn list_email_log(&self, account_id: Uuid) -> Result<Vec<EmailLogEntry>, DatabaseError>;
}
