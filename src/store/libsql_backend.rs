//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. All timestamps are stored
//! as fixed-width RFC 3339 TEXT so SQL comparisons match chronological order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::account::model::{Account, AccountPatch, FieldUpdate};
use crate::auth::magic_link::MagicLink;
use crate::error::DatabaseError;
use crate::goals::model::Goal;
use crate::plan::model::PlannedEmail;
use crate::store::migrations;
use crate::store::traits::{EmailLogEntry, EmailLogStatus, Store};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp write format: fixed-width RFC 3339 with nanoseconds,
/// so a stored timestamp round-trips without precision loss.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn opt_ts(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(ts(dt)),
        None => libsql::Value::Null,
    }
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Map a libsql Row to an Account. Column order matches ACCOUNT_COLUMNS.
fn row_to_account(row: &libsql::Row) -> Result<Account, libsql::Error> {
    let id: String = row.get(0)?;
    let email: String = row.get(1)?;
    let emails_sent: i64 = row.get(2)?;
    let next_send_at: Option<String> = row.get(3).ok();
    let is_cancelled: i64 = row.get(4)?;
    let has_subscribed: i64 = row.get(5)?;
    let subscription_id: Option<String> = row.get(6).ok();
    let customer_id: Option<String> = row.get(7).ok();
    let last_email_sent_at: Option<String> = row.get(8).ok();
    let onboarding_complete: i64 = row.get(9)?;
    let created_at: String = row.get(10)?;

    Ok(Account {
        id: parse_uuid(&id),
        email,
        emails_sent: emails_sent.max(0) as u32,
        next_send_at: parse_optional_datetime(&next_send_at),
        is_cancelled: is_cancelled != 0,
        has_subscribed: has_subscribed != 0,
        subscription_id,
        customer_id,
        last_email_sent_at: parse_optional_datetime(&last_email_sent_at),
        onboarding_complete: onboarding_complete != 0,
        created_at: parse_datetime(&created_at),
    })
}

/// Map a libsql Row to a Goal. Column order matches GOAL_COLUMNS.
fn row_to_goal(row: &libsql::Row) -> Result<Goal, DatabaseError> {
    let get = |e: libsql::Error| DatabaseError::Query(format!("goal row parse: {e}"));

    let id: String = row.get(0).map_err(get)?;
    let account_id: String = row.get(1).map_err(get)?;
    let category: String = row.get(2).map_err(get)?;
    let goal_text: String = row.get(3).map_err(get)?;
    let stage: String = row.get(4).map_err(get)?;
    let created_at: String = row.get(5).map_err(get)?;
    let updated_at: String = row.get(6).map_err(get)?;
    let completed_at: Option<String> = row.get(7).ok();
    let cancelled_at: Option<String> = row.get(8).ok();
    let is_active: i64 = row.get(9).map_err(get)?;

    Ok(Goal {
        id: parse_uuid(&id),
        account_id: parse_uuid(&account_id),
        category: category
            .parse()
            .map_err(|e| DatabaseError::Query(format!("goal row parse: {e}")))?,
        goal_text,
        stage: stage
            .parse()
            .map_err(|e| DatabaseError::Query(format!("goal row parse: {e}")))?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
        completed_at: parse_optional_datetime(&completed_at),
        cancelled_at: parse_optional_datetime(&cancelled_at),
        is_active: is_active != 0,
    })
}

/// Map a libsql Row to a PlannedEmail. Column order matches PLAN_COLUMNS.
fn row_to_plan_entry(row: &libsql::Row) -> Result<PlannedEmail, libsql::Error> {
    let id: String = row.get(0)?;
    let goal_id: String = row.get(1)?;
    let day_number: i64 = row.get(2)?;
    let subject: String = row.get(3)?;
    let preview: String = row.get(4)?;
    let content: String = row.get(5)?;
    let sent_at: Option<String> = row.get(6).ok();

    Ok(PlannedEmail {
        id: parse_uuid(&id),
        goal_id: parse_uuid(&goal_id),
        day_number: day_number.max(0) as u32,
        subject,
        preview,
        content,
        sent_at: parse_optional_datetime(&sent_at),
    })
}

fn log_status_to_str(status: EmailLogStatus) -> &'static str {
    match status {
        EmailLogStatus::Sent => "sent",
        EmailLogStatus::Failed => "failed",
    }
}

fn str_to_log_status(s: &str) -> EmailLogStatus {
    match s {
        "failed" => EmailLogStatus::Failed,
        _ => EmailLogStatus::Sent,
    }
}

// ── Trait implementation ────────────────────────────────────────────

const ACCOUNT_COLUMNS: &str = "id, email, emails_sent, next_send_at, is_cancelled, \
     has_subscribed, subscription_id, customer_id, last_email_sent_at, \
     onboarding_complete, created_at";

const GOAL_COLUMNS: &str =
    "id, account_id, category, goal_text, stage, created_at, updated_at, \
     completed_at, cancelled_at, is_active";

const PLAN_COLUMNS: &str = "id, goal_id, day_number, subject, preview, content, sent_at";

#[async_trait]
impl Store for LibSqlBackend {
    // ── Accounts ────────────────────────────────────────────────────

    async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO accounts (id, email, emails_sent, next_send_at, is_cancelled,
                    has_subscribed, subscription_id, customer_id, last_email_sent_at,
                    onboarding_complete, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    account.id.to_string(),
                    account.email.clone(),
                    account.emails_sent as i64,
                    opt_ts(account.next_send_at),
                    account.is_cancelled as i64,
                    account.has_subscribed as i64,
                    opt_text_owned(account.subscription_id.clone()),
                    opt_text_owned(account.customer_id.clone()),
                    opt_ts(account.last_email_sent_at),
                    account.onboarding_complete as i64,
                    ts(account.created_at),
                ],
            )
            .await
            .map_err(|e| match e {
                libsql::Error::SqliteFailure(_, ref msg) if msg.contains("UNIQUE") => {
                    DatabaseError::Constraint(format!("insert_account: {e}"))
                }
                _ => DatabaseError::Query(format!("insert_account: {e}")),
            })?;

        debug!(account_id = %account.id, email = %account.email, "Account inserted");
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_account: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_account(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("account row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_account: {e}"))),
        }
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_account_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_account(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("account row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_account_by_email: {e}"))),
        }
    }

    async fn delete_account(&self, id: Uuid) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let id_str = id.to_string();

        conn.execute("BEGIN", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_account begin: {e}")))?;

        let result: Result<(), libsql::Error> = async {
            conn.execute(
                "DELETE FROM planned_emails WHERE goal_id IN
                     (SELECT id FROM goals WHERE account_id = ?1)",
                params![id_str.clone()],
            )
            .await?;
            conn.execute(
                "DELETE FROM goals WHERE account_id = ?1",
                params![id_str.clone()],
            )
            .await?;
            conn.execute(
                "DELETE FROM magic_links WHERE account_id = ?1",
                params![id_str.clone()],
            )
            .await?;
            conn.execute(
                "DELETE FROM email_log WHERE account_id = ?1",
                params![id_str.clone()],
            )
            .await?;
            conn.execute("DELETE FROM accounts WHERE id = ?1", params![id_str.clone()])
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| DatabaseError::Query(format!("delete_account commit: {e}")))?;
                info!(account_id = %id, "Account deleted");
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(DatabaseError::Query(format!("delete_account: {e}")))
            }
        }
    }

    async fn due_accounts(
        &self,
        now: DateTime<Utc>,
        trial_limit: u32,
    ) -> Result<Vec<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts
                     WHERE next_send_at IS NOT NULL
                       AND next_send_at <= ?1
                       AND is_cancelled = 0
                       AND (emails_sent < ?2 OR has_subscribed = 1)
                     ORDER BY next_send_at ASC"
                ),
                params![ts(now), trial_limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("due_accounts: {e}")))?;

        let mut accounts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_account(&row) {
                Ok(account) => accounts.push(account),
                Err(e) => tracing::warn!("Skipping account row: {e}"),
            }
        }
        Ok(accounts)
    }

    async fn record_send(
        &self,
        account_id: Uuid,
        emails_sent: u32,
        sent_at: DateTime<Utc>,
        next_send_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        // Conditional claim: only advances from the expected prior count, so
        // two writers racing over the same send cannot both record it.
        let affected = self
            .conn()
            .execute(
                "UPDATE accounts
                 SET emails_sent = ?1, last_email_sent_at = ?2, next_send_at = ?3
                 WHERE id = ?4 AND emails_sent = ?5",
                params![
                    emails_sent as i64,
                    ts(sent_at),
                    opt_ts(next_send_at),
                    account_id.to_string(),
                    emails_sent as i64 - 1,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_send: {e}")))?;
        if affected == 0 {
            return Err(DatabaseError::Query(format!(
                "record_send: account {account_id} already past email {emails_sent}"
            )));
        }
        Ok(())
    }

    async fn complete_onboarding(
        &self,
        account_id: Uuid,
        first_send_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE accounts SET onboarding_complete = 1, next_send_at = ?1 WHERE id = ?2",
                params![ts(first_send_at), account_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_onboarding: {e}")))?;
        Ok(())
    }

    async fn apply_account_patch(
        &self,
        account_id: Uuid,
        patch: &AccountPatch,
    ) -> Result<bool, DatabaseError> {
        if patch.is_empty() {
            return Ok(self.get_account(account_id).await?.is_some());
        }

        let mut sets: Vec<&'static str> = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();

        if let FieldUpdate::Set(v) = &patch.has_subscribed {
            sets.push("has_subscribed");
            values.push(libsql::Value::Integer(*v as i64));
        }
        if let FieldUpdate::Set(v) = &patch.is_cancelled {
            sets.push("is_cancelled");
            values.push(libsql::Value::Integer(*v as i64));
        }
        if let FieldUpdate::Set(v) = &patch.next_send_at {
            sets.push("next_send_at");
            values.push(opt_ts(*v));
        }
        if let FieldUpdate::Set(v) = &patch.subscription_id {
            sets.push("subscription_id");
            values.push(opt_text_owned(v.clone()));
        }
        if let FieldUpdate::Set(v) = &patch.customer_id {
            sets.push("customer_id");
            values.push(opt_text_owned(v.clone()));
        }

        let assignments: Vec<String> = sets
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE accounts SET {} WHERE id = ?{}",
            assignments.join(", "),
            sets.len() + 1
        );
        values.push(libsql::Value::Text(account_id.to_string()));

        let changed = self
            .conn()
            .execute(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("apply_account_patch: {e}")))?;

        Ok(changed > 0)
    }

    // ── Goals + plans ───────────────────────────────────────────────

    async fn insert_goal_with_plan(
        &self,
        goal: &Goal,
        entries: &[PlannedEmail],
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();

        conn.execute("BEGIN", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_goal_with_plan begin: {e}")))?;

        let result: Result<(), libsql::Error> = async {
            conn.execute(
                "INSERT INTO goals (id, account_id, category, goal_text, stage,
                    created_at, updated_at, completed_at, cancelled_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    goal.id.to_string(),
                    goal.account_id.to_string(),
                    goal.category.to_string(),
                    goal.goal_text.clone(),
                    goal.stage.to_string(),
                    ts(goal.created_at),
                    ts(goal.updated_at),
                    opt_ts(goal.completed_at),
                    opt_ts(goal.cancelled_at),
                    goal.is_active as i64,
                ],
            )
            .await?;

            for entry in entries {
                conn.execute(
                    "INSERT INTO planned_emails (id, goal_id, day_number, subject,
                        preview, content, sent_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        entry.id.to_string(),
                        entry.goal_id.to_string(),
                        entry.day_number as i64,
                        entry.subject.clone(),
                        entry.preview.clone(),
                        entry.content.clone(),
                        opt_ts(entry.sent_at),
                    ],
                )
                .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| DatabaseError::Query(format!("insert_goal_with_plan commit: {e}")))?;
                debug!(goal_id = %goal.id, entries = entries.len(), "Goal and plan inserted");
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(DatabaseError::Query(format!("insert_goal_with_plan: {e}")))
            }
        }
    }

    async fn get_goal(&self, id: Uuid) -> Result<Option<Goal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_goal: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_goal(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_goal: {e}"))),
        }
    }

    async fn list_goals(&self, account_id: Uuid) -> Result<Vec<Goal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {GOAL_COLUMNS} FROM goals
                     WHERE account_id = ?1 ORDER BY created_at DESC"
                ),
                params![account_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_goals: {e}")))?;

        let mut goals = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_goal(&row) {
                Ok(goal) => goals.push(goal),
                Err(e) => tracing::warn!("Skipping goal row: {e}"),
            }
        }
        Ok(goals)
    }

    async fn update_goal(&self, goal: &Goal) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE goals SET category = ?1, goal_text = ?2, stage = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    goal.category.to_string(),
                    goal.goal_text.clone(),
                    goal.stage.to_string(),
                    ts(goal.updated_at),
                    goal.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_goal: {e}")))?;
        Ok(())
    }

    async fn finish_goal(
        &self,
        id: Uuid,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let sql = if completed {
            "UPDATE goals SET completed_at = ?1, is_active = 0, updated_at = ?1 WHERE id = ?2"
        } else {
            "UPDATE goals SET cancelled_at = ?1, is_active = 0, updated_at = ?1 WHERE id = ?2"
        };
        self.conn()
            .execute(sql, params![ts(at), id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("finish_goal: {e}")))?;
        Ok(())
    }

    async fn active_plan_entry(
        &self,
        account_id: Uuid,
        day_number: u32,
    ) -> Result<Option<PlannedEmail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT p.id, p.goal_id, p.day_number, p.subject, p.preview, p.content, p.sent_at
                 FROM planned_emails p
                 JOIN goals g ON p.goal_id = g.id
                 WHERE g.account_id = ?1 AND g.is_active = 1 AND p.day_number = ?2
                 ORDER BY g.created_at DESC
                 LIMIT 1",
                params![account_id.to_string(), day_number as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("active_plan_entry: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_plan_entry(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("plan row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("active_plan_entry: {e}"))),
        }
    }

    async fn list_plan_entries(&self, goal_id: Uuid) -> Result<Vec<PlannedEmail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PLAN_COLUMNS} FROM planned_emails
                     WHERE goal_id = ?1 ORDER BY day_number ASC"
                ),
                params![goal_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_plan_entries: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_plan_entry(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping plan row: {e}"),
            }
        }
        Ok(entries)
    }

    async fn mark_plan_entry_sent(
        &self,
        entry_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE planned_emails SET sent_at = ?1 WHERE id = ?2 AND sent_at IS NULL",
                params![ts(at), entry_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_plan_entry_sent: {e}")))?;
        Ok(())
    }

    // ── Magic links ─────────────────────────────────────────────────

    async fn replace_magic_link(&self, link: &MagicLink) -> Result<(), DatabaseError> {
        let conn = self.conn();

        conn.execute(
            "DELETE FROM magic_links WHERE account_id = ?1",
            params![link.account_id.to_string()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("replace_magic_link delete: {e}")))?;

        conn.execute(
            "INSERT INTO magic_links (token, account_id, expires_at) VALUES (?1, ?2, ?3)",
            params![
                link.token.clone(),
                link.account_id.to_string(),
                ts(link.expires_at),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("replace_magic_link insert: {e}")))?;

        Ok(())
    }

    async fn take_magic_link(&self, token: &str) -> Result<Option<MagicLink>, DatabaseError> {
        // DELETE ... RETURNING makes consumption atomic: a token can only
        // ever be taken once.
        let mut rows = self
            .conn()
            .query(
                "DELETE FROM magic_links WHERE token = ?1
                 RETURNING token, account_id, expires_at",
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("take_magic_link: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let token: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("magic link row parse: {e}")))?;
                let account_id: String = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("magic link row parse: {e}")))?;
                let expires_at: String = row
                    .get(2)
                    .map_err(|e| DatabaseError::Query(format!("magic link row parse: {e}")))?;
                Ok(Some(MagicLink {
                    token,
                    account_id: parse_uuid(&account_id),
                    expires_at: parse_datetime(&expires_at),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("take_magic_link: {e}"))),
        }
    }

    // ── Email audit log ─────────────────────────────────────────────

    async fn insert_email_log(&self, entry: &EmailLogEntry) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO email_log (id, account_id, day_number, subject, status, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id.to_string(),
                    entry.account_id.to_string(),
                    entry.day_number as i64,
                    entry.subject.clone(),
                    log_status_to_str(entry.status),
                    opt_text_owned(entry.error.clone()),
                    ts(entry.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_email_log: {e}")))?;
        Ok(())
    }

    async fn list_email_log(&self, account_id: Uuid) -> Result<Vec<EmailLogEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, account_id, day_number, subject, status, error, created_at
                 FROM email_log WHERE account_id = ?1 ORDER BY created_at ASC",
                params![account_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_email_log: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row.get(0).unwrap_or_default();
            let acct: String = row.get(1).unwrap_or_default();
            let day_number: i64 = row.get(2).unwrap_or(0);
            let subject: String = row.get(3).unwrap_or_default();
            let status: String = row.get(4).unwrap_or_else(|_| "sent".into());
            let error: Option<String> = row.get(5).ok();
            let created_at: String = row.get(6).unwrap_or_default();

            entries.push(EmailLogEntry {
                id: parse_uuid(&id),
                account_id: parse_uuid(&acct),
                day_number: day_number.max(0) as u32,
                subject,
                status: str_to_log_status(&status),
                error,
                created_at: parse_datetime(&created_at),
            });
        }
        Ok(entries)
    }
}
