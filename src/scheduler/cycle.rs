//! The drip cycle: select due accounts, deliver, advance state.
//!
//! A cycle is safe to run on any cadence. State only advances after a
//! confirmed delivery, so a failed send leaves the account due and the next
//! cycle retries it. One account's failure never blocks the rest.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::account::model::Account;
use crate::billing::client::BillingClient;
use crate::config::TRIAL_LIMIT;
use crate::email::templates;
use crate::email::Mailer;
use crate::error::Error;
use crate::plan::content::{generic_email, EmailContent};
use crate::store::{EmailLogEntry, Store};

/// Outcome of one account's send attempt within a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub account_id: Uuid,
    pub day_number: u32,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a full cycle run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub sent: u32,
    pub failed: u32,
    pub results: Vec<SendOutcome>,
}

/// Runs drip cycles against the store, mailer, and billing client.
///
/// Cycle runs are serialized through an internal lock: the background ticker
/// and the cron endpoint share one `DripCycle`, and two concurrent runs would
/// both select the same due accounts and double-send.
pub struct DripCycle {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    billing: Arc<dyn BillingClient>,
    base_url: String,
    run_lock: tokio::sync::Mutex<()>,
}

impl DripCycle {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        billing: Arc<dyn BillingClient>,
        base_url: String,
    ) -> Self {
        Self {
            store,
            mailer,
            billing,
            base_url,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one cycle at the given clock reading.
    ///
    /// Two runs with the same `now` are idempotent: the first advances each
    /// due account's schedule past `now`, so the second selects nothing.
    /// Overlapping invocations queue on the run lock, so a second trigger
    /// waits for the first cycle to finish instead of racing it.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<CycleReport, Error> {
        let _running = self.run_lock.lock().await;
        let due = self.store.due_accounts(now, TRIAL_LIMIT).await?;
        if due.is_empty() {
            debug!("Cycle ran with no due accounts");
            return Ok(CycleReport::default());
        }
        info!(count = due.len(), "Running drip cycle");

        let mut report = CycleReport::default();
        for account in due {
            let account_id = account.id;
            let day_number = account.emails_sent + 1;
            match self.send_to(&account, day_number, now).await {
                Ok(()) => {
                    report.sent += 1;
                    report.results.push(SendOutcome {
                        account_id,
                        day_number,
                        delivered: true,
                        error: None,
                    });
                }
                Err(e) => {
                    error!(account_id = %account_id, day = day_number, "Send failed: {e}");
                    report.failed += 1;
                    report.results.push(SendOutcome {
                        account_id,
                        day_number,
                        delivered: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(sent = report.sent, failed = report.failed, "Drip cycle complete");
        Ok(report)
    }

    /// Deliver one email and, on success, advance the account's state.
    async fn send_to(
        &self,
        account: &Account,
        day_number: u32,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let plan_entry = self
            .store
            .active_plan_entry(account.id, day_number)
            .await?;

        let content = match &plan_entry {
            Some(entry) => EmailContent {
                subject: entry.subject.clone(),
                content: entry.content.clone(),
            },
            None => generic_email(day_number),
        };

        // Last trial email carries the checkout link. Best effort: if the
        // provider is down the email still goes out without it.
        let checkout_url = if day_number == TRIAL_LIMIT && !account.has_subscribed {
            match self
                .billing
                .create_checkout_session(&account.email, account.id)
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(account_id = %account.id, "Checkout link unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let html = templates::course_email(
            &content,
            day_number,
            &self.base_url,
            checkout_url.as_deref(),
        );

        if let Err(e) = self.mailer.send(&account.email, &content.subject, &html).await {
            // Log the failure but leave the account due so the next cycle
            // retries it.
            let log = EmailLogEntry::failed(
                account.id,
                day_number,
                &content.subject,
                e.to_string(),
                now,
            );
            if let Err(log_err) = self.store.insert_email_log(&log).await {
                error!(account_id = %account.id, "Email log write failed: {log_err}");
            }
            return Err(e.into());
        }

        // Delivery confirmed: advance state. Trial gate: halt after the
        // final trial email unless the reader has subscribed.
        let next_send_at = if day_number >= TRIAL_LIMIT && !account.has_subscribed {
            None
        } else {
            Some(now + Duration::hours(24))
        };
        self.store
            .record_send(account.id, day_number, now, next_send_at)
            .await?;

        // Bookkeeping past this point must not flip a delivered email to
        // failed in the report: the reader has the email and the schedule
        // has advanced.
        if let Some(entry) = plan_entry {
            if let Err(e) = self.store.mark_plan_entry_sent(entry.id, now).await {
                error!(account_id = %account.id, "Plan entry stamp failed: {e}");
            }
        }
        if let Err(e) = self
            .store
            .insert_email_log(&EmailLogEntry::sent(
                account.id,
                day_number,
                &content.subject,
                now,
            ))
            .await
        {
            error!(account_id = %account.id, "Email log write failed: {e}");
        }

        debug!(account_id = %account.id, day = day_number, "Email delivered");
        Ok(())
    }
}
