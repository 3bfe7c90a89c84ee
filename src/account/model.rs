//! Account model — identity plus billing and scheduling state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscriber account.
///
/// Scheduling invariant: `next_send_at` is `None` iff the drip is halted —
/// either the trial ran out without a subscription, or the account cancelled.
/// `emails_sent` only moves forward, and only via the send-and-advance cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub emails_sent: u32,
    pub next_send_at: Option<DateTime<Utc>>,
    pub is_cancelled: bool,
    pub has_subscribed: bool,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub last_email_sent_at: Option<DateTime<Utc>>,
    pub onboarding_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Fresh account created at first authentication attempt.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            emails_sent: 0,
            next_send_at: None,
            is_cancelled: false,
            has_subscribed: false,
            subscription_id: None,
            customer_id: None,
            last_email_sent_at: None,
            onboarding_complete: false,
            created_at: Utc::now(),
        }
    }

    /// Whether the drip schedule is currently halted.
    pub fn is_halted(&self) -> bool {
        self.next_send_at.is_none()
    }

    /// Whether this account is eligible for a send at time `now`.
    ///
    /// Mirrors the due-selection query: scheduled, not cancelled, and either
    /// still inside the free trial or subscribed.
    pub fn is_due(&self, now: DateTime<Utc>, trial_limit: u32) -> bool {
        match self.next_send_at {
            Some(at) => {
                at <= now
                    && !self.is_cancelled
                    && (self.emails_sent < trial_limit || self.has_subscribed)
            }
            None => false,
        }
    }
}

/// Update-or-keep marker for a single account field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    Set(T),
    #[default]
    Keep,
}

impl<T> FieldUpdate<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }
}

/// A partial account update applied as a single atomic UPDATE.
///
/// Produced by the billing reconciler's pure transition functions; fields
/// marked `Keep` are left untouched so that, for example, a
/// `subscription-updated` event never overwrites an already-scheduled
/// `next_send_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub has_subscribed: FieldUpdate<bool>,
    pub is_cancelled: FieldUpdate<bool>,
    pub next_send_at: FieldUpdate<Option<DateTime<Utc>>>,
    pub subscription_id: FieldUpdate<Option<String>>,
    pub customer_id: FieldUpdate<Option<String>>,
}

impl AccountPatch {
    /// Whether the patch changes anything at all.
    pub fn is_empty(&self) -> bool {
        !self.has_subscribed.is_set()
            && !self.is_cancelled.is_set()
            && !self.next_send_at.is_set()
            && !self.subscription_id.is_set()
            && !self.customer_id.is_set()
    }

    /// Apply the patch to an in-memory account (mirrors the SQL UPDATE).
    pub fn apply_to(&self, account: &mut Account) {
        if let FieldUpdate::Set(v) = &self.has_subscribed {
            account.has_subscribed = *v;
        }
        if let FieldUpdate::Set(v) = &self.is_cancelled {
            account.is_cancelled = *v;
        }
        if let FieldUpdate::Set(v) = &self.next_send_at {
            account.next_send_at = *v;
        }
        if let FieldUpdate::Set(v) = &self.subscription_id {
            account.subscription_id = v.clone();
        }
        if let FieldUpdate::Set(v) = &self.customer_id {
            account.customer_id = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_account_is_halted() {
        let account = Account::new("a@example.com");
        assert!(account.is_halted());
        assert_eq!(account.emails_sent, 0);
        assert!(!account.has_subscribed);
    }

    #[test]
    fn due_requires_elapsed_schedule() {
        let now = Utc::now();
        let mut account = Account::new("a@example.com");
        account.next_send_at = Some(now + Duration::hours(1));
        assert!(!account.is_due(now, 7));

        account.next_send_at = Some(now - Duration::minutes(1));
        assert!(account.is_due(now, 7));
    }

    #[test]
    fn trial_exhausted_unsubscribed_is_not_due() {
        let now = Utc::now();
        let mut account = Account::new("a@example.com");
        account.next_send_at = Some(now);
        account.emails_sent = 7;
        assert!(!account.is_due(now, 7));

        account.has_subscribed = true;
        assert!(account.is_due(now, 7));
    }

    #[test]
    fn cancelled_is_never_due() {
        let now = Utc::now();
        let mut account = Account::new("a@example.com");
        account.next_send_at = Some(now);
        account.is_cancelled = true;
        assert!(!account.is_due(now, 7));
    }
}
