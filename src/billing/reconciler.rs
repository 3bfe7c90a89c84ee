//! Billing-state reconciliation.
//!
//! Each webhook event maps to a pure `AccountPatch`; the handler applies
//! that patch atomically. Keeping the transition pure makes every billing
//! rule unit-testable without a database.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::account::model::{AccountPatch, FieldUpdate};

/// Coarse subscription state derived from the provider's status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Lapsed,
}

/// A billing event this service reacts to, decoded from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// Checkout finished; the account is now a paying subscriber.
    CheckoutCompleted {
        account_id: Uuid,
        subscription_id: Option<String>,
        customer_id: Option<String>,
    },
    /// Subscription changed at the provider.
    SubscriptionUpdated {
        account_id: Uuid,
        status: SubscriptionStatus,
        subscription_id: Option<String>,
    },
    /// Subscription fully ended.
    SubscriptionDeleted { account_id: Uuid },
}

impl BillingEvent {
    pub fn account_id(&self) -> Uuid {
        match self {
            BillingEvent::CheckoutCompleted { account_id, .. }
            | BillingEvent::SubscriptionUpdated { account_id, .. }
            | BillingEvent::SubscriptionDeleted { account_id } => *account_id,
        }
    }
}

/// Compute the account patch for a billing event.
///
/// - Checkout completed: mark subscribed, attach provider ids, and resume
///   the drip 24 hours out. A reader stuck at the trial gate starts getting
///   emails again without waiting for the next manual action.
/// - Subscription updated to a lapsed state: halt the drip. Updated while
///   still active: confirm the subscribed flags but leave the schedule
///   alone, so renewal events never shift send times.
/// - Subscription deleted: hard halt. Applying this twice is a no-op.
pub fn reconcile(event: &BillingEvent, now: DateTime<Utc>) -> AccountPatch {
    match event {
        BillingEvent::CheckoutCompleted {
            subscription_id,
            customer_id,
            ..
        } => AccountPatch {
            has_subscribed: FieldUpdate::Set(true),
            is_cancelled: FieldUpdate::Set(false),
            next_send_at: FieldUpdate::Set(Some(now + Duration::hours(24))),
            subscription_id: FieldUpdate::Set(subscription_id.clone()),
            customer_id: FieldUpdate::Set(customer_id.clone()),
        },
        BillingEvent::SubscriptionUpdated {
            status: SubscriptionStatus::Lapsed,
            ..
        } => AccountPatch {
            has_subscribed: FieldUpdate::Set(false),
            is_cancelled: FieldUpdate::Set(true),
            next_send_at: FieldUpdate::Set(None),
            ..Default::default()
        },
        BillingEvent::SubscriptionUpdated {
            status: SubscriptionStatus::Active,
            subscription_id,
            ..
        } => AccountPatch {
            has_subscribed: FieldUpdate::Set(true),
            is_cancelled: FieldUpdate::Set(false),
            subscription_id: match subscription_id {
                Some(id) => FieldUpdate::Set(Some(id.clone())),
                None => FieldUpdate::Keep,
            },
            ..Default::default()
        },
        BillingEvent::SubscriptionDeleted { .. } => AccountPatch {
            has_subscribed: FieldUpdate::Set(false),
            is_cancelled: FieldUpdate::Set(true),
            next_send_at: FieldUpdate::Set(None),
            subscription_id: FieldUpdate::Set(None),
            ..Default::default()
        },
    }
}
