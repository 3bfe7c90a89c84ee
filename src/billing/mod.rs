//! Billing: provider client, webhook verification, and state reconciliation.

pub mod client;
pub mod reconciler;
pub mod routes;
pub mod webhook;

pub use client::{BillingClient, StripeClient};
pub use reconciler::{BillingEvent, SubscriptionStatus};
