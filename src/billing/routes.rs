//! REST endpoints for checkout, subscription management, and webhooks.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use secrecy::SecretString;
use tracing::{info, warn};

use crate::auth::session::require_account;
use crate::billing::client::BillingClient;
use crate::billing::{reconciler, webhook};
use crate::error::{BillingError, Error};
use crate::store::Store;

/// Shared state for billing routes.
#[derive(Clone)]
pub struct BillingRouteState {
    pub store: Arc<dyn Store>,
    pub billing: Arc<dyn BillingClient>,
    pub webhook_secret: SecretString,
}

/// POST /api/webhooks/billing
///
/// Verifies the signature on the raw body, decodes the event, and applies
/// the resulting account patch. Events for unknown accounts and event types
/// we do not react to are acknowledged with 200 so the provider stops
/// retrying.
async fn handle_webhook(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, Error> {
    let signature = headers
        .get("billing-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(BillingError::SignatureMissing)?;

    webhook::verify_signature(&state.webhook_secret, signature, &body)?;

    let Some(event) = webhook::decode_event(&body)? else {
        return Ok(StatusCode::OK);
    };

    let account_id = event.account_id();
    let patch = reconciler::reconcile(&event, Utc::now());
    let applied = state.store.apply_account_patch(account_id, &patch).await?;

    if applied {
        info!(account_id = %account_id, event = ?event, "Billing event applied");
    } else {
        warn!(account_id = %account_id, "Billing event for unknown account ignored");
    }

    Ok(StatusCode::OK)
}

/// POST /api/billing/checkout
///
/// Creates a hosted checkout session for the signed-in account and returns
/// its URL.
async fn create_checkout(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    if account.has_subscribed && !account.is_cancelled {
        return Err(BillingError::AlreadySubscribed(account.id).into());
    }
    let url = state
        .billing
        .create_checkout_session(&account.email, account.id)
        .await?;
    Ok(Json(serde_json::json!({ "url": url })))
}

/// POST /api/billing/portal
///
/// Creates a hosted portal session for managing an existing subscription.
async fn create_portal(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    let customer_id = account
        .customer_id
        .ok_or(BillingError::NoSubscription(account.id))?;
    let url = state.billing.create_portal_session(&customer_id).await?;
    Ok(Json(serde_json::json!({ "url": url })))
}

/// POST /api/billing/cancel-subscription
///
/// Cancels the account's subscription at the provider, then halts the drip
/// locally right away. The provider's deletion webhook later re-applies
/// the same halt, which is a no-op.
async fn cancel_subscription(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
) -> Result<StatusCode, Error> {
    let account = require_account(&state.store, &headers).await?;
    let subscription_id = account
        .subscription_id
        .ok_or(BillingError::NoSubscription(account.id))?;
    state.billing.cancel_subscription(&subscription_id).await?;

    let halt = reconciler::reconcile(
        &reconciler::BillingEvent::SubscriptionDeleted {
            account_id: account.id,
        },
        Utc::now(),
    );
    state.store.apply_account_patch(account.id, &halt).await?;
    info!(account_id = %account.id, "Subscription cancelled and drip halted");
    Ok(StatusCode::ACCEPTED)
}

/// Build the billing REST routes.
pub fn billing_routes(state: BillingRouteState) -> Router {
    Router::new()
        .route("/api/webhooks/billing", post(handle_webhook))
        .route("/api/billing/checkout", post(create_checkout))
        .route("/api/billing/portal", post(create_portal))
        .route("/api/billing/cancel-subscription", post(cancel_subscription))
        .with_state(state)
}
