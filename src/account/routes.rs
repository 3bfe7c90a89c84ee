//! Account endpoints: profile, send history, and deletion.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::get;

use crate::auth::session::{clear_session_cookie, require_account};
use crate::billing::client::BillingClient;
use crate::error::Error;
use crate::store::Store;

/// Shared state for account routes.
#[derive(Clone)]
pub struct AccountRouteState {
    pub store: Arc<dyn Store>,
    pub billing: Arc<dyn BillingClient>,
}

/// GET /api/account
async fn get_account(
    State(state): State<AccountRouteState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    Ok(Json(account))
}

/// GET /api/account/emails
///
/// The account's send history, oldest first, including failed attempts.
async fn get_email_history(
    State(state): State<AccountRouteState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;
    let log = state.store.list_email_log(account.id).await?;
    Ok(Json(log))
}

/// DELETE /api/account
///
/// Cancels any active subscription at the provider (best effort: local
/// deletion proceeds even if the provider call fails), then removes the
/// account and everything hanging off it.
async fn delete_account(
    State(state): State<AccountRouteState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    let account = require_account(&state.store, &headers).await?;

    if let Some(subscription_id) = &account.subscription_id {
        if let Err(e) = state.billing.cancel_subscription(subscription_id).await {
            tracing::warn!(
                account_id = %account.id,
                "Subscription cancel during deletion failed: {e}"
            );
        }
    }

    state.store.delete_account(account.id).await?;
    tracing::info!(account_id = %account.id, "Account deleted on request");

    Ok((
        AppendHeaders([(SET_COOKIE, clear_session_cookie())]),
        StatusCode::NO_CONTENT,
    ))
}

/// Build the account REST routes.
pub fn account_routes(state: AccountRouteState) -> Router {
    Router::new()
        .route("/api/account", get(get_account).delete(delete_account))
        .route("/api/account/emails", get(get_email_history))
        .with_state(state)
}
