//! Cron trigger endpoint for the drip cycle.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use chrono::Utc;

use crate::error::{AuthError, Error};
use crate::scheduler::cycle::DripCycle;

/// Shared state for the cron route.
#[derive(Clone)]
pub struct CronRouteState {
    pub cycle: Arc<DripCycle>,
    /// Shared secret required as a bearer token. None disables the check
    /// (local development).
    pub cron_secret: Option<String>,
}

/// POST /api/cron/send-emails
///
/// Runs one drip cycle immediately and returns the report. External
/// schedulers hit this on their own cadence; the endpoint is idempotent
/// within a cycle because delivered accounts are rescheduled past now.
async fn trigger_cycle(
    State(state): State<CronRouteState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    if let Some(secret) = &state.cron_secret {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == secret);
        if !authorized {
            return Err(AuthError::CronUnauthorized.into());
        }
    }

    let report = state.cycle.run(Utc::now()).await?;
    Ok(Json(report))
}

/// Build the cron trigger route.
pub fn cron_routes(state: CronRouteState) -> Router {
    Router::new()
        .route("/api/cron/send-emails", post(trigger_cycle))
        .with_state(state)
}
