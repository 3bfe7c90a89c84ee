//! Magic-link sign-in endpoints.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse, Redirect};
use axum::routing::{get, post};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::account::model::Account;
use crate::auth::magic_link::MagicLink;
use crate::auth::session::{clear_session_cookie, session_cookie};
use crate::email::{Mailer, templates};
use crate::error::{Error, ValidationError};
use crate::store::Store;

/// Shared state for auth routes.
#[derive(Clone)]
pub struct AuthRouteState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub base_url: String,
}

impl AuthRouteState {
    fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

/// Normalize and validate an email address. Intentionally loose: the SMTP
/// conversation is the real validator.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !valid {
        return Err(ValidationError::InvalidEmail(raw.to_string()));
    }
    Ok(email)
}

#[derive(Deserialize)]
struct SendLinkRequest {
    email: String,
}

/// POST /api/auth/send-link
///
/// Finds or creates the account for this email, replaces any outstanding
/// magic link, and emails a fresh one.
async fn send_link(
    State(state): State<AuthRouteState>,
    Json(request): Json<SendLinkRequest>,
) -> Result<impl IntoResponse, Error> {
    let email = normalize_email(&request.email)?;

    let account = match state.store.get_account_by_email(&email).await? {
        Some(account) => account,
        None => {
            let account = Account::new(&email);
            state.store.insert_account(&account).await?;
            info!(account_id = %account.id, "Account created via sign-in");
            account
        }
    };

    let link = MagicLink::issue(account.id);
    let verify_url = link.verify_url(&state.base_url);
    state.store.replace_magic_link(&link).await?;

    state
        .mailer
        .send(
            &account.email,
            "Your sign-in link",
            &templates::magic_link_email(&verify_url),
        )
        .await?;

    Ok(Json(serde_json::json!({ "sent": true })))
}

#[derive(Deserialize)]
struct VerifyQuery {
    token: String,
}

/// GET /api/auth/verify?token=...
///
/// Consumes the magic link (single use: taking it deletes it) and sets the
/// session cookie. Invalid or expired tokens redirect back to the login
/// page rather than erroring, since the link lands in a browser.
async fn verify(
    State(state): State<AuthRouteState>,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse, Error> {
    let Some(link) = state.store.take_magic_link(&query.token).await? else {
        warn!("Sign-in attempt with unknown magic link");
        return Ok(Redirect::to(&format!("{}/login?error=invalid", state.base_url)).into_response());
    };

    if link.is_expired(Utc::now()) {
        warn!(account_id = %link.account_id, "Sign-in attempt with expired magic link");
        return Ok(Redirect::to(&format!("{}/login?error=expired", state.base_url)).into_response());
    }

    let Some(account) = state.store.get_account(link.account_id).await? else {
        return Ok(Redirect::to(&format!("{}/login?error=invalid", state.base_url)).into_response());
    };

    let destination = if account.onboarding_complete {
        format!("{}/dashboard", state.base_url)
    } else {
        format!("{}/onboarding", state.base_url)
    };

    info!(account_id = %account.id, "Signed in");
    let cookie = session_cookie(account.id, state.secure_cookies());
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Redirect::to(&destination),
    )
        .into_response())
}

/// POST /api/auth/logout
async fn logout() -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie())]),
        StatusCode::NO_CONTENT,
    )
}

/// Build the auth REST routes.
pub fn auth_routes(state: AuthRouteState) -> Router {
    Router::new()
        .route("/api/auth/send-link", post(send_link))
        .route("/api/auth/verify", get(verify))
        .route("/api/auth/logout", post(logout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn normalize_email_rejects_garbage() {
        for bad in ["", "no-at-sign", "@example.com", "a@", "a@nodot", "a@.com"] {
            assert!(normalize_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
