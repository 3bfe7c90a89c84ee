//! Cookie-based sessions.
//!
//! The session cookie holds the account id directly; the magic-link flow is
//! the only way to obtain one. Cookies are httpOnly and SameSite=Lax.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use uuid::Uuid;

use crate::account::model::Account;
use crate::config::SESSION_MAX_AGE_DAYS;
use crate::error::{AuthError, Error};
use crate::store::Store;

pub const SESSION_COOKIE: &str = "session";

/// Build the Set-Cookie value that establishes a session.
pub fn session_cookie(account_id: Uuid, secure: bool) -> String {
    let max_age = SESSION_MAX_AGE_DAYS * 24 * 60 * 60;
    let mut cookie = format!(
        "{SESSION_COOKIE}={account_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build the Set-Cookie value that clears the session.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Extract the session account id from request cookies, if present.
pub fn session_account_id(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        if parts.next() == Some(SESSION_COOKIE) {
            return parts.next().and_then(|v| Uuid::parse_str(v.trim()).ok());
        }
    }
    None
}

/// Resolve the authenticated account for a request, or fail with an
/// auth error.
pub async fn require_account(
    store: &Arc<dyn Store>,
    headers: &HeaderMap,
) -> Result<Account, Error> {
    let account_id = session_account_id(headers).ok_or(AuthError::NoSession)?;
    store
        .get_account(account_id)
        .await?
        .ok_or_else(|| AuthError::InvalidSession.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_roundtrip() {
        let id = Uuid::new_v4();
        let set = session_cookie(id, false);
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Lax"));
        assert!(!set.contains("Secure"));

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; session={id}")).unwrap(),
        );
        assert_eq!(session_account_id(&headers), Some(id));
    }

    #[test]
    fn secure_flag_for_https() {
        let set = session_cookie(Uuid::new_v4(), true);
        assert!(set.contains("; Secure"));
    }

    #[test]
    fn missing_or_garbage_cookie_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(session_account_id(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session=not-a-uuid"));
        assert_eq!(session_account_id(&headers), None);
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }
}
