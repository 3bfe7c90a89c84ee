//! Magic-link tokens — single-use, time-limited sign-in credentials.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use uuid::Uuid;

use crate::config::MAGIC_LINK_EXPIRY_MINUTES;

/// A live magic-link token. At most one exists per account; issuing a new
/// one invalidates prior ones, and a token is deleted on first verification
/// or on detected expiry.
#[derive(Debug, Clone)]
pub struct MagicLink {
    pub token: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl MagicLink {
    /// Issue a fresh token for the given account.
    pub fn issue(account_id: Uuid) -> Self {
        Self {
            token: generate_token(),
            account_id,
            expires_at: Utc::now() + Duration::minutes(MAGIC_LINK_EXPIRY_MINUTES),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Build the verification URL delivered in the sign-in email.
    pub fn verify_url(&self, base_url: &str) -> String {
        format!("{}/api/auth/verify?token={}", base_url, self.token)
    }
}

/// 32 bytes of OS entropy, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_long() {
        let a = MagicLink::issue(Uuid::new_v4());
        let b = MagicLink::issue(Uuid::new_v4());
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
    }

    #[test]
    fn fresh_token_is_not_expired() {
        let link = MagicLink::issue(Uuid::new_v4());
        assert!(!link.is_expired(Utc::now()));
        assert!(link.is_expired(Utc::now() + Duration::minutes(16)));
    }

    #[test]
    fn verify_url_shape() {
        let link = MagicLink::issue(Uuid::new_v4());
        let url = link.verify_url("https://dripcourse.app");
        assert!(url.starts_with("https://dripcourse.app/api/auth/verify?token="));
        assert!(url.ends_with(&link.token));
    }
}
