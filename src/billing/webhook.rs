//! Webhook signature verification and event decoding.
//!
//! The provider signs each delivery with `t=<unix ts>,v1=<hex hmac>` over
//! the string `"{t}.{raw body}"` using HMAC-SHA256. Verification happens on
//! the raw bytes before any JSON parsing.

use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use secrecy::SecretString;
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::billing::reconciler::{BillingEvent, SubscriptionStatus};
use crate::error::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Verify a `t=...,v1=...` signature header against the raw request body.
pub fn verify_signature(
    secret: &SecretString,
    header: &str,
    body: &[u8],
) -> Result<(), BillingError> {
    let mut timestamp: Option<&str> = None;
    let mut signature: Option<&str> = None;

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = Some(v),
            (Some("v1"), Some(v)) => signature = Some(v),
            _ => {}
        }
    }

    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(BillingError::SignatureInvalid),
    };

    let expected = hex::decode(signature).map_err(|_| BillingError::SignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| BillingError::SignatureInvalid)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    // verify_slice is constant-time
    mac.verify_slice(&expected)
        .map_err(|_| BillingError::SignatureInvalid)
}

/// Sign a payload the way the provider does. Used by tests and local tooling.
pub fn sign_payload(secret: &SecretString, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

// ── Event decoding ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Deserialize)]
struct WebhookData {
    object: serde_json::Value,
}

fn account_id_from(object: &serde_json::Value) -> Option<Uuid> {
    let raw = object
        .get("client_reference_id")
        .and_then(|v| v.as_str())
        .or_else(|| {
            object
                .get("metadata")
                .and_then(|m| m.get("account_id"))
                .and_then(|v| v.as_str())
        })?;
    Uuid::parse_str(raw).ok()
}

fn str_field(object: &serde_json::Value, key: &str) -> Option<String> {
    object.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Decode a verified webhook body into a `BillingEvent`.
///
/// Returns `Ok(None)` for event types this service does not react to, and
/// for recognised events that carry no account reference. Both cases are
/// acknowledged to the provider so it stops retrying.
pub fn decode_event(body: &[u8]) -> Result<Option<BillingEvent>, BillingError> {
    let envelope: WebhookEnvelope = serde_json::from_slice(body)
        .map_err(|e| BillingError::MalformedEvent(format!("webhook body: {e}")))?;
    let object = &envelope.data.object;

    let event = match envelope.event_type.as_str() {
        "checkout.session.completed" => {
            let Some(account_id) = account_id_from(object) else {
                return Ok(None);
            };
            Some(BillingEvent::CheckoutCompleted {
                account_id,
                subscription_id: str_field(object, "subscription"),
                customer_id: str_field(object, "customer"),
            })
        }
        "customer.subscription.updated" => {
            let Some(account_id) = account_id_from(object) else {
                return Ok(None);
            };
            let status = match object.get("status").and_then(|v| v.as_str()) {
                Some("canceled") | Some("unpaid") | Some("incomplete_expired") => {
                    SubscriptionStatus::Lapsed
                }
                _ => SubscriptionStatus::Active,
            };
            let cancel_at_period_end = object
                .get("cancel_at_period_end")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Some(BillingEvent::SubscriptionUpdated {
                account_id,
                status: if cancel_at_period_end {
                    SubscriptionStatus::Lapsed
                } else {
                    status
                },
                subscription_id: str_field(object, "id"),
            })
        }
        "customer.subscription.deleted" => account_id_from(object)
            .map(|account_id| BillingEvent::SubscriptionDeleted { account_id }),
        _ => None,
    };

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret() -> SecretString {
        SecretString::from("whsec_test")
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(&secret(), 1_700_000_000, body);
        assert!(verify_signature(&secret(), &header, body).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign_payload(&secret(), 1_700_000_000, b"original");
        assert!(matches!(
            verify_signature(&secret(), &header, b"tampered"),
            Err(BillingError::SignatureInvalid)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = sign_payload(&SecretString::from("other"), 1_700_000_000, b"body");
        assert!(verify_signature(&secret(), &header, b"body").is_err());
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(verify_signature(&secret(), "v1=deadbeef", b"body").is_err());
        assert!(verify_signature(&secret(), "t=123", b"body").is_err());
        assert!(verify_signature(&secret(), "t=123,v1=nothex", b"body").is_err());
    }

    #[test]
    fn decodes_checkout_completed() {
        let account_id = Uuid::new_v4();
        let body = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "client_reference_id": account_id.to_string(),
                "subscription": "sub_1",
                "customer": "cus_1"
            }}
        });
        let event = decode_event(body.to_string().as_bytes()).unwrap().unwrap();
        assert_eq!(
            event,
            BillingEvent::CheckoutCompleted {
                account_id,
                subscription_id: Some("sub_1".into()),
                customer_id: Some("cus_1".into()),
            }
        );
    }

    #[test]
    fn decodes_subscription_events_via_metadata() {
        let account_id = Uuid::new_v4();
        let body = json!({
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_2",
                "status": "canceled",
                "metadata": { "account_id": account_id.to_string() }
            }}
        });
        let event = decode_event(body.to_string().as_bytes()).unwrap().unwrap();
        assert_eq!(
            event,
            BillingEvent::SubscriptionUpdated {
                account_id,
                status: SubscriptionStatus::Lapsed,
                subscription_id: Some("sub_2".into()),
            }
        );

        let body = json!({
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "metadata": { "account_id": account_id.to_string() }
            }}
        });
        let event = decode_event(body.to_string().as_bytes()).unwrap().unwrap();
        assert_eq!(event, BillingEvent::SubscriptionDeleted { account_id });
    }

    #[test]
    fn cancel_at_period_end_counts_as_lapsed() {
        let account_id = Uuid::new_v4();
        let body = json!({
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_3",
                "status": "active",
                "cancel_at_period_end": true,
                "metadata": { "account_id": account_id.to_string() }
            }}
        });
        let event = decode_event(body.to_string().as_bytes()).unwrap().unwrap();
        assert!(matches!(
            event,
            BillingEvent::SubscriptionUpdated {
                status: SubscriptionStatus::Lapsed,
                ..
            }
        ));
    }

    #[test]
    fn unknown_event_type_is_skipped() {
        let body = json!({
            "type": "invoice.paid",
            "data": { "object": {} }
        });
        assert!(decode_event(body.to_string().as_bytes()).unwrap().is_none());
    }

    #[test]
    fn missing_account_reference_is_skipped() {
        let body = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "subscription": "sub_1" } }
        });
        assert!(decode_event(body.to_string().as_bytes()).unwrap().is_none());
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(decode_event(b"not json").is_err());
    }
}
