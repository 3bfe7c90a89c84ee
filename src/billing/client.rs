//! Outbound calls to the payment provider's REST API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::BillingError;

/// Abstraction over the payment provider so checkout and cancellation can be
/// tested without live API calls.
#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Create a hosted checkout session and return its URL.
    async fn create_checkout_session(
        &self,
        email: &str,
        account_id: Uuid,
    ) -> Result<String, BillingError>;

    /// Create a hosted portal session for managing an existing subscription.
    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError>;

    /// Cancel a subscription immediately.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError>;
}

#[derive(Deserialize)]
struct HostedSession {
    url: Option<String>,
}

/// Stripe-backed billing client.
pub struct StripeClient {
    config: BillingConfig,
    base_url: String,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: BillingConfig, base_url: String) -> Result<Self, BillingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BillingError::RequestFailed(format!("client build failed: {e}")))?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    fn secret_key(&self) -> &str {
        self.config.secret_key.expose_secret()
    }
}

#[async_trait]
impl BillingClient for StripeClient {
    async fn create_checkout_session(
        &self,
        email: &str,
        account_id: Uuid,
    ) -> Result<String, BillingError> {
        let account_id = account_id.to_string();
        let success_url = format!("{}/dashboard?checkout=success", self.base_url);
        let cancel_url = format!("{}/dashboard?checkout=cancelled", self.base_url);

        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", self.config.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("customer_email", email),
            ("client_reference_id", account_id.as_str()),
            ("subscription_data[metadata][account_id]", account_id.as_str()),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .bearer_auth(self.secret_key())
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::RequestFailed(format!("checkout session: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::RequestFailed(format!(
                "checkout session returned {status}: {body}"
            )));
        }

        let session: HostedSession = response
            .json()
            .await
            .map_err(|e| BillingError::RequestFailed(format!("checkout session body: {e}")))?;

        debug!(account_id = %account_id, "Checkout session created");
        session.url.ok_or(BillingError::MissingCheckoutUrl)
    }

    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError> {
        let return_url = format!("{}/dashboard", self.base_url);
        let form = [("customer", customer_id), ("return_url", return_url.as_str())];

        let response = self
            .client
            .post(format!(
                "{}/v1/billing_portal/sessions",
                self.config.api_base
            ))
            .bearer_auth(self.secret_key())
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::RequestFailed(format!("portal session: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(BillingError::RequestFailed(format!(
                "portal session returned {status}"
            )));
        }

        let session: HostedSession = response
            .json()
            .await
            .map_err(|e| BillingError::RequestFailed(format!("portal session body: {e}")))?;

        session.url.ok_or(BillingError::MissingCheckoutUrl)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        let response = self
            .client
            .delete(format!(
                "{}/v1/subscriptions/{subscription_id}",
                self.config.api_base
            ))
            .bearer_auth(self.secret_key())
            .send()
            .await
            .map_err(|e| BillingError::RequestFailed(format!("cancel subscription: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(BillingError::RequestFailed(format!(
                "cancel subscription returned {status}"
            )));
        }

        info!(subscription_id = %subscription_id, "Subscription cancelled at provider");
        Ok(())
    }
}
