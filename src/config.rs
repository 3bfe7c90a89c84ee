//! Configuration types.
//!
//! Each service gets its own config struct with a `from_env()` constructor.
//! Everything is read once at startup and injected into the services that
//! need it; no environment reads happen at request time.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Number of free trial emails before the paywall gate.
pub const TRIAL_LIMIT: u32 = 7;

/// Number of entries generated per email plan.
pub const PLAN_DAYS: u32 = 14;

/// Magic-link lifetime in minutes.
pub const MAGIC_LINK_EXPIRY_MINUTES: i64 = 15;

/// Session cookie lifetime in days.
pub const SESSION_MAX_AGE_DAYS: i64 = 30;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind port.
    pub port: u16,
    /// Public base URL used in magic links and checkout redirects.
    pub base_url: String,
    /// Shared secret for the cron trigger endpoint. None disables the check.
    pub cron_secret: Option<String>,
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Interval for the built-in cycle ticker, in seconds.
    pub tick_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("DRIPCOURSE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let base_url = std::env::var("DRIPCOURSE_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        let cron_secret = std::env::var("CRON_SECRET").ok().filter(|s| !s.is_empty());

        let db_path = std::env::var("DRIPCOURSE_DB_PATH")
            .unwrap_or_else(|_| "./data/dripcourse.db".to_string());

        let tick_secs: u64 = std::env::var("DRIPCOURSE_TICK_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);

        Self {
            port,
            base_url,
            cron_secret,
            db_path,
            tick_secs,
        }
    }
}

/// SMTP configuration for outbound email.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Per-send timeout in seconds, so one slow delivery cannot stall a cycle.
    pub send_timeout_secs: u64,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Fails if `SMTP_HOST` is not set — the app cannot run without delivery.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("SMTP_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("SMTP_HOST".into()))?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address =
            std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        let send_timeout_secs: u64 = std::env::var("SMTP_SEND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            host,
            port,
            username,
            password,
            from_address,
            send_timeout_secs,
        })
    }
}

/// Billing provider configuration.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Provider API base URL (overridable for tests).
    pub api_base: String,
    pub secret_key: SecretString,
    /// Price identifier for the subscription checkout.
    pub price_id: String,
    /// Secret used to verify webhook signatures.
    pub webhook_secret: SecretString,
    /// Request timeout in seconds for provider calls.
    pub request_timeout_secs: u64,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = std::env::var("BILLING_SECRET_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("BILLING_SECRET_KEY".into()))?;

        let price_id = std::env::var("BILLING_PRICE_ID")
            .map_err(|_| ConfigError::MissingEnvVar("BILLING_PRICE_ID".into()))?;

        let webhook_secret = std::env::var("BILLING_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("BILLING_WEBHOOK_SECRET".into()))?;

        let api_base = std::env::var("BILLING_API_BASE")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());

        let request_timeout_secs: u64 = std::env::var("BILLING_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        Ok(Self {
            api_base,
            secret_key: SecretString::from(secret_key),
            price_id,
            webhook_secret: SecretString::from(webhook_secret),
            request_timeout_secs,
        })
    }
}

/// Generative collaborator configuration for plan synthesis.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// API base URL (overridable for tests).
    pub api_base: String,
    pub api_key: SecretString,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl GeneratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;

        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());

        let model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let request_timeout_secs: u64 = std::env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            api_base,
            api_key: SecretString::from(api_key),
            model,
            request_timeout_secs,
        })
    }
}
