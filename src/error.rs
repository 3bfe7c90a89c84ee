//! Error types for dripcourse.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

/// Top-level error type for the application.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Plan generation error: {0}")]
    PlanGeneration(#[from] PlanGenerationError),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Authentication errors — missing/invalid session or magic-link token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No session")]
    NoSession,

    #[error("Session refers to unknown account")]
    InvalidSession,

    #[error("Magic link not found")]
    TokenNotFound,

    #[error("Magic link expired")]
    TokenExpired,

    #[error("Cron trigger unauthorized")]
    CronUnauthorized,
}

/// Input validation errors for onboarding and goal edits.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Unknown goal category: {0}")]
    UnknownCategory(String),

    #[error("Unknown experience stage: {0}")]
    UnknownStage(String),

    #[error("Goal text must be between 1 and {max} characters")]
    GoalTextLength { max: usize },
}

/// Email delivery failed. Retried implicitly by the next scheduled cycle —
/// the scheduler does not advance state on this error.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Smtp(String),

    #[error("Delivery timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Content generation produced a malformed plan. Aborts onboarding;
/// no partial goal/plan state is persisted.
#[derive(Debug, thiserror::Error)]
pub enum PlanGenerationError {
    #[error("Generator request failed: {0}")]
    RequestFailed(String),

    #[error("Generator returned invalid JSON: {0}")]
    InvalidResponse(String),

    #[error("Expected {expected} plan entries, got {got}")]
    WrongEntryCount { expected: usize, got: usize },

    #[error("Plan entry for day {day} is missing {field}")]
    MissingField { day: u32, field: &'static str },

    #[error("Plan entry day numbers are not contiguous at position {position}")]
    NonContiguousDays { position: usize },
}

/// Billing provider and webhook errors.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Webhook signature missing")]
    SignatureMissing,

    #[error("Webhook signature invalid")]
    SignatureInvalid,

    #[error("Webhook payload malformed: {0}")]
    MalformedEvent(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Checkout session has no URL")]
    MissingCheckoutUrl,

    #[error("Account {0} has no active subscription")]
    NoSubscription(Uuid),

    #[error("Account {0} already has an active subscription")]
    AlreadySubscribed(Uuid),
}

/// Attempt to edit, complete, or cancel an already-terminal goal.
#[derive(Debug, thiserror::Error)]
#[error("Goal {goal_id} is already {state}")]
pub struct ConflictError {
    pub goal_id: Uuid,
    pub state: &'static str,
}

impl Error {
    /// HTTP status for this error when it escapes a route handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Billing(BillingError::SignatureMissing)
            | Error::Billing(BillingError::SignatureInvalid) => StatusCode::BAD_REQUEST,
            Error::Billing(BillingError::MalformedEvent(_)) => StatusCode::BAD_REQUEST,
            Error::Billing(BillingError::NoSubscription(_))
            | Error::Billing(BillingError::AlreadySubscribed(_)) => StatusCode::BAD_REQUEST,
            Error::Database(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, Error>;
