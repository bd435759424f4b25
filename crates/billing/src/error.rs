//! Billing error types

use botlocal_shared::UnknownPlanError;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("missing required environment variable {0}")]
    MissingConfig(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("event {event_id} is missing metadata field {field}")]
    MissingMetadata {
        event_id: String,
        field: &'static str,
    },

    #[error("invalid metadata in event {event_id}: {reason}")]
    InvalidMetadata { event_id: String, reason: String },

    #[error(transparent)]
    UnknownPlan(#[from] UnknownPlanError),

    #[error("unexpected payload object for event type {0}")]
    UnexpectedObject(String),
}
