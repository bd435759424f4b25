//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use botlocal_billing::BillingError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Billing(BillingError::WebhookSignatureInvalid) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
