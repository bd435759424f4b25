//! Payment provider webhook receiver
//!
//! The one webhook allowed to return non-200: 400 tells Stripe the payload
//! was unsigned or tampered, 500 triggers its retry path after a processing
//! failure. Duplicates are a success.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// `POST /webhook/stripe`
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
    else {
        tracing::warn!("Stripe webhook without signature header");
        return (StatusCode::BAD_REQUEST, "missing stripe-signature header").into_response();
    };

    let Ok(payload) = std::str::from_utf8(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid body encoding").into_response();
    };

    let event = match state.billing.webhooks.verify_event(payload, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Stripe webhook rejected");
            return (StatusCode::BAD_REQUEST, "signature verification failed").into_response();
        }
    };

    match state.billing.webhooks.handle_event(event, payload).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Stripe webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "processing failed").into_response()
        }
    }
}
