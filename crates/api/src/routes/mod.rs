//! HTTP routes

pub mod chat;
pub mod stripe;

use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/telegram/{token}", post(chat::telegram_webhook))
        .route(
            "/webhook/telegram/status/{token}",
            get(chat::telegram_webhook_status),
        )
        .route("/webhook/whatsapp", post(chat::whatsapp_webhook))
        .route("/webhook/stripe", post(stripe::stripe_webhook))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
