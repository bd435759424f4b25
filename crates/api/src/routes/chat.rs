//! Chat platform webhook receivers
//!
//! Both receivers acknowledge fast and hand the envelope to the background
//! queue; processing failures never change the HTTP status once the 200 is
//! out. Platform retry contracts depend on that.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Form, Json};

use crate::chat::dispatch::WebhookStatus;
use crate::chat::types::{ChatEvent, TelegramUpdate, TwilioInbound};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /webhook/telegram/{token}`
///
/// The bot token in the path is the tenant credential; resolution happens in
/// the background task, not here.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(update): Json<TelegramUpdate>,
) -> StatusCode {
    tracing::debug!(update_id = update.update_id, "Telegram update received");
    state.queue.enqueue(ChatEvent::Telegram { token, update });
    StatusCode::OK
}

/// `POST /webhook/whatsapp` (Twilio form payload)
///
/// Missing parameters still get a 200 so Twilio stops retrying a payload
/// that will never become valid.
pub async fn whatsapp_webhook(
    State(state): State<AppState>,
    Form(inbound): Form<TwilioInbound>,
) -> (StatusCode, &'static str) {
    let (Some(message_sid), Some(body), Some(from), Some(to)) =
        (inbound.message_sid, inbound.body, inbound.from, inbound.to)
    else {
        tracing::warn!("WhatsApp webhook missing parameters - acknowledged and dropped");
        return (StatusCode::OK, "Missing parameters");
    };

    let customer_phone = from.strip_prefix("whatsapp:").unwrap_or(&from).to_string();
    let business_phone = to.strip_prefix("whatsapp:").unwrap_or(&to).to_string();

    state.queue.enqueue(ChatEvent::WhatsApp {
        message_sid,
        business_phone,
        customer_phone,
        body,
    });
    (StatusCode::OK, "OK")
}

/// `GET /webhook/telegram/status/{token}`
///
/// Read-only diagnostics for the dashboard: the webhook URL Telegram has
/// registered, its pending update count, and the last delivery error.
pub async fn telegram_webhook_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<WebhookStatus>> {
    let status = state
        .pipeline
        .dispatcher()
        .telegram_webhook_status(&token)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    Ok(Json(status))
}
