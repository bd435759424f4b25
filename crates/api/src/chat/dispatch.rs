//! Outbound dispatch
//!
//! Sends replies back to the originating chat platform. Owns its HTTP
//! clients; nothing here is process-global. A definitive send failure
//! triggers one best-effort fallback message, and a failed fallback is
//! logged and swallowed - chat-send failures never propagate upstream as
//! webhook errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::chat::types::{Business, ChatPlatform};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Sent when the orchestrated reply could not be delivered or produced.
pub const UNAVAILABLE_REPLY: &str =
    "Thank you for your message! We are currently unavailable, please contact us directly.";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("telegram api error: {0}")]
    Telegram(String),
    #[error("twilio api error {status}: {body}")]
    Twilio { status: u16, body: String },
    #[error("business has no {0} credential")]
    MissingCredential(&'static str),
}

#[derive(Debug, Serialize)]
struct TelegramSendMessage {
    chat_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
}

/// Registered-webhook state for the diagnostics endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookStatus {
    pub url: String,
    pub pending_update_count: i64,
    pub last_error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub api_base: String,
}

pub struct Dispatcher {
    client: reqwest::Client,
    telegram_api_base: String,
    twilio: TwilioConfig,
    public_base_url: String,
}

impl Dispatcher {
    pub fn new(telegram_api_base: String, twilio: TwilioConfig, public_base_url: String) -> Self {
        let client = match reqwest::Client::builder().timeout(SEND_TIMEOUT).build() {
            Ok(client) => client,
            Err(_) => reqwest::Client::new(),
        };
        Self {
            client,
            telegram_api_base,
            twilio,
            public_base_url,
        }
    }

    /// Send `text` to the customer, retrying once on failure.
    pub async fn send(
        &self,
        business: &Business,
        platform: ChatPlatform,
        customer_id: &str,
        text: &str,
    ) -> Result<(), DispatchError> {
        Retry::spawn(FixedInterval::from_millis(500).take(1), || {
            self.send_once(business, platform, customer_id, text)
        })
        .await
    }

    /// Send with the fallback contract: on definitive failure, attempt one
    /// generic unavailable message and swallow its outcome. Returns whether
    /// the primary text was delivered.
    pub async fn send_with_fallback(
        &self,
        business: &Business,
        platform: ChatPlatform,
        customer_id: &str,
        text: &str,
    ) -> bool {
        match self.send(business, platform, customer_id, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    business_id = %business.id,
                    platform = platform.as_str(),
                    error = %e,
                    "Chat send failed, attempting fallback message"
                );
                if let Err(fallback_err) = self
                    .send_once(business, platform, customer_id, UNAVAILABLE_REPLY)
                    .await
                {
                    tracing::error!(
                        business_id = %business.id,
                        error = %fallback_err,
                        "Fallback send failed"
                    );
                }
                false
            }
        }
    }

    async fn send_once(
        &self,
        business: &Business,
        platform: ChatPlatform,
        customer_id: &str,
        text: &str,
    ) -> Result<(), DispatchError> {
        match platform {
            ChatPlatform::Telegram => {
                let token = business
                    .telegram_bot_token
                    .as_deref()
                    .ok_or(DispatchError::MissingCredential("telegram"))?;
                self.send_telegram(token, customer_id, text).await
            }
            ChatPlatform::WhatsApp => self.send_whatsapp(business, customer_id, text).await,
        }
    }

    async fn send_telegram(
        &self,
        token: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<(), DispatchError> {
        let payload = TelegramSendMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        };

        let response = self
            .client
            .post(format!(
                "{}/bot{}/sendMessage",
                self.telegram_api_base, token
            ))
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?
            .json::<TelegramApiResponse>()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        if !response.ok {
            return Err(DispatchError::Telegram(
                response
                    .description
                    .unwrap_or_else(|| "unknown telegram error".to_string()),
            ));
        }
        Ok(())
    }

    async fn send_whatsapp(
        &self,
        business: &Business,
        customer_phone: &str,
        text: &str,
    ) -> Result<(), DispatchError> {
        let from = business
            .twilio_phone
            .as_deref()
            .ok_or(DispatchError::MissingCredential("whatsapp"))?;

        let from = with_whatsapp_prefix(from);
        let to = with_whatsapp_prefix(customer_phone);

        let response = self
            .client
            .post(format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                self.twilio.api_base, self.twilio.account_sid
            ))
            .basic_auth(&self.twilio.account_sid, Some(&self.twilio.auth_token))
            .form(&[("Body", text), ("From", &from), ("To", &to)])
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Twilio { status, body });
        }
        Ok(())
    }

    /// Register this server as the bot's webhook target.
    pub async fn register_telegram_webhook(&self, token: &str) -> Result<(), DispatchError> {
        let webhook_url = format!("{}/webhook/telegram/{}", self.public_base_url, token);
        let response = self
            .client
            .post(format!("{}/bot{}/setWebhook", self.telegram_api_base, token))
            .json(&serde_json::json!({ "url": webhook_url }))
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?
            .json::<TelegramApiResponse>()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        if !response.ok {
            return Err(DispatchError::Telegram(
                response
                    .description
                    .unwrap_or_else(|| "setWebhook rejected".to_string()),
            ));
        }

        tracing::info!(webhook_url = %webhook_url, "Telegram webhook registered");
        Ok(())
    }

    /// Current webhook binding as reported by Telegram.
    pub async fn telegram_webhook_status(
        &self,
        token: &str,
    ) -> Result<WebhookStatus, DispatchError> {
        let response = self
            .client
            .get(format!(
                "{}/bot{}/getWebhookInfo",
                self.telegram_api_base, token
            ))
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?
            .json::<TelegramApiResponse>()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        if !response.ok {
            return Err(DispatchError::Telegram(
                response
                    .description
                    .unwrap_or_else(|| "getWebhookInfo rejected".to_string()),
            ));
        }

        let status = response
            .result
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DispatchError::Telegram(format!("unexpected webhook info: {e}")))?
            .unwrap_or_default();
        Ok(status)
    }
}

fn with_whatsapp_prefix(phone: &str) -> String {
    if phone.starts_with("whatsapp:") {
        phone.to_string()
    } else {
        format!("whatsapp:{phone}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whatsapp_prefix_is_idempotent() {
        assert_eq!(with_whatsapp_prefix("+123"), "whatsapp:+123");
        assert_eq!(with_whatsapp_prefix("whatsapp:+123"), "whatsapp:+123");
    }
}
