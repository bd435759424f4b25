//! Chat-side domain types and platform envelopes

use serde::Deserialize;
use uuid::Uuid;

use botlocal_shared::{PlanTier, UnknownPlanError};

/// Chat platform an update arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPlatform {
    Telegram,
    WhatsApp,
}

impl ChatPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatPlatform::Telegram => "telegram",
            ChatPlatform::WhatsApp => "whatsapp",
        }
    }
}

/// The credential a platform delivery identifies its tenant by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCredential {
    /// Telegram bot token from the webhook path.
    BotToken(String),
    /// Destination WhatsApp number from the payload.
    PhoneNumber(String),
}

/// A business (tenant) with its plan parsed into the enum.
#[derive(Debug, Clone)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub bot_personality: Option<String>,
    pub custom_instructions: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub twilio_phone: Option<String>,
    pub plan: PlanTier,
    pub message_count: i64,
    pub stripe_customer_id: Option<String>,
}

/// Raw row shape; the plan column is text until parsed.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BusinessRow {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub bot_personality: Option<String>,
    pub custom_instructions: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub twilio_phone: Option<String>,
    pub plan: String,
    pub message_count: i64,
    pub stripe_customer_id: Option<String>,
}

impl TryFrom<BusinessRow> for Business {
    type Error = UnknownPlanError;

    fn try_from(row: BusinessRow) -> Result<Self, Self::Error> {
        Ok(Business {
            plan: row.plan.parse()?,
            id: row.id,
            name: row.name,
            industry: row.industry,
            bot_personality: row.bot_personality,
            custom_instructions: row.custom_instructions,
            telegram_bot_token: row.telegram_bot_token,
            twilio_phone: row.twilio_phone,
            message_count: row.message_count,
            stripe_customer_id: row.stripe_customer_id,
        })
    }
}

/// Telegram update envelope. Only the fields the pipeline reads; everything
/// else in the update is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

/// Twilio inbound WhatsApp message (form-encoded webhook body).
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioInbound {
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
    #[serde(rename = "Body", default)]
    pub body: Option<String>,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
}

/// A queued inbound chat update, as accepted by a webhook receiver.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Telegram {
        token: String,
        update: TelegramUpdate,
    },
    WhatsApp {
        message_sid: String,
        business_phone: String,
        customer_phone: String,
        body: String,
    },
}

/// A normalized inbound turn: the shape the pipeline works with.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Platform-scoped idempotency key for this delivery.
    pub event_id: String,
    pub platform: ChatPlatform,
    pub credential: ChatCredential,
    pub customer_id: String,
    pub text: String,
}

impl ChatEvent {
    /// Extract the processable message, if any.
    ///
    /// Telegram updates without a text message (edits, stickers, joins) are
    /// not turns and normalize to `None`.
    pub fn normalize(&self) -> Option<InboundMessage> {
        match self {
            ChatEvent::Telegram { token, update } => {
                let message = update.message.as_ref()?;
                let text = message.text.clone()?;
                let from = message.from.as_ref()?;
                Some(InboundMessage {
                    event_id: format!("telegram:{}", update.update_id),
                    platform: ChatPlatform::Telegram,
                    credential: ChatCredential::BotToken(token.clone()),
                    customer_id: from.id.to_string(),
                    text,
                })
            }
            ChatEvent::WhatsApp {
                message_sid,
                business_phone,
                customer_phone,
                body,
            } => Some(InboundMessage {
                event_id: format!("twilio:{message_sid}"),
                platform: ChatPlatform::WhatsApp,
                credential: ChatCredential::PhoneNumber(business_phone.clone()),
                customer_id: customer_phone.clone(),
                text: body.clone(),
            }),
        }
    }
}
