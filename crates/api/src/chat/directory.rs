//! Tenant directory
//!
//! Pure credential-to-business lookup for the chat path. The billing path
//! resolves tenants from event metadata instead and never goes through here.

use sqlx::PgPool;

use crate::chat::types::{Business, BusinessRow, ChatCredential};
use crate::chat::ChatError;

const SELECT_BY_BOT_TOKEN: &str = r#"
    SELECT id, name, industry, bot_personality, custom_instructions,
           telegram_bot_token, twilio_phone, plan, message_count,
           stripe_customer_id
    FROM businesses
    WHERE telegram_bot_token = $1
"#;

const SELECT_BY_PHONE: &str = r#"
    SELECT id, name, industry, bot_personality, custom_instructions,
           telegram_bot_token, twilio_phone, plan, message_count,
           stripe_customer_id
    FROM businesses
    WHERE twilio_phone = $1
"#;

pub struct TenantDirectory {
    pool: PgPool,
}

impl TenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve an inbound credential to its business, if bound.
    pub async fn resolve(
        &self,
        credential: &ChatCredential,
    ) -> Result<Option<Business>, ChatError> {
        let row: Option<BusinessRow> = match credential {
            ChatCredential::BotToken(token) => {
                sqlx::query_as(SELECT_BY_BOT_TOKEN)
                    .bind(token)
                    .fetch_optional(&self.pool)
                    .await?
            }
            ChatCredential::PhoneNumber(phone) => {
                sqlx::query_as(SELECT_BY_PHONE)
                    .bind(phone)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        row.map(Business::try_from)
            .transpose()
            .map_err(ChatError::from)
    }
}
