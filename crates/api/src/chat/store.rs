//! Conversation store
//!
//! Append-only per-(business, customer) message log. Appends are row
//! inserts ordered by a sequence, so concurrent writers to the same
//! conversation serialize without ever rewriting history. Rows carry a
//! schema version; unknown versions fail the read instead of being
//! reinterpreted.

use sqlx::PgPool;
use uuid::Uuid;

use crate::chat::ChatError;

/// Version written on every appended row.
pub const MESSAGE_SCHEMA_VERSION: i16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    Customer,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Customer => "customer",
            MessageRole::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(MessageRole::Customer),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// One stored conversation turn.
#[derive(Debug, Clone)]
pub struct TurnMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_id: String,
    pub ai_enabled: bool,
}

pub struct ConversationStore {
    pool: PgPool,
}

impl ConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the conversation for this (business, customer) pair, creating
    /// it lazily on first contact. Safe under concurrent callers: the unique
    /// constraint makes the insert a no-op for the loser.
    pub async fn get_or_create(
        &self,
        business_id: Uuid,
        customer_id: &str,
    ) -> Result<Conversation, ChatError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (business_id, customer_id)
            VALUES ($1, $2)
            ON CONFLICT (business_id, customer_id) DO NOTHING
            "#,
        )
        .bind(business_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        let conversation = sqlx::query_as(
            r#"
            SELECT id, business_id, customer_id, ai_enabled
            FROM conversations
            WHERE business_id = $1 AND customer_id = $2
            "#,
        )
        .bind(business_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Append one message. Monotonic: existing rows are never touched.
    pub async fn append(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, schema_version)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(MESSAGE_SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Last `n` turns in append order.
    pub async fn recent(
        &self,
        conversation_id: Uuid,
        n: i64,
    ) -> Result<Vec<TurnMessage>, ChatError> {
        let rows: Vec<(String, String, i16)> = sqlx::query_as(
            r#"
            SELECT role, content, schema_version
            FROM messages
            WHERE conversation_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for (role, content, schema_version) in rows.into_iter().rev() {
            if schema_version > MESSAGE_SCHEMA_VERSION {
                return Err(ChatError::MessageSchema(format!(
                    "message schema version {schema_version} is newer than supported {MESSAGE_SCHEMA_VERSION}"
                )));
            }
            let role = MessageRole::parse(&role).ok_or_else(|| {
                ChatError::MessageSchema(format!("unknown message role: {role}"))
            })?;
            turns.push(TurnMessage { role, content });
        }
        Ok(turns)
    }

    /// Toggle AI assist for a conversation (dashboard-driven).
    pub async fn set_ai_enabled(
        &self,
        conversation_id: Uuid,
        enabled: bool,
    ) -> Result<(), ChatError> {
        sqlx::query(
            "UPDATE conversations SET ai_enabled = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
