//! Chat pipeline
//!
//! Everything between an acknowledged webhook delivery and the outbound
//! reply: dedup, tenant resolution, conversation state, quota, reply
//! generation, and dispatch.

pub mod directory;
pub mod dispatch;
pub mod guard;
pub mod limiter;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod types;

#[cfg(test)]
mod edge_case_tests;

pub use directory::TenantDirectory;
pub use dispatch::{DispatchError, Dispatcher, WebhookStatus};
pub use guard::{Claim, IdempotencyGuard};
pub use limiter::{PlanLimiter, QuotaDecision};
pub use llm::{GroqClient, LlmError};
pub use orchestrator::{ReplyOrchestrator, ReplyOutcome, FALLBACK_REPLY, LIMIT_REACHED_REPLY};
pub use pipeline::ChatPipeline;
pub use queue::ChatQueue;
pub use store::{Conversation, ConversationStore, MessageRole, TurnMessage};
pub use types::{Business, ChatCredential, ChatEvent, ChatPlatform};

use botlocal_shared::UnknownPlanError;

/// Errors surfaced by a chat pipeline turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Plan(#[from] UnknownPlanError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("intent extraction failed: {0}")]
    Extraction(String),

    #[error("message log schema error: {0}")]
    MessageSchema(String),
}
