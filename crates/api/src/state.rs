//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use botlocal_billing::{BillingResult, BillingService};
use botlocal_shared::PlanCatalog;

use crate::chat::dispatch::{Dispatcher, TwilioConfig};
use crate::chat::{
    ChatPipeline, ChatQueue, ConversationStore, GroqClient, IdempotencyGuard, PlanLimiter,
    ReplyOrchestrator, TenantDirectory,
};
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
    pub pipeline: Arc<ChatPipeline>,
    pub queue: ChatQueue,
}

impl AppState {
    /// Wire up the pipeline. Every service is constructor-injected here;
    /// nothing holds process-global state.
    pub fn new(pool: PgPool, config: Config) -> BillingResult<Self> {
        // Loaded once, passed by reference, never mutated after load
        let catalog = PlanCatalog::standard();

        let billing = Arc::new(BillingService::from_env(pool.clone(), catalog.clone())?);
        tracing::info!("Stripe billing service initialized");

        let llm = GroqClient::new(
            config.groq_api_base.clone(),
            config.groq_api_key.clone(),
            config.groq_model.clone(),
        );

        let dispatcher = Dispatcher::new(
            config.telegram_api_base.clone(),
            TwilioConfig {
                account_sid: config.twilio_account_sid.clone(),
                auth_token: config.twilio_auth_token.clone(),
                api_base: config.twilio_api_base.clone(),
            },
            config.public_base_url.clone(),
        );

        let pipeline = Arc::new(ChatPipeline::new(
            pool.clone(),
            IdempotencyGuard::new(pool.clone()),
            TenantDirectory::new(pool.clone()),
            ConversationStore::new(pool.clone()),
            PlanLimiter::new(Arc::new(catalog)),
            ReplyOrchestrator::new(llm, pool.clone()),
            dispatcher,
        ));

        let queue = ChatQueue::start(
            pipeline.clone(),
            config.chat_workers,
            config.chat_queue_capacity,
        );

        Ok(Self {
            pool,
            config,
            billing,
            pipeline,
            queue,
        })
    }
}
