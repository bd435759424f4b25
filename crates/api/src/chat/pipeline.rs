//! Per-event chat pipeline
//!
//! Runs one inbound chat update end to end: dedup, tenant resolution,
//! conversation append, quota check, reply generation, dispatch, and the
//! usage-counter increment. Duplicate deliveries, unknown tenants, and
//! quota denials are normal outcomes, not errors.

use sqlx::PgPool;
use uuid::Uuid;

use crate::chat::dispatch::Dispatcher;
use crate::chat::guard::{Claim, IdempotencyGuard};
use crate::chat::limiter::PlanLimiter;
use crate::chat::orchestrator::{ReplyOrchestrator, FALLBACK_REPLY, LIMIT_REACHED_REPLY};
use crate::chat::store::{ConversationStore, MessageRole};
use crate::chat::types::ChatEvent;
use crate::chat::{ChatError, TenantDirectory};

/// Turns of context handed to the orchestrator.
const HISTORY_TURNS: i64 = 5;

pub struct ChatPipeline {
    pool: PgPool,
    guard: IdempotencyGuard,
    directory: TenantDirectory,
    store: ConversationStore,
    limiter: PlanLimiter,
    orchestrator: ReplyOrchestrator,
    dispatcher: Dispatcher,
}

impl ChatPipeline {
    pub fn new(
        pool: PgPool,
        guard: IdempotencyGuard,
        directory: TenantDirectory,
        store: ConversationStore,
        limiter: PlanLimiter,
        orchestrator: ReplyOrchestrator,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            pool,
            guard,
            directory,
            store,
            limiter,
            orchestrator,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Entry point for queue workers. Failures are logged, never panicked;
    /// the webhook was already acknowledged.
    pub async fn process(&self, event: ChatEvent) {
        if let Err(e) = self.run(&event).await {
            tracing::error!(error = %e, "Chat turn failed");
        }
    }

    async fn run(&self, event: &ChatEvent) -> Result<(), ChatError> {
        let Some(inbound) = event.normalize() else {
            tracing::debug!("Ignoring update without a text message");
            return Ok(());
        };

        // Fail closed: a guard error skips the turn; the platform redelivers
        match self.guard.claim(&inbound.event_id).await? {
            Claim::Duplicate => {
                tracing::info!(event_id = %inbound.event_id, "Duplicate chat update ignored");
                return Ok(());
            }
            Claim::Fresh => {}
        }

        let Some(business) = self.directory.resolve(&inbound.credential).await? else {
            tracing::warn!(
                event_id = %inbound.event_id,
                platform = inbound.platform.as_str(),
                "No business bound to inbound credential - dropping update"
            );
            return Ok(());
        };

        let conversation = self
            .store
            .get_or_create(business.id, &inbound.customer_id)
            .await?;

        // History is read before the new message is appended so the
        // orchestrator sees "everything before this turn"
        let history = self.store.recent(conversation.id, HISTORY_TURNS).await?;

        // The inbound message is always recorded, even when AI assist is
        // off or the quota is exhausted, so human agents see it
        self.store
            .append(conversation.id, MessageRole::Customer, &inbound.text)
            .await?;

        if !conversation.ai_enabled {
            tracing::info!(
                conversation_id = %conversation.id,
                "AI assist disabled - message recorded, no reply"
            );
            return Ok(());
        }

        let decision = self.limiter.check(&business);
        if !decision.allowed {
            tracing::info!(
                business_id = %business.id,
                used = decision.used,
                quota = %decision.quota,
                "Plan quota exhausted - sending limit notice"
            );
            if let Err(e) = self
                .dispatcher
                .send(
                    &business,
                    inbound.platform,
                    &inbound.customer_id,
                    LIMIT_REACHED_REPLY,
                )
                .await
            {
                tracing::error!(business_id = %business.id, error = %e, "Limit notice send failed");
            }
            return Ok(());
        }

        match self
            .orchestrator
            .generate(&business, &inbound.customer_id, &history, &inbound.text)
            .await
        {
            Ok(outcome) => {
                self.store
                    .append(conversation.id, MessageRole::Assistant, &outcome.reply_text)
                    .await?;

                let delivered = self
                    .dispatcher
                    .send_with_fallback(
                        &business,
                        inbound.platform,
                        &inbound.customer_id,
                        &outcome.reply_text,
                    )
                    .await;

                // Only delivered, orchestrated replies count against the
                // quota; fallback-only turns do not
                if delivered {
                    self.record_usage(business.id).await?;
                }

                tracing::info!(
                    business_id = %business.id,
                    conversation_id = %conversation.id,
                    booking_created = outcome.booking_created,
                    delivered = delivered,
                    "Chat turn complete"
                );
            }
            Err(e) => {
                tracing::error!(
                    business_id = %business.id,
                    error = %e,
                    "Reply generation failed - sending fallback"
                );
                if let Err(send_err) = self
                    .dispatcher
                    .send(
                        &business,
                        inbound.platform,
                        &inbound.customer_id,
                        FALLBACK_REPLY,
                    )
                    .await
                {
                    tracing::error!(
                        business_id = %business.id,
                        error = %send_err,
                        "Fallback send failed"
                    );
                }
            }
        }

        Ok(())
    }

    /// Atomic increment; never a read-modify-write.
    async fn record_usage(&self, business_id: Uuid) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET message_count = message_count + 1,
                last_message_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(business_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
