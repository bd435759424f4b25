// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! BotLocal Billing Module
//!
//! Handles Stripe integration for the event pipeline.
//!
//! ## Features
//!
//! - **Webhooks**: Signature verification and idempotent processing of
//!   Stripe events (checkout completed, subscription cancelled, payment
//!   failed)
//! - **Plan Transitions**: Upgrade/downgrade of a business's tier, bound to
//!   its Stripe customer id
//! - **Notifications**: Success/error/payment records surfaced to the
//!   dashboard

pub mod config;
pub mod error;
pub mod notifications;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

pub use config::StripeConfig;
pub use error::{BillingError, BillingResult};
pub use notifications::{NotificationCategory, NotificationService};
pub use webhooks::WebhookHandler;

use botlocal_shared::PlanCatalog;
use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub notifications: NotificationService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool, catalog: PlanCatalog) -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config, pool, catalog))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool, catalog: PlanCatalog) -> Self {
        let notifications = NotificationService::new(pool.clone());
        Self {
            notifications: notifications.clone(),
            webhooks: WebhookHandler::new(config, pool, notifications, catalog),
        }
    }
}
