//! Stripe configuration

use crate::error::{BillingError, BillingResult};

/// Stripe webhook credentials.
///
/// Only the signing secret is needed by the event pipeline; outbound Stripe
/// API calls (checkout, portal) live in the dashboard service.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// The `whsec_...` signing secret for the webhook endpoint.
    pub webhook_secret: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::MissingConfig("STRIPE_WEBHOOK_SECRET"))?;
        Ok(Self { webhook_secret })
    }

    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }
}
