//! Plan catalog
//!
//! The catalog is a value object built once at startup and passed by
//! reference. It is never mutated after load, and lookups are total over
//! [`PlanTier`] so no code path can observe a missing plan.

use crate::types::{MessageQuota, PlanTier};

/// Features and pricing of a single tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSpec {
    /// Display name shown to tenants.
    pub name: &'static str,
    /// Monthly price in cents. Zero for the free tier.
    pub price_cents: i64,
    /// Monthly message allowance.
    pub monthly_messages: MessageQuota,
    /// Whether knowledge-base grounding is included.
    pub knowledge_base: bool,
}

/// Immutable quota table keyed by tier.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    starter: PlanSpec,
    pro: PlanSpec,
    enterprise: PlanSpec,
}

impl PlanCatalog {
    /// The production catalog.
    pub fn standard() -> Self {
        Self {
            starter: PlanSpec {
                name: "Starter",
                price_cents: 0,
                monthly_messages: MessageQuota::Limited(100),
                knowledge_base: false,
            },
            pro: PlanSpec {
                name: "Pro",
                price_cents: 2999,
                monthly_messages: MessageQuota::Limited(5_000),
                knowledge_base: true,
            },
            enterprise: PlanSpec {
                name: "Enterprise",
                price_cents: 9999,
                monthly_messages: MessageQuota::Unlimited,
                knowledge_base: true,
            },
        }
    }

    /// Total lookup: every tier has a spec.
    pub fn spec(&self, tier: PlanTier) -> &PlanSpec {
        match tier {
            PlanTier::Starter => &self.starter,
            PlanTier::Pro => &self.pro,
            PlanTier::Enterprise => &self.enterprise,
        }
    }

    pub fn quota(&self, tier: PlanTier) -> MessageQuota {
        self.spec(tier).monthly_messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_total() {
        let catalog = PlanCatalog::standard();
        for tier in PlanTier::ALL {
            // spec() cannot fail; exercise every arm
            let spec = catalog.spec(tier);
            assert!(!spec.name.is_empty());
        }
    }

    #[test]
    fn starter_is_free_with_bounded_quota() {
        let catalog = PlanCatalog::standard();
        let starter = catalog.spec(PlanTier::Starter);
        assert_eq!(starter.price_cents, 0);
        assert_eq!(starter.monthly_messages, MessageQuota::Limited(100));
    }

    #[test]
    fn enterprise_is_unlimited() {
        let catalog = PlanCatalog::standard();
        assert_eq!(
            catalog.quota(PlanTier::Enterprise),
            MessageQuota::Unlimited
        );
    }
}
