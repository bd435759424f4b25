//! Plan limiter

use std::sync::Arc;

use botlocal_shared::{MessageQuota, PlanCatalog};

use crate::chat::types::Business;

/// Snapshot of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: i64,
    pub quota: MessageQuota,
}

pub struct PlanLimiter {
    catalog: Arc<PlanCatalog>,
}

impl PlanLimiter {
    pub fn new(catalog: Arc<PlanCatalog>) -> Self {
        Self { catalog }
    }

    /// Allowed iff the business has headroom this period or its quota is
    /// unbounded. Pure: the caller owns what to do on denial.
    pub fn check(&self, business: &Business) -> QuotaDecision {
        let quota = self.catalog.quota(business.plan);
        QuotaDecision {
            allowed: quota.allows(business.message_count),
            used: business.message_count,
            quota,
        }
    }
}
