//! Core domain types shared across crates

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subscription tier of a business.
///
/// Stored in the database as lowercase text. Parsing is total over the known
/// tiers and an error for everything else: an unrecognized plan key is a
/// construction-time failure, never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Starter,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// The tier a business lands on when a subscription is cancelled.
    pub const fn lowest() -> Self {
        PlanTier::Starter
    }

    pub const ALL: [PlanTier; 3] = [PlanTier::Starter, PlanTier::Pro, PlanTier::Enterprise];
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = UnknownPlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starter" => Ok(PlanTier::Starter),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            _ => Err(UnknownPlanError(s.to_string())),
        }
    }
}

/// An unrecognized plan key was encountered while constructing a domain value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan tier: {0}")]
pub struct UnknownPlanError(pub String);

/// Monthly message allowance attached to a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageQuota {
    Limited(u32),
    Unlimited,
}

impl MessageQuota {
    /// Whether a business that has already used `used` messages may send
    /// one more this period.
    pub fn allows(&self, used: i64) -> bool {
        match self {
            MessageQuota::Limited(limit) => used < i64::from(*limit),
            MessageQuota::Unlimited => true,
        }
    }

    pub fn limit(&self) -> Option<u32> {
        match self {
            MessageQuota::Limited(limit) => Some(*limit),
            MessageQuota::Unlimited => None,
        }
    }
}

impl fmt::Display for MessageQuota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageQuota::Limited(limit) => write!(f, "{limit}"),
            MessageQuota::Unlimited => f.write_str("unlimited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tiers_case_insensitively() {
        assert_eq!("starter".parse::<PlanTier>().unwrap(), PlanTier::Starter);
        assert_eq!("PRO".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!(
            "Enterprise".parse::<PlanTier>().unwrap(),
            PlanTier::Enterprise
        );
    }

    #[test]
    fn rejects_unknown_tier() {
        let err = "agency".parse::<PlanTier>().unwrap_err();
        assert_eq!(err, UnknownPlanError("agency".to_string()));
    }

    #[test]
    fn round_trips_through_as_str() {
        for tier in PlanTier::ALL {
            assert_eq!(tier.as_str().parse::<PlanTier>().unwrap(), tier);
        }
    }

    #[test]
    fn quota_boundary() {
        let quota = MessageQuota::Limited(100);
        assert!(quota.allows(99));
        assert!(!quota.allows(100));
        assert!(!quota.allows(101));
        assert!(MessageQuota::Unlimited.allows(i64::MAX - 1));
    }
}
