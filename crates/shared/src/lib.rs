// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! BotLocal Shared Crate
//!
//! Common infrastructure used by the api, billing, and worker crates:
//!
//! - Database pool construction and embedded migrations
//! - The `PlanTier` enum and the immutable `PlanCatalog` loaded at startup

pub mod db;
pub mod plans;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use plans::{PlanCatalog, PlanSpec};
pub use types::{MessageQuota, PlanTier, UnknownPlanError};
