// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! BotLocal API Library
//!
//! The inbound event processing pipeline: webhook receivers for chat
//! platforms and the payment provider, idempotent event handling, per-tenant
//! conversation state, plan quota enforcement, AI reply generation, and
//! outbound dispatch.

pub mod chat;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use state::AppState;
