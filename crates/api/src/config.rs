//! Server configuration

use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for environment variable {0}")]
    Invalid(&'static str),
}

/// Environment-derived configuration for the API server.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Publicly reachable base URL, used when registering chat webhooks.
    pub public_base_url: String,
    pub telegram_api_base: String,
    pub twilio_api_base: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub groq_api_base: String,
    pub groq_api_key: String,
    pub groq_model: String,
    /// Number of background chat workers draining the queue.
    pub chat_workers: usize,
    /// Bound of the chat handoff queue.
    pub chat_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_address: optional("BIND_ADDRESS", "0.0.0.0:3001"),
            public_base_url: required("PUBLIC_BASE_URL")?,
            telegram_api_base: optional("TELEGRAM_API_BASE", "https://api.telegram.org"),
            twilio_api_base: optional("TWILIO_API_BASE", "https://api.twilio.com"),
            twilio_account_sid: optional("TWILIO_ACCOUNT_SID", ""),
            twilio_auth_token: optional("TWILIO_AUTH_TOKEN", ""),
            groq_api_base: optional("GROQ_API_BASE", "https://api.groq.com/openai/v1"),
            groq_api_key: required("GROQ_API_KEY")?,
            groq_model: optional("GROQ_MODEL", "llama-3.3-70b-versatile"),
            chat_workers: optional_parsed("CHAT_WORKERS", 8)?,
            chat_queue_capacity: optional_parsed("CHAT_QUEUE_CAPACITY", 1024)?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_parsed(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}
