//! Groq chat-completion client
//!
//! Thin reqwest wrapper over the OpenAI-compatible completions endpoint.
//! Calls carry a hard timeout; a timeout surfaces as a network error, never
//! a hang.

use std::time::Duration;

use serde::Serialize;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed completion response")]
    MalformedResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_base: String, api_key: String, model: String) -> Self {
        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(_) => reqwest::Client::new(),
        };
        Self {
            client,
            api_base,
            api_key,
            model,
        }
    }

    /// One chat completion. `json_mode` forces a JSON object response, used
    /// by intent extraction.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(LlmError::MalformedResponse)
    }
}
