//! OpenAI-compatible chat completions client.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::prompt::{user_prompt, SYSTEM_PROMPT};
use super::response::parse_response;
use crate::error::LlmError;
use crate::models::bill::BillRecord;
use crate::models::config::LlmConfig;

/// Extracts bill records by asking a chat model.
pub struct LlmBillExtractor {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: String,
}

impl LlmBillExtractor {
    /// Build a client, reading the API key from the configured variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit API key.
    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(text) }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" }
        })
    }

    /// Send the document text to the model and parse its answer.
    pub async fn extract_text(&self, text: &str) -> Result<BillRecord, LlmError> {
        info!(
            "Requesting extraction from {} for {} characters of text",
            self.config.model,
            text.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("LLM API returned {}: {}", status, body);
            return Err(LlmError::Request(format!("HTTP {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content = message_content(&body).ok_or(LlmError::EmptyResponse)?;
        debug!("LLM raw response: {}", content);

        parse_response(content).inspect_err(|e| {
            error!("Error processing LLM response: {}", e);
        })
    }
}

/// `choices[0].message.content` of a chat completion.
fn message_content(body: &Value) -> Option<&str> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .filter(|c| !c.trim().is_empty())
}
