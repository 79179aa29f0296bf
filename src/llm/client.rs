//! Chat-completions client for the model service.
//!
//! Speaks the OpenAI-compatible chat API. The service endpoint, model
//! name, and key come from configuration; the client itself only knows
//! how to send one exchange and time it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, ChatOutcome, ChatRequest};
use crate::error::LlmError;

/// Configuration for the model service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Service endpoint base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model to use for extraction.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key; usually provided via the LLM_API_KEY environment variable.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Temperature for generation (kept low: extraction, not prose).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum characters of filing text per request.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_endpoint() -> String {
    "https://api.deepseek.com".to_string()
}
fn default_model() -> String {
    "deepseek-chat".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_content_chars() -> usize {
    60_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

/// Chat API request format.
#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

/// Chat API response format.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// HTTP client for the chat-completions API.
pub struct ChatClient {
    config: LlmConfig,
    client: Client,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        let body = CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: request.system,
                },
                Message {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.config.endpoint);
        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let start = Instant::now();
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(Duration::from_secs(self.config.timeout_secs))
            } else {
                LlmError::Connection(e.to_string())
            }
        })?;
        let latency = start.elapsed();

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {body}")));
        }

        let completion: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("response contained no choices".to_string()))?;

        debug!(model = %self.config.model, ?latency, "model call completed");
        Ok(ChatOutcome {
            content: choice.message.content,
            prompt_tokens: completion.usage.as_ref().and_then(|u| u.prompt_tokens),
            completion_tokens: completion.usage.as_ref().and_then(|u| u.completion_tokens),
            latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_chat_api() {
        let config = LlmConfig::default();
        assert!(config.endpoint.starts_with("https://"));
        assert!(config.temperature <= 0.2);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn completion_response_parses_with_and_without_usage() {
        let with_usage = r#"{
            "choices": [{"message": {"role": "assistant", "content": "[]"}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 5}
        }"#;
        let resp: CompletionResponse = serde_json::from_str(with_usage).unwrap();
        assert_eq!(resp.usage.unwrap().prompt_tokens, Some(100));

        let without_usage = r#"{"choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#;
        let resp: CompletionResponse = serde_json::from_str(without_usage).unwrap();
        assert!(resp.usage.is_none());
        assert_eq!(resp.choices[0].message.content, "hi");
    }
}
