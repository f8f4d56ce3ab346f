//! OpenAI-compatible chat-completions provider.
//!
//! This module talks to any endpoint exposing the OpenAI `/chat/completions`
//! contract, which includes OpenAI itself and OpenRouter. The provider is
//! selected through the factory with the appropriate base URL.

use std::time::Duration;

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use mesa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenRouter exposes the same contract under a different base URL.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Chat-completions request format.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Chat-completions response format.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// Client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiClient {
    /// API base URL (e.g., `https://api.openai.com/v1`)
    base_url: String,

    /// Bearer token
    api_key: String,

    /// Provider label reported through `provider_name`
    provider: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client for the given base URL and API key.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            provider: provider.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Convert LlmRequest to chat-completions format.
    fn to_chat_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, provider = %self.provider, "Sending chat completion request");

        let chat_request = self.to_chat_request(request);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .bearer_auth(&self.api_key)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Llm(format!(
                        "{} request timed out after {}s",
                        self.provider, REQUEST_TIMEOUT_SECS
                    ))
                } else {
                    AppError::Llm(format!("Failed to send request to {}: {}", self.provider, e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "{} API error ({}): {}",
                self.provider, status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse {} response: {}", self.provider, e)))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::Llm(format!("{} response contained no choices", self.provider))
            })?;

        let usage = chat_response.usage.unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: chat_response.model.unwrap_or_else(|| request.model.clone()),
            usage: LlmUsage::new(usage.prompt_tokens, usage.completion_tokens),
        })
    }
}
