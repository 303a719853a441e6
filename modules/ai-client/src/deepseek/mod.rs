mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AiError, Result};
use crate::traits::Completion;

use client::DeepSeekClient;

const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// DeepSeek Agent
// =============================================================================

/// Chat-completion agent for DeepSeek or any endpoint speaking the same
/// OpenAI-style `/chat/completions` protocol (see [`DeepSeek::with_base_url`]).
#[derive(Clone)]
pub struct DeepSeek {
    api_key: String,
    pub(crate) model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    http: reqwest::Client,
}

impl DeepSeek {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEEPSEEK_API_URL.to_string(),
            temperature: 0.1,
            max_tokens: 500,
            timeout: DEFAULT_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .map_err(|_| AiError::Config("DEEPSEEK_API_KEY environment variable not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Per-request timeout. A timed-out call surfaces as [`AiError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self) -> DeepSeekClient<'_> {
        DeepSeekClient::new(&self.api_key, &self.http, &self.base_url, self.timeout)
    }

    /// Single user-role chat completion, returning the first choice's text.
    pub async fn chat_completion(&self, prompt: &str) -> Result<String> {
        let request = types::ChatRequest::new(&self.model)
            .message(types::WireMessage::user(prompt))
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);

        let response = self.client().chat(&request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        response
            .into_text()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| AiError::Parse(format!("No choices in reply from {}", self.base_url)))
    }
}

// =============================================================================
// Completion Implementation
// =============================================================================

#[async_trait]
impl Completion for DeepSeek {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat_completion(prompt).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deepseek_new_uses_extraction_defaults() {
        let ds = DeepSeek::new("sk-test", "deepseek-chat");
        assert_eq!(ds.model, "deepseek-chat");
        assert_eq!(ds.api_key, "sk-test");
        assert_eq!(ds.base_url(), "https://api.deepseek.com/v1");
        assert!((ds.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(ds.max_tokens, 500);
    }

    #[test]
    fn test_deepseek_builder_overrides() {
        let ds = DeepSeek::new("sk-test", "deepseek-chat")
            .with_base_url("http://localhost:8080/v1")
            .with_temperature(0.0)
            .with_max_tokens(256)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ds.base_url(), "http://localhost:8080/v1");
        assert_eq!(ds.max_tokens, 256);
        assert_eq!(ds.timeout, Duration::from_secs(5));
    }
}
