//! Completion client: LLM provider abstraction and the OpenAI-compatible backend

mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when interacting with an LLM provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response had no choices")]
    NoChoices,
}

/// Request to send to an LLM
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// User message/prompt
    pub prompt: String,

    /// Temperature (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// Response from an LLM
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text, trimmed
    pub content: String,

    /// Token usage statistics
    pub usage: Option<TokenUsage>,

    /// Time taken for generation (ms)
    pub duration_ms: Option<u64>,
}

/// Token usage statistics
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name for logging/identification
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;

    /// Send a completion request to the LLM
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;
}

/// Text shown when the model answered with nothing
pub const EMPTY_RESPONSE_TEXT: &str = "No response from the completion service.";

/// Text shown for transport, status and decoding failures
pub const FAILURE_TEXT: &str = "Error communicating with the completion service.";

/// Why a completion produced no usable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionFailure {
    /// The service answered, but with no choices or blank content
    EmptyResponse,
    /// Connection, timeout or other transport problem
    Transport(String),
    /// Non-success HTTP status
    Status { code: u16 },
    /// The body was not the expected JSON
    Malformed(String),
}

impl From<ProviderError> for CompletionFailure {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::HttpError(e) if e.is_decode() => Self::Malformed(e.to_string()),
            ProviderError::HttpError(e) => Self::Transport(e.to_string()),
            ProviderError::JsonError(e) => Self::Malformed(e.to_string()),
            ProviderError::Status { status, .. } => Self::Status { code: status },
            ProviderError::NoChoices => Self::EmptyResponse,
        }
    }
}

/// Outcome of one completion call. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Failed(CompletionFailure),
}

impl Completion {
    /// The model's text, or the fixed failure message
    pub fn display_text(&self) -> &str {
        match self {
            Completion::Text(text) => text,
            Completion::Failed(CompletionFailure::EmptyResponse) => EMPTY_RESPONSE_TEXT,
            Completion::Failed(_) => FAILURE_TEXT,
        }
    }

    pub fn failure(&self) -> Option<&CompletionFailure> {
        match self {
            Completion::Text(_) => None,
            Completion::Failed(reason) => Some(reason),
        }
    }
}

/// Wraps a provider with the fixed sampling parameters and folds errors into [`Completion`]
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            provider,
            max_tokens,
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Send `prompt` as a single user message
    pub async fn complete(&self, prompt: &str) -> Completion {
        let request = LlmRequest::new(prompt)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        match self.provider.complete(&request).await {
            Ok(response) if response.content.trim().is_empty() => {
                warn!(provider = %self.provider.name(), "Completion was empty");
                Completion::Failed(CompletionFailure::EmptyResponse)
            }
            Ok(response) => {
                debug!(
                    provider = %self.provider.name(),
                    content_len = response.content.len(),
                    duration_ms = ?response.duration_ms,
                    prompt_tokens = ?response.usage.as_ref().map(|u| u.prompt_tokens),
                    completion_tokens = ?response.usage.as_ref().map(|u| u.completion_tokens),
                    total_tokens = ?response.usage.as_ref().map(|u| u.total_tokens),
                    "Got completion"
                );
                Completion::Text(response.content)
            }
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "Completion request failed");
                Completion::Failed(e.into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider that replays canned replies and records every prompt
    #[derive(Default)]
    pub struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, u16>>>,
        pub prompts: Mutex<Vec<String>>,
        pub delay: Option<Duration>,
    }

    impl ScriptedProvider {
        pub fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                ..Self::default()
            }
        }

        pub fn failing(status: u16) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from(vec![Err(status)])),
                ..Self::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let reply = self.replies.lock().unwrap().pop_front();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Some(Ok(content)) => Ok(LlmResponse {
                    content,
                    usage: None,
                    duration_ms: Some(0),
                }),
                Some(Err(status)) => Err(ProviderError::Status {
                    status,
                    body: String::new(),
                }),
                None => Err(ProviderError::NoChoices),
            }
        }
    }
}
