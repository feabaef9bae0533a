//! OpenAI-compatible chat-completion provider
//!
//! Posts a single user message to `completion_url` with a bearer credential.
//! Works against OpenAI itself and against gateways that mirror its API.

use super::{LlmProvider, LlmRequest, LlmResponse, ProviderError, TokenUsage};
use crate::credential::Credential;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: Client,
    completion_url: String,
    credential: Credential,
    model: String,
}

impl OpenAiProvider {
    /// Create a provider with the given request timeout
    pub fn new(
        completion_url: impl Into<String>,
        credential: Credential,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            completion_url: completion_url.into(),
            credential,
            model: model.into(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let chat_request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let start = Instant::now();

        let mut builder = self.client.post(&self.completion_url).json(&chat_request);
        if let Some(token) = self.credential.token() {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let body = response.text().await?;
        let chat_response: ChatResponse = serde_json::from_str(&body)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::NoChoices)?
            .message
            .content
            .unwrap_or_default()
            .trim()
            .to_string();

        let usage = chat_response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            usage,
            duration_ms: Some(duration_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Completion, CompletionClient, CompletionFailure, FAILURE_TEXT};
    use mockito::Matcher;
    use std::sync::Arc;

    fn provider(url: String, credential: Credential) -> OpenAiProvider {
        OpenAiProvider::new(url, credential, "gpt-4o-mini", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_sends_openai_body_and_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "describe"}],
                "max_tokens": 2000
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"  An orders table.\n"}}],
                    "usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
            )
            .create_async()
            .await;

        let provider = provider(
            format!("{}/v1/chat/completions", server.url()),
            Credential::new("secret"),
        );
        let request = LlmRequest::new("describe").with_max_tokens(2000).with_temperature(0.2);
        let response = provider.complete(&request).await.unwrap();

        assert_eq!(response.content, "An orders table.");
        assert_eq!(response.usage.unwrap().total_tokens, 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_credential_sends_no_auth_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let provider = provider(server.url(), Credential::absent());
        let err = provider.complete(&LlmRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let provider = provider(server.url(), Credential::new("k"));
        let err = provider.complete(&LlmRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NoChoices));
    }

    #[tokio::test]
    async fn test_malformed_body_is_contained() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>gateway error</html>")
            .create_async()
            .await;

        let client = CompletionClient::new(
            Arc::new(provider(server.url(), Credential::new("k"))),
            2000,
            0.2,
        );
        let completion = client.complete("x").await;
        assert!(matches!(
            completion,
            Completion::Failed(CompletionFailure::Malformed(_))
        ));
        assert_eq!(completion.display_text(), FAILURE_TEXT);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_contained() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = CompletionClient::new(
            Arc::new(provider(format!("http://127.0.0.1:{}/", port), Credential::absent())),
            2000,
            0.2,
        );
        let completion = client.complete("x").await;
        assert!(matches!(
            completion,
            Completion::Failed(CompletionFailure::Transport(_))
        ));
        assert_eq!(completion.display_text(), FAILURE_TEXT);
    }
}
