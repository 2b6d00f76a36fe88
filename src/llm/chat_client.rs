//! OpenAI-compatible chat-completions transport.
//!
//! All supported backends (OpenAI, GigaChat, Perplexity, Ollama) speak the
//! same `/chat/completions` wire shape: Bearer auth, a messages array, and a
//! usage block with prompt/completion token counts.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::GenerationError;

use super::ProviderKind;
use super::costs;
use super::provider::{Completion, CompletionRequest, CostRates, ModelProvider};

/// Timeout for a single completion request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat-completions client for one configured provider.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    kind: ProviderKind,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl ChatCompletionClient {
    pub fn new(
        kind: ProviderKind,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            kind,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl ModelProvider for ChatCompletionClient {
    fn provider_name(&self) -> &str {
        self.kind.as_str()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_rates(&self) -> CostRates {
        costs::rates_for(self.kind)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(HTTP_TIMEOUT)
            .json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed {
                provider: self.kind.as_str().to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::RequestFailed {
                provider: self.kind.as_str().to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| GenerationError::InvalidResponse {
                    provider: self.kind.as_str().to_string(),
                    reason: e.to_string(),
                })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::InvalidResponse {
                provider: self.kind.as_str().to_string(),
                reason: "response contained no choices".to_string(),
            })?;

        debug!(
            model = %self.model,
            input_tokens = parsed.usage.prompt_tokens,
            output_tokens = parsed.usage.completion_tokens,
            "Completion received"
        );

        Ok(Completion {
            text: choice.message.content,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_parses_usage() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Спасибо за отзыв!"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 35, "total_tokens": 155}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Спасибо за отзыв!");
        assert_eq!(parsed.usage.prompt_tokens, 120);
        assert_eq!(parsed.usage.completion_tokens, 35);
    }

    #[test]
    fn chat_response_tolerates_missing_usage() {
        let raw = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.usage.prompt_tokens, 0);
        assert_eq!(parsed.usage.completion_tokens, 0);
    }

    #[tokio::test]
    async fn unreachable_host_is_request_failure() {
        let client = ChatCompletionClient::new(
            ProviderKind::Ollama,
            "http://127.0.0.1:9/v1",
            None,
            "llama2",
        );
        let result = client
            .complete(CompletionRequest::new("system", "user"))
            .await;
        assert!(matches!(result, Err(GenerationError::RequestFailed { .. })));
    }
}
