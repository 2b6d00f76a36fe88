//! Model provider selection and construction.
//!
//! The provider is an explicit configuration value threaded into the
//! generator at construction — there is no process-wide singleton.

mod chat_client;
pub mod costs;
pub mod provider;

pub use chat_client::ChatCompletionClient;
pub use provider::{Completion, CompletionRequest, CostRates, ModelProvider};

use std::str::FromStr;
use std::sync::Arc;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Supported model backends. All speak the OpenAI-compatible
/// chat-completions wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    GigaChat,
    Perplexity,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::GigaChat => "gigachat",
            Self::Perplexity => "perplexity",
            Self::Ollama => "ollama",
        }
    }

    /// Default model for this backend when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::GigaChat => "GigaChat",
            Self::Perplexity => "sonar",
            Self::Ollama => "llama2",
        }
    }

    /// Default API base URL for this backend.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::GigaChat => "https://gigachat.devices.sberbank.ru/api/v1",
            Self::Perplexity => "https://api.perplexity.ai",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Local backends run without an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gigachat" => Ok(Self::GigaChat),
            "perplexity" => Ok(Self::Perplexity),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::InvalidValue {
                key: "llm provider".to_string(),
                message: format!("unknown provider '{other}'"),
            }),
        }
    }
}

/// Configuration for creating a model provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub kind: ProviderKind,
    pub api_key: Option<SecretString>,
    /// Model override; the backend default is used when absent.
    pub model: Option<String>,
    /// Base URL override for proxies and self-hosted deployments.
    pub base_url: Option<String>,
}

/// Create a model provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ModelProvider>, ConfigError> {
    if config.kind.requires_api_key() && config.api_key.is_none() {
        return Err(ConfigError::MissingEnvVar(format!(
            "API key for provider {}",
            config.kind.as_str()
        )));
    }

    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.kind.default_base_url().to_string());
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| config.kind.default_model().to_string());

    tracing::info!(provider = config.kind.as_str(), model = %model, "Using model provider");
    Ok(Arc::new(ChatCompletionClient::new(
        config.kind,
        base_url,
        config.api_key.clone(),
        model,
    )))
}
