//! Model provider abstraction — the single seam the generator talks through.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::GenerationError;

/// A single completion request: one system prompt, one user prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.7,
            max_tokens: 200,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Completion result with the token counts the provider reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Per-million-token rates in RUB.
#[derive(Debug, Clone, Copy)]
pub struct CostRates {
    pub input_per_mtok: Decimal,
    pub output_per_mtok: Decimal,
}

/// Pluggable model backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short provider label for logs and the call ledger ("gigachat", "openai").
    fn provider_name(&self) -> &str;

    /// Model identifier sent on the wire.
    fn model_name(&self) -> &str;

    /// Cost rates applied to reported token counts.
    fn cost_rates(&self) -> CostRates;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GenerationError>;
}
