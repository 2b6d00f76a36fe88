//! Response generator — turns a review into reply text with cost accounting.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::error::GenerationError;
use crate::llm::{CompletionRequest, ModelProvider, costs};
use crate::model::Tone;

/// Configuration for reply generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 200,
        }
    }
}

/// Everything the generator needs to know about one review.
#[derive(Debug, Clone)]
pub struct ReplyContext<'a> {
    pub review_text: Option<&'a str>,
    pub rating: u8,
    pub product_name: Option<&'a str>,
    pub customer_name: Option<&'a str>,
    pub tone: Tone,
    pub custom_instructions: Option<&'a str>,
}

/// A generated reply with its token and cost accounting.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub tokens_used: u32,
    /// Cost in RUB at the provider's configured rates.
    pub cost: Decimal,
    pub provider: String,
    pub model: String,
}

/// Generates review replies through a pluggable model provider.
///
/// One attempt per review per pipeline pass — generation is never retried
/// automatically.
pub struct ResponseGenerator {
    provider: Arc<dyn ModelProvider>,
    config: GeneratorConfig,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: GeneratorConfig) -> Self {
        Self { provider, config }
    }

    /// Generate a reply for one review.
    pub async fn generate(&self, ctx: &ReplyContext<'_>) -> Result<GeneratedReply, GenerationError> {
        let request = CompletionRequest::new(build_system_prompt(ctx.tone), build_user_prompt(ctx))
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let completion = self.provider.complete(request).await?;

        let text = completion.text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse {
                provider: self.provider.provider_name().to_string(),
            });
        }

        let cost = costs::calculate_cost(
            &self.provider.cost_rates(),
            completion.input_tokens,
            completion.output_tokens,
        );

        info!(
            chars = text.chars().count(),
            tokens = completion.input_tokens + completion.output_tokens,
            cost = %cost,
            "Generated review reply"
        );

        Ok(GeneratedReply {
            text,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            tokens_used: completion.input_tokens + completion.output_tokens,
            cost,
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the system prompt for the configured tone.
fn build_system_prompt(tone: Tone) -> String {
    let base = "Ты менеджер магазина на маркетплейсе.\n\
Твоя задача — вежливо и профессионально ответить на отзыв покупателя.\n\n\
Правила ответа:\n\
- Отвечай кратко (до 200 символов)\n\
- Используй эмодзи умеренно (1-2 максимум)\n\
- Благодари за покупку\n\
- На негативные отзывы извиняйся и предлагай решение\n\
- На позитивные отзывы выражай благодарность\n";

    let tone_addition = match tone {
        Tone::Friendly => "\nТон: дружелюбный и теплый, как общение с другом.",
        Tone::Professional => "\nТон: профессиональный и деловой, без лишних эмоций.",
        Tone::Apologetic => "\nТон: извиняющийся, предлагающий решение проблемы.",
    };

    format!("{base}{tone_addition}")
}

/// Build the user prompt embedding the review metadata.
fn build_user_prompt(ctx: &ReplyContext<'_>) -> String {
    let product = ctx.product_name.filter(|p| !p.is_empty()).unwrap_or("товар");
    let review_text = ctx.review_text.filter(|t| !t.is_empty()).unwrap_or("Без текста");

    let mut prompt = format!("Товар: {product}\nРейтинг: {}/5 звёзд\n", ctx.rating);

    if let Some(name) = ctx.customer_name.filter(|n| !n.is_empty()) {
        prompt.push_str(&format!("Покупатель: {name}\n"));
    }

    prompt.push_str(&format!("\nОтзыв покупателя:\n{review_text}\n"));

    if let Some(custom) = ctx.custom_instructions.filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\nДополнительные инструкции:\n{custom}\n"));
    }

    prompt.push_str("\nСгенерируй ответ на этот отзыв:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::llm::provider::{Completion, CostRates};
    use rust_decimal_macros::dec;

    fn ctx(text: Option<&'static str>) -> ReplyContext<'static> {
        ReplyContext {
            review_text: text,
            rating: 5,
            product_name: Some("Чайник"),
            customer_name: Some("Анна"),
            tone: Tone::Friendly,
            custom_instructions: None,
        }
    }

    // ── Prompt construction ─────────────────────────────────────────

    #[test]
    fn system_prompt_varies_by_tone() {
        let friendly = build_system_prompt(Tone::Friendly);
        let professional = build_system_prompt(Tone::Professional);
        let apologetic = build_system_prompt(Tone::Apologetic);
        assert!(friendly.contains("дружелюбный"));
        assert!(professional.contains("профессиональный"));
        assert!(apologetic.contains("извиняющийся"));
        // Shared base rules in every template
        for prompt in [&friendly, &professional, &apologetic] {
            assert!(prompt.contains("до 200 символов"));
        }
    }

    #[test]
    fn user_prompt_embeds_metadata() {
        let prompt = build_user_prompt(&ReplyContext {
            review_text: Some("Спасибо, отличный товар"),
            rating: 4,
            product_name: Some("Чайник"),
            customer_name: Some("Анна"),
            tone: Tone::Friendly,
            custom_instructions: Some("Упомяни гарантию"),
        });
        assert!(prompt.contains("Товар: Чайник"));
        assert!(prompt.contains("Рейтинг: 4/5"));
        assert!(prompt.contains("Покупатель: Анна"));
        assert!(prompt.contains("Спасибо, отличный товар"));
        assert!(prompt.contains("Упомяни гарантию"));
    }

    #[test]
    fn user_prompt_substitutes_missing_fields() {
        let prompt = build_user_prompt(&ReplyContext {
            review_text: None,
            rating: 1,
            product_name: None,
            customer_name: None,
            tone: Tone::Apologetic,
            custom_instructions: None,
        });
        assert!(prompt.contains("Товар: товар"));
        assert!(prompt.contains("Без текста"));
        assert!(!prompt.contains("Покупатель"));
        assert!(!prompt.contains("Дополнительные инструкции"));
    }

    #[test]
    fn user_prompt_treats_empty_text_as_absent() {
        let prompt = build_user_prompt(&ctx(Some("")));
        assert!(prompt.contains("Без текста"));
    }

    // ── Generation with a mock provider ─────────────────────────────

    struct MockProvider {
        text: String,
        input_tokens: u32,
        output_tokens: u32,
    }

    #[async_trait::async_trait]
    impl ModelProvider for MockProvider {
        fn provider_name(&self) -> &str {
            "mock"
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }

        fn cost_rates(&self) -> CostRates {
            CostRates {
                input_per_mtok: dec!(160.0),
                output_per_mtok: dec!(96.0),
            }
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<Completion, GenerationError> {
            Ok(Completion {
                text: self.text.clone(),
                input_tokens: self.input_tokens,
                output_tokens: self.output_tokens,
            })
        }
    }

    #[tokio::test]
    async fn generate_accounts_tokens_and_cost() {
        let generator = ResponseGenerator::new(
            Arc::new(MockProvider {
                text: "Спасибо за отзыв!".into(),
                input_tokens: 1000,
                output_tokens: 500,
            }),
            GeneratorConfig::default(),
        );
        let reply = generator.generate(&ctx(Some("Отлично"))).await.unwrap();
        assert_eq!(reply.text, "Спасибо за отзыв!");
        assert_eq!(reply.tokens_used, 1500);
        assert_eq!(reply.cost, dec!(0.208));
        assert_eq!(reply.model, "mock-model");
    }

    #[tokio::test]
    async fn generate_rejects_empty_content() {
        let generator = ResponseGenerator::new(
            Arc::new(MockProvider {
                text: "   ".into(),
                input_tokens: 10,
                output_tokens: 0,
            }),
            GeneratorConfig::default(),
        );
        let result = generator.generate(&ctx(Some("Отлично"))).await;
        assert!(matches!(result, Err(GenerationError::EmptyResponse { .. })));
    }
}
