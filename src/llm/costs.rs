//! Per-provider cost tables and cost math.
//!
//! Rates are RUB per million tokens, (input, output). They are part of the
//! deployment configuration, not of any provider's wire response.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::ProviderKind;
use super::provider::CostRates;

/// Look up the configured rates for a provider.
pub fn rates_for(kind: ProviderKind) -> CostRates {
    match kind {
        ProviderKind::OpenAi => CostRates {
            input_per_mtok: dec!(15.0),
            output_per_mtok: dec!(60.0),
        },
        ProviderKind::GigaChat => CostRates {
            input_per_mtok: dec!(160.0),
            output_per_mtok: dec!(96.0),
        },
        ProviderKind::Perplexity => CostRates {
            input_per_mtok: dec!(20.0),
            output_per_mtok: dec!(20.0),
        },
        // Local models are free.
        ProviderKind::Ollama => CostRates {
            input_per_mtok: dec!(0),
            output_per_mtok: dec!(0),
        },
    }
}

/// Cost of one call: `(input/1e6)·input_rate + (output/1e6)·output_rate`.
pub fn calculate_cost(rates: &CostRates, input_tokens: u32, output_tokens: u32) -> Decimal {
    let mtok = Decimal::from(1_000_000u32);
    Decimal::from(input_tokens) / mtok * rates.input_per_mtok
        + Decimal::from(output_tokens) / mtok * rates.output_per_mtok
}
