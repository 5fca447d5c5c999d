use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::completion::Usage;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: &Usage) -> f64 {
        usage.prompt_tokens as f64 / 1_000_000.0 * self.input_per_million
            + usage.completion_tokens as f64 / 1_000_000.0 * self.output_per_million
    }
}

const GPT_4O: ModelPrice = ModelPrice::new(2.50, 10.00);
const GPT_4O_MINI: ModelPrice = ModelPrice::new(0.15, 0.60);

/// Static price list. Unknown models are billed at the default tier.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
    fallback: ModelPrice,
}

impl Default for PriceTable {
    fn default() -> Self {
        let prices = HashMap::from([
            ("gpt-4o".to_string(), GPT_4O),
            ("gpt-4o-mini".to_string(), GPT_4O_MINI),
        ]);
        Self {
            prices,
            fallback: GPT_4O,
        }
    }
}

impl PriceTable {
    /// Add or replace the price of `model`.
    pub fn set(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model.into(), price);
    }

    pub fn price(&self, model: &str) -> ModelPrice {
        self.prices.get(model).copied().unwrap_or(self.fallback)
    }
}

/// Running token and cost totals for one agent run.
#[derive(Debug, Clone)]
pub struct UsageAccountant {
    price: ModelPrice,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

impl UsageAccountant {
    pub fn new(table: &PriceTable, model: &str) -> Self {
        Self {
            price: table.price(model),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            total_cost: 0.0,
        }
    }

    /// Add one turn's usage; returns that turn's cost.
    pub fn record(&mut self, usage: &Usage) -> f64 {
        let cost = self.price.cost(usage);
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
        self.total_cost += cost;
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(p: u64, c: u64) -> Usage {
        Usage {
            prompt_tokens: p,
            completion_tokens: c,
            total_tokens: p + c,
        }
    }

    #[test]
    fn test_known_model_cost() {
        let table = PriceTable::default();
        let cost = table.price("gpt-4o").cost(&usage(1_000_000, 1_000_000));
        assert!((cost - 12.5).abs() < 1e-9);
        let cost = table.price("gpt-4o-mini").cost(&usage(2_000_000, 500_000));
        assert!((cost - (0.30 + 0.30)).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_uses_default_tier() {
        let table = PriceTable::default();
        assert_eq!(table.price("some-future-model"), table.price("gpt-4o"));
    }

    #[test]
    fn test_override() {
        let mut table = PriceTable::default();
        table.set("local-llama", ModelPrice::new(0.0, 0.0));
        assert_eq!(table.price("local-llama").cost(&usage(500, 500)), 0.0);
    }

    #[test]
    fn test_accountant_accumulates() {
        let mut acc = UsageAccountant::new(&PriceTable::default(), "gpt-4o");
        let first = acc.record(&usage(1000, 100));
        acc.record(&usage(2000, 200));
        assert_eq!(acc.prompt_tokens, 3000);
        assert_eq!(acc.completion_tokens, 300);
        assert_eq!(acc.total_tokens, 3300);
        assert!((first - (0.0025 + 0.001)).abs() < 1e-12);
        assert!((acc.total_cost - 3.0 * first).abs() < 1e-12);
    }
}
