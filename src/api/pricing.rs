//! Token Pricing
//!
//! Per-model rates used to turn token counts into a cost estimate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Rates in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,

    pub output_per_million: f64,

    /// Rate for cached input tokens; falls back to the input rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_per_million: Option<f64>,
}

impl Pricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
            cached_input_per_million: None,
        }
    }

    pub fn with_cached_input(mut self, cached_input_per_million: f64) -> Self {
        self.cached_input_per_million = Some(cached_input_per_million);
        self
    }

    /// Estimated cost of a call; `cached_tokens` is a subset of `input_tokens`
    pub fn cost(&self, input_tokens: u64, cached_tokens: u64, output_tokens: u64) -> f64 {
        let cached = cached_tokens.min(input_tokens);
        let (uncached, cached_rate) = match self.cached_input_per_million {
            Some(rate) => (input_tokens - cached, rate),
            None => (input_tokens, 0.0),
        };

        (uncached as f64 * self.input_per_million
            + cached as f64 * cached_rate
            + output_tokens as f64 * self.output_per_million)
            / TOKENS_PER_UNIT
    }
}

/// Rates keyed by model-name prefix
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    models: HashMap<String, Pricing>,
}

impl PricingTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Published rates for common models
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (model, input, cached, output) in [
            ("gpt-4o", 2.50, 1.25, 10.00),
            ("gpt-4o-mini", 0.15, 0.075, 0.60),
            ("gpt-4.1", 2.00, 0.50, 8.00),
            ("gpt-4.1-mini", 0.40, 0.10, 1.60),
            ("gpt-4.1-nano", 0.10, 0.025, 0.40),
            ("gpt-5", 1.25, 0.125, 10.00),
            ("gpt-5-mini", 0.25, 0.025, 2.00),
            ("gpt-5-nano", 0.05, 0.005, 0.40),
            ("o3", 2.00, 0.50, 8.00),
            ("o4-mini", 1.10, 0.275, 4.40),
        ] {
            table.insert(model, Pricing::new(input, output).with_cached_input(cached));
        }
        table
    }

    pub fn insert(&mut self, model: impl Into<String>, pricing: Pricing) {
        self.models.insert(model.into(), pricing);
    }

    /// Overlay another table; its entries win
    pub fn merge(&mut self, other: PricingTable) {
        self.models.extend(other.models);
    }

    /// Rates for a model, by longest matching prefix
    ///
    /// `gpt-4o-mini-2024-07-18` resolves to `gpt-4o-mini`, not `gpt-4o`.
    pub fn lookup(&self, model: &str) -> Option<&Pricing> {
        self.models
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| pricing)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
