//! Request cost in policy units.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::policy::Unit;

/// Default number of decimal places kept for cent costs.
pub const DEFAULT_CENTS_PRECISION: u32 = 4;

/// Finest cent precision the quota store accounts exactly.
pub const MAX_CENTS_PRECISION: u32 = 6;

/// Errors produced while pricing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostError {
    #[error("policy is measured in cents but the request carries no token usage")]
    MissingUsage,
    #[error("no price table for model '{0}'")]
    UnknownModel(String),
}

/// Tokens consumed by one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Prices in cents per thousand tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
}

impl PriceTable {
    /// Cost of `usage` in cents, rounded to `precision` decimal places.
    pub fn cents(&self, usage: &TokenUsage, precision: u32) -> f64 {
        let raw = usage.input_tokens as f64 / 1000.0 * self.input_price_per_1k
            + usage.output_tokens as f64 / 1000.0 * self.output_price_per_1k;
        round_to(raw, precision)
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision.min(MAX_CENTS_PRECISION) as i32);
    (value * scale).round() / scale
}

/// Price tables per model, used to turn token usage into cents.
#[derive(Debug, Clone)]
pub struct CostModel {
    prices: HashMap<String, PriceTable>,
    fallback: Option<PriceTable>,
    precision: u32,
}

impl CostModel {
    /// `precision` is capped at [`MAX_CENTS_PRECISION`].
    pub fn new(prices: HashMap<String, PriceTable>, precision: u32) -> Self {
        Self {
            prices,
            fallback: None,
            precision: precision.min(MAX_CENTS_PRECISION),
        }
    }

    /// Price applied to models missing from the table.
    pub fn with_fallback(mut self, fallback: Option<PriceTable>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn price_for(&self, model: Option<&str>) -> Option<&PriceTable> {
        model
            .and_then(|m| self.prices.get(m))
            .or(self.fallback.as_ref())
    }

    /// Amount a request consumes from a policy measured in `unit`.
    ///
    /// Request policies always charge one. Cent policies need the token usage
    /// and a price for `model`.
    pub fn request_cost(
        &self,
        unit: Unit,
        model: Option<&str>,
        usage: Option<&TokenUsage>,
    ) -> Result<f64, CostError> {
        match unit {
            Unit::Requests => Ok(1.0),
            Unit::Cents => {
                let usage = usage.ok_or(CostError::MissingUsage)?;
                let price = self
                    .price_for(model)
                    .ok_or_else(|| CostError::UnknownModel(model.unwrap_or_default().to_string()))?;
                Ok(price.cents(usage, self.precision))
            }
        }
    }
}

/// Built-in prices, in cents per 1k tokens.
pub fn default_prices() -> HashMap<String, PriceTable> {
    HashMap::from([
        (
            "gpt-4o-mini".to_string(),
            PriceTable {
                input_price_per_1k: 0.015,
                output_price_per_1k: 0.06,
            },
        ),
        (
            "gpt-4o".to_string(),
            PriceTable {
                input_price_per_1k: 0.25,
                output_price_per_1k: 1.0,
            },
        ),
    ])
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(default_prices(), DEFAULT_CENTS_PRECISION)
    }
}
