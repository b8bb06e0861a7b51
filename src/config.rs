//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{
    default_prices, CostModel, Policy, PriceTable, DEFAULT_CENTS_PRECISION,
    MAX_CENTS_PRECISION,
};

/// Prefix for environment variable overrides, e.g.
/// `TURNSTILE__SERVER__LISTEN_ADDR=0.0.0.0:8787`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

/// What to do with a request whose policy needs context it does not carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingContextAction {
    /// Refuse the request
    #[default]
    Deny,
    /// Let the request through without charging any budget
    Allow,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Policy applied when a request names none
    #[serde(default)]
    pub default_policy: Option<String>,

    #[serde(default)]
    pub on_missing_context: MissingContextAction,

    /// Decimal places kept when pricing requests in cents
    #[serde(default = "default_cents_precision")]
    pub cents_precision: u32,

    /// Per-model prices, in cents per 1k tokens
    #[serde(default = "default_prices")]
    pub pricing: HashMap<String, PriceTable>,

    /// Price used for models missing from `pricing`
    #[serde(default)]
    pub default_price: Option<PriceTable>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            default_policy: None,
            on_missing_context: MissingContextAction::default(),
            cents_precision: default_cents_precision(),
            pricing: default_prices(),
            default_price: None,
        }
    }
}

fn default_cents_precision() -> u32 {
    DEFAULT_CENTS_PRECISION
}

impl RateLimitingConfig {
    /// Parse the configured default policy, if any.
    pub fn default_policy(&self) -> Result<Option<Policy>> {
        self.default_policy
            .as_deref()
            .map(|p| p.parse::<Policy>().map_err(TurnstileError::from))
            .transpose()
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.pricing.clone(), self.cents_precision)
            .with_fallback(self.default_price)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, with `TURNSTILE__*`
    /// environment variables layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: TurnstileConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail once requests arrive.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.default_policy()?;
        if self.rate_limiting.cents_precision > MAX_CENTS_PRECISION {
            return Err(TurnstileError::Config(format!(
                "cents_precision {} exceeds the maximum of {}",
                self.rate_limiting.cents_precision, MAX_CENTS_PRECISION
            )));
        }
        for (model, price) in &self.rate_limiting.pricing {
            if price.input_price_per_1k < 0.0 || price.output_price_per_1k < 0.0 {
                return Err(TurnstileError::Config(format!(
                    "negative price for model '{}'",
                    model
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{Segment, TokenUsage, Unit};

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8787".parse().unwrap());
        assert_eq!(config.rate_limiting.on_missing_context, MissingContextAction::Deny);
        assert_eq!(config.rate_limiting.cents_precision, 4);
        assert!(config.rate_limiting.pricing.contains_key("gpt-4o-mini"));
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
server:
  listen_addr: 0.0.0.0:9000
rate_limiting:
  default_policy: "100;w=86400;s=user"
  on_missing_context: allow
  cents_precision: 2
  pricing:
    claude-3-haiku:
      input_price_per_1k: 0.025
      output_price_per_1k: 0.125
logging:
  level: debug
  format: json
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.rate_limiting.on_missing_context, MissingContextAction::Allow);
        assert_eq!(config.logging.format, LogFormat::Json);

        let policy = config.rate_limiting.default_policy().unwrap().unwrap();
        assert_eq!(policy.quota(), 100);
        assert_eq!(policy.segment(), &Segment::User);

        let costs = config.rate_limiting.cost_model();
        assert_eq!(costs.precision(), 2);
        assert!(costs.price_for(Some("gpt-4o-mini")).is_none());
        let usage = TokenUsage {
            input_tokens: 2000,
            output_tokens: 2000,
        };
        let cost = costs
            .request_cost(Unit::Cents, Some("claude-3-haiku"), Some(&usage))
            .unwrap();
        assert!((cost - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_default_policy_rejected() {
        let yaml = r#"
rate_limiting:
  default_policy: "100"
"#;
        let err = TurnstileConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Policy(_)));
    }

    #[test]
    fn test_negative_price_rejected() {
        let yaml = r#"
rate_limiting:
  pricing:
    gpt-4o:
      input_price_per_1k: -1.0
      output_price_per_1k: 1.0
"#;
        assert!(matches!(
            TurnstileConfig::from_yaml(yaml),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_excessive_precision_rejected() {
        let yaml = r#"
rate_limiting:
  cents_precision: 9
"#;
        assert!(matches!(
            TurnstileConfig::from_yaml(yaml),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TurnstileConfig::load(None).unwrap();
        assert!(config.rate_limiting.default_policy.is_none());
    }
}
