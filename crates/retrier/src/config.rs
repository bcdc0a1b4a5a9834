//! Retry configuration loaded from YAML
//!
//! A [`RetryConfig`] describes one retrier declaratively; a
//! [`RetryPoliciesConfig`] holds a default plus named per-operation overrides.
//!
//! ```yaml
//! default:
//!   strategy: progressive
//!   max-attempts: 5
//!   initial-delay-ms: 100
//!   multiplier: 2.0
//!   max-delay-ms: 5000
//! operations:
//!   download:
//!     strategy: fixed
//!     max-attempts: 3
//!     initial-delay-ms: 1000
//!     jitter: false
//! ```

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::retry::{
    fixed_delay, limit_attempts_count, progressive_delay, DelayPolicy, DelayPolicyExt,
    LimitAttempts, Retrier,
};

/// Declarative description of a [`Retrier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Delay strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay, or the initial delay for the progressive strategy
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Multiplier for the progressive strategy
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound applied after jitter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,

    /// Whether to stretch each delay by a random factor in [1, 2)
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: None,
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    100
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> bool {
    true
}

/// Delay strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// The same delay before every retry
    Fixed,

    /// Delay grows linearly with the attempt number (default)
    #[default]
    Progressive,
}

impl RetryConfig {
    /// Parse a configuration from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file
    pub fn load(path: &Utf8Path) -> Result<Self> {
        Self::from_yaml(&read_config(path)?)
    }

    /// Check that every value can be turned into a policy
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(ConfigError::invalid_value(
                "multiplier",
                format!("must be a finite, non-negative number, got {}", self.multiplier),
            ));
        }
        Ok(())
    }

    /// Build the described retrier
    ///
    /// The delay is composed as base strategy, then jitter, then the
    /// max-delay clamp, so the clamp bounds the jittered value.
    pub fn build(&self) -> Result<Retrier> {
        self.validate()?;

        let initial = Duration::from_millis(self.initial_delay_ms);
        let gate = limit_attempts_count(self.max_attempts);

        Ok(match self.strategy {
            RetryStrategy::Fixed => self.compose(fixed_delay(initial), gate),
            RetryStrategy::Progressive => {
                self.compose(progressive_delay(initial, self.multiplier), gate)
            }
        })
    }

    fn compose<P: DelayPolicy + 'static>(&self, base: P, gate: LimitAttempts) -> Retrier {
        match (self.jitter, self.max_delay_ms.map(Duration::from_millis)) {
            (true, Some(max)) => Retrier::new(base.with_jitter().with_max_delay(max), gate),
            (true, None) => Retrier::new(base.with_jitter(), gate),
            (false, Some(max)) => Retrier::new(base.with_max_delay(max), gate),
            (false, None) => Retrier::new(base, gate),
        }
    }
}

/// A default retry configuration plus named per-operation overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Configuration for operations without an override
    #[serde(default)]
    pub default: RetryConfig,

    /// Per-operation configurations
    #[serde(default)]
    pub operations: HashMap<String, RetryConfig>,
}

impl RetryPoliciesConfig {
    /// Parse and validate every configuration in a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        config.default.validate()?;
        for (name, policy) in &config.operations {
            policy.validate().map_err(|e| match e {
                ConfigError::InvalidValue { field, message } => {
                    ConfigError::invalid_value(format!("operations.{}.{}", name, field), message)
                }
                other => other,
            })?;
        }
        Ok(config)
    }

    /// Load the configurations from a YAML file
    pub fn load(path: &Utf8Path) -> Result<Self> {
        Self::from_yaml(&read_config(path)?)
    }

    /// Configuration for `operation`, falling back to the default
    pub fn policy_for(&self, operation: &str) -> &RetryConfig {
        self.operations.get(operation).unwrap_or(&self.default)
    }

    /// Build the retrier for `operation`
    pub fn retrier_for(&self, operation: &str) -> Result<Retrier> {
        let policy = self.policy_for(operation);
        tracing::debug!(
            operation,
            strategy = ?policy.strategy,
            max_attempts = policy.max_attempts,
            "building retrier"
        );
        policy.build()
    }
}

fn read_config(path: &Utf8Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::not_found(path.as_str())
        } else {
            ConfigError::Io(e)
        }
    })
}
