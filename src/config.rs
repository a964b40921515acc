//! Core configuration and shared policy types.
//!
//! Policy that more than one component consumes lives here: the retry
//! backoff formula shared by step retries and bus redelivery, and the
//! aggregate [`CoreConfig`] document the pipeline binary loads at startup.
//! Malformed configuration is fatal at load and never silently corrected.

use crate::bus::services::BusConfig;
use crate::workflow::services::EngineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The document could not be read.
    #[error("unreadable configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A field held a value outside its permitted range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Exponential backoff schedule.
///
/// The delay before attempt `n` (1-based) is
/// `base * multiplier^(n - 1)`, clamped to `cap`. Arithmetic saturates
/// rather than overflowing, so extreme attempt counts settle at `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    base: Duration,
    /// Growth factor applied per attempt.
    multiplier: u32,
    /// Upper bound on any single delay.
    cap: Duration,
}

impl BackoffPolicy {
    /// Creates a backoff policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `multiplier` is zero or
    /// `cap` is shorter than `base`.
    pub fn new(base: Duration, multiplier: u32, cap: Duration) -> Result<Self, ConfigError> {
        if multiplier == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff.multiplier",
                reason: "must be at least 1".to_owned(),
            });
        }
        if cap < base {
            return Err(ConfigError::InvalidValue {
                field: "backoff.cap",
                reason: "must not be shorter than the base delay".to_owned(),
            });
        }
        Ok(Self {
            base,
            multiplier,
            cap,
        })
    }

    /// Returns the delay to wait before the given 1-based attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Returns the base delay.
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Returns the per-attempt growth factor.
    #[must_use]
    pub const fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Returns the delay ceiling.
    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            multiplier: 2,
            cap: Duration::from_secs(30),
        }
    }
}

/// Aggregate configuration for the coordination core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Message bus policy.
    pub bus: BusConfig,
    /// Workflow engine policy.
    pub engine: EngineConfig,
    /// How many context entries the state store retains per agent.
    pub context_retention: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            engine: EngineConfig::default(),
            context_retention: 32,
        }
    }
}

impl CoreConfig {
    /// Parses a configuration document from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] when the document does not parse
    /// or [`ConfigError::InvalidValue`] when a field is out of range.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for out-of-range fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus.validate()?;
        self.engine.validate()?;
        if self.context_retention == 0 {
            return Err(ConfigError::InvalidValue {
                field: "context_retention",
                reason: "must retain at least one entry".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BackoffPolicy, ConfigError, CoreConfig};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(1, Duration::from_millis(500))]
    #[case(2, Duration::from_millis(1000))]
    #[case(3, Duration::from_millis(2000))]
    #[case(4, Duration::from_millis(4000))]
    fn backoff_grows_exponentially(#[case] attempt: u32, #[case] expected: Duration) {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(attempt), expected);
    }

    #[test]
    fn backoff_is_clamped_to_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(40), policy.cap());
    }

    #[test]
    fn zero_multiplier_is_rejected() {
        let result = BackoffPolicy::new(Duration::from_millis(100), 0, Duration::from_secs(1));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn cap_below_base_is_rejected() {
        let result = BackoffPolicy::new(Duration::from_secs(5), 2, Duration::from_secs(1));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn default_config_validates() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn malformed_document_is_fatal() {
        let result = CoreConfig::from_json_str("{\"bus\": 7}");
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn zero_retention_is_rejected() {
        let result = CoreConfig::from_json_str("{\"context_retention\": 0}");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
