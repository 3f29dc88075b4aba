// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry policy for backend calls.
//!
//! Exponential backoff starting at 500 ms, doubling per attempt, with
//! explicit `Retry-After` hints taking precedence over the computed delay.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Configuration ───────────────────────────────────────────────────

/// Retry behaviour for [`crate::ApiClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    /// `0` means only the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each later retry.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Cap for the computed backoff. Explicit `Retry-After` hints are not capped.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Serde helper: `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        (val.as_millis() as u64).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Backoff delay for a zero-indexed failed attempt.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let delay_ms = (config.base_delay.as_millis() as u64).saturating_mul(exp);
    Duration::from_millis(delay_ms.min(config.max_delay.as_millis() as u64))
}

/// Parse a `Retry-After` header value expressed in seconds.
///
/// Accepts integers and decimals; HTTP-date values and negative numbers
/// yield `None`.
pub fn parse_retry_after(value: &str) -> Option<f64> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}

/// Delay before the attempt following `attempt`.
///
/// A server hint wins over the computed backoff.
pub fn retry_delay(config: &RetryConfig, attempt: u32, hint_seconds: Option<f64>) -> Duration {
    match hint_seconds {
        Some(secs) => Duration::from_millis((secs * 1000.0).ceil() as u64),
        None => compute_delay(config, attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_three_attempts() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.max_attempts(), 3);
        assert_eq!(cfg.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn backoff_doubles_from_base() {
        let cfg = RetryConfig::default();
        assert_eq!(compute_delay(&cfg, 0), Duration::from_millis(500));
        assert_eq!(compute_delay(&cfg, 1), Duration::from_millis(1000));
        assert_eq!(compute_delay(&cfg, 2), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_is_capped() {
        let cfg = RetryConfig {
            max_delay: Duration::from_millis(800),
            ..RetryConfig::default()
        };
        assert_eq!(compute_delay(&cfg, 5), Duration::from_millis(800));
        assert_eq!(compute_delay(&cfg, 60), Duration::from_millis(800));
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after("5"), Some(5.0));
        assert_eq!(parse_retry_after(" 1.5 "), Some(1.5));
        assert_eq!(parse_retry_after("-2"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn hint_overrides_backoff_and_cap() {
        let cfg = RetryConfig {
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        };
        assert_eq!(retry_delay(&cfg, 0, Some(5.0)), Duration::from_secs(5));
        assert_eq!(retry_delay(&cfg, 0, Some(0.25)), Duration::from_millis(250));
        assert_eq!(retry_delay(&cfg, 1, None), Duration::from_secs(1));
    }

    #[test]
    fn config_serde_uses_millis() {
        let json = serde_json::to_value(RetryConfig::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"max_retries": 2, "base_delay": 500, "max_delay": 30000})
        );
        let back: RetryConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, RetryConfig::default());
    }
}
