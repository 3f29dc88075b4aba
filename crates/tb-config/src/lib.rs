// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the Tickerboard
//! dashboard.
//!
//! [`DashboardConfig`] carries the backend location, log level, and the
//! tuning knobs of the retry executor, the error reporter, and the error
//! surface. Every tuning field is optional; `None` means the owning crate's
//! default.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A retry delay is long enough to stall the dashboard.
    LargeRetryDelay {
        /// Field carrying the delay.
        field: String,
        /// Delay in milliseconds.
        millis: u64,
    },
    /// Deduplication is disabled, so repeated failures flood ingestion.
    DedupDisabled,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeRetryDelay { field, millis } => {
                write!(f, "'{field}' is unusually large ({millis}ms)")
            }
            ConfigWarning::DedupDisabled => {
                f.write_str("dedup_window_ms is 0; every repeated failure is reported")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration for the dashboard's backend layer.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct DashboardConfig {
    /// Base URL every backend path is joined onto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Retry executor tuning.
    #[serde(default)]
    pub retry: RetrySection,

    /// Error reporter tuning.
    #[serde(default)]
    pub reporting: ReportingSection,

    /// Persistent error surface tuning.
    #[serde(default)]
    pub surface: SurfaceSection,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            log_level: Some("info".into()),
            retry: RetrySection::default(),
            reporting: ReportingSection::default(),
            surface: SurfaceSection::default(),
        }
    }
}

/// `[retry]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RetrySection {
    /// Retries after the first attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// First backoff delay; doubles per retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    /// Ceiling for computed backoff delays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

/// `[reporting]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ReportingSection {
    /// Ingestion path under `api_base_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_path: Option<String>,
    /// Window during which identical reports are suppressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_window_ms: Option<u64>,
    /// Serialised report ceiling in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload_bytes: Option<usize>,
    /// Stack length kept when a report is oversize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stack_chars: Option<usize>,
    /// Copied into every report's `origin_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    /// Copied into every report's `agent_string`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_string: Option<String>,
}

/// `[surface]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SurfaceSection {
    /// Seconds before a surfaced error dismisses itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_dismiss_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Retry counts above this are rejected.
const MAX_RETRIES_LIMIT: u32 = 10;

/// Backoff delays above this generate a warning.
const LARGE_DELAY_THRESHOLD_MS: u64 = 60_000;

/// Smallest payload ceiling that still fits a report envelope.
const MIN_PAYLOAD_BYTES: usize = 1_024;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`DashboardConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`DashboardConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<DashboardConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => DashboardConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`DashboardConfig`].
pub fn parse_toml(content: &str) -> Result<DashboardConfig, ConfigError> {
    toml::from_str::<DashboardConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `TICKERBOARD_API_BASE_URL`
/// - `TICKERBOARD_LOG_LEVEL`
/// - `TICKERBOARD_INGEST_PATH`
pub fn apply_env_overrides(config: &mut DashboardConfig) {
    if let Ok(val) = std::env::var("TICKERBOARD_API_BASE_URL") {
        config.api_base_url = Some(val);
    }
    if let Ok(val) = std::env::var("TICKERBOARD_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Ok(val) = std::env::var("TICKERBOARD_INGEST_PATH") {
        config.reporting.ingest_path = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (malformed URLs, out-of-range limits) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &DashboardConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    match config.api_base_url.as_deref() {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            errors.push(format!("api_base_url '{url}' must start with http:// or https://"));
        }
        Some(_) => {}
        None => warnings.push(ConfigWarning::MissingOptionalField {
            field: "api_base_url".into(),
            hint: "calls go to http://localhost:8000".into(),
        }),
    }

    let retry = &config.retry;
    if let Some(n) = retry.max_retries
        && n > MAX_RETRIES_LIMIT
    {
        errors.push(format!(
            "retry.max_retries {n} out of range (0..={MAX_RETRIES_LIMIT})"
        ));
    }
    if retry.base_delay_ms == Some(0) {
        errors.push("retry.base_delay_ms must be greater than 0".into());
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms)
        && max < base
    {
        errors.push(format!(
            "retry.max_delay_ms ({max}) is smaller than retry.base_delay_ms ({base})"
        ));
    }
    for (field, value) in [
        ("retry.base_delay_ms", retry.base_delay_ms),
        ("retry.max_delay_ms", retry.max_delay_ms),
    ] {
        if let Some(millis) = value
            && millis > LARGE_DELAY_THRESHOLD_MS
        {
            warnings.push(ConfigWarning::LargeRetryDelay {
                field: field.into(),
                millis,
            });
        }
    }

    let reporting = &config.reporting;
    if let Some(path) = reporting.ingest_path.as_deref()
        && !path.starts_with('/')
    {
        errors.push(format!("reporting.ingest_path '{path}' must start with '/'"));
    }
    if let Some(bytes) = reporting.max_payload_bytes
        && bytes < MIN_PAYLOAD_BYTES
    {
        errors.push(format!(
            "reporting.max_payload_bytes {bytes} is below the minimum of {MIN_PAYLOAD_BYTES}"
        ));
    }
    if let (Some(stack), Some(bytes)) = (reporting.max_stack_chars, reporting.max_payload_bytes)
        && stack >= bytes
    {
        errors.push(format!(
            "reporting.max_stack_chars ({stack}) must be smaller than reporting.max_payload_bytes ({bytes})"
        ));
    }
    if reporting.dedup_window_ms == Some(0) {
        warnings.push(ConfigWarning::DedupDisabled);
    }

    if config.surface.auto_dismiss_secs == Some(0) {
        errors.push("surface.auto_dismiss_secs must be greater than 0".into());
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations.  Values in `overlay` take precedence over `base`,
/// field by field within each table.
pub fn merge_configs(base: DashboardConfig, overlay: DashboardConfig) -> DashboardConfig {
    DashboardConfig {
        api_base_url: overlay.api_base_url.or(base.api_base_url),
        log_level: overlay.log_level.or(base.log_level),
        retry: RetrySection {
            max_retries: overlay.retry.max_retries.or(base.retry.max_retries),
            base_delay_ms: overlay.retry.base_delay_ms.or(base.retry.base_delay_ms),
            max_delay_ms: overlay.retry.max_delay_ms.or(base.retry.max_delay_ms),
        },
        reporting: ReportingSection {
            ingest_path: overlay.reporting.ingest_path.or(base.reporting.ingest_path),
            dedup_window_ms: overlay
                .reporting
                .dedup_window_ms
                .or(base.reporting.dedup_window_ms),
            max_payload_bytes: overlay
                .reporting
                .max_payload_bytes
                .or(base.reporting.max_payload_bytes),
            max_stack_chars: overlay
                .reporting
                .max_stack_chars
                .or(base.reporting.max_stack_chars),
            origin_url: overlay.reporting.origin_url.or(base.reporting.origin_url),
            agent_string: overlay.reporting.agent_string.or(base.reporting.agent_string),
        },
        surface: SurfaceSection {
            auto_dismiss_secs: overlay
                .surface
                .auto_dismiss_secs
                .or(base.surface.auto_dismiss_secs),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
