// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed failure values for Tickerboard backend calls.
//!
//! Every failed call surfaces as an [`ApiError`]: an HTTP-like status, a
//! machine-readable error code, an optional correlation id and an optional
//! retry hint. Status `0` is reserved for failures that never produced a
//! response. Each error also carries an [`ErrorId`] so that consumers can
//! tell two failures apart even when their fields are identical.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Message used for calls that never obtained a response.
pub const CONNECTION_FAILED_MESSAGE: &str = "Failed to connect to API";

/// Message used for calls aborted through a cancellation token.
pub const CANCELLED_MESSAGE: &str = "Request cancelled";

// ---------------------------------------------------------------------------
// Codes
// ---------------------------------------------------------------------------

/// Fallback error codes, used when the server does not send its own.
pub mod codes {
    /// The call never obtained a response.
    pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
    /// 4xx other than 429.
    pub const CLIENT_ERROR: &str = "CLIENT_ERROR";
    /// 429 Too Many Requests.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// 5xx.
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    /// A success status whose body could not be decoded.
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    /// The caller cancelled the call.
    pub const CANCELLED: &str = "CANCELLED";
    /// Any status outside the classified ranges.
    pub const UNEXPECTED_STATUS: &str = "UNEXPECTED_STATUS";
}

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

/// Broad family an [`ApiError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// No response was obtained (status 0).
    Connection,
    /// 4xx other than 429.
    Client,
    /// 429.
    RateLimited,
    /// 5xx.
    Server,
    /// 2xx whose body could not be decoded.
    InvalidResponse,
    /// Aborted by the caller.
    Cancelled,
    /// Any other status.
    Unexpected,
}

impl ErrorClass {
    /// Classify a transport status.
    ///
    /// `InvalidResponse` and `Cancelled` cannot be derived from a status
    /// alone and are never returned here.
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => Self::Connection,
            429 => Self::RateLimited,
            400..=499 => Self::Client,
            500..=599 => Self::Server,
            _ => Self::Unexpected,
        }
    }

    /// Whether a call failing with this class may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::RateLimited | Self::Server)
    }

    /// Code used when the server did not provide one.
    pub fn default_code(&self) -> &'static str {
        match self {
            Self::Connection => codes::CONNECTION_FAILED,
            Self::Client => codes::CLIENT_ERROR,
            Self::RateLimited => codes::RATE_LIMITED,
            Self::Server => codes::SERVER_ERROR,
            Self::InvalidResponse => codes::INVALID_RESPONSE,
            Self::Cancelled => codes::CANCELLED,
            Self::Unexpected => codes::UNEXPECTED_STATUS,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Client => "client",
            Self::RateLimited => "rate_limited",
            Self::Server => "server",
            Self::InvalidResponse => "invalid_response",
            Self::Cancelled => "cancelled",
            Self::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorId
// ---------------------------------------------------------------------------

/// Process-unique identity of one failure.
///
/// Clones of an [`ApiError`] share the same id; two independently
/// constructed errors never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorId(u64);

static NEXT_ERROR_ID: AtomicU64 = AtomicU64::new(1);

impl ErrorId {
    fn next() -> Self {
        Self(NEXT_ERROR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "err-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ApiErrorBody
// ---------------------------------------------------------------------------

/// Wire shape of a backend error response.
///
/// Every field is optional; missing fields fall back to values derived
/// from the status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorBody {
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Server-side correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Suggested wait before retrying, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

impl ApiErrorBody {
    /// Read whatever fields `body` carries, field by field.
    ///
    /// Numeric ids are kept as text and numeric strings are accepted as
    /// retry hints. Fields of any other shape are treated as absent.
    pub fn lenient(body: &[u8]) -> Self {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) else {
            return Self::default();
        };
        let text = |key: &str| match map.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        let retry_after = match map.get("retry_after") {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Self {
            error: text("error"),
            error_code: text("error_code"),
            request_id: text("request_id"),
            retry_after,
        }
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// A failed backend call.
///
/// Fields are fixed at construction; the `with_*` builders are meant for
/// the code that produces the error, not for later mutation.
///
/// ```
/// use tb_error::{ApiError, ErrorClass};
///
/// let err = ApiError::new(503, "maintenance")
///     .with_request_id("req-42")
///     .with_retry_after(5.0);
/// assert_eq!(err.class(), ErrorClass::Server);
/// assert_eq!(err.error_code(), "SERVER_ERROR");
/// ```
#[derive(Debug, Clone)]
pub struct ApiError {
    id: ErrorId,
    message: String,
    status: u16,
    error_code: String,
    request_id: Option<String>,
    retry_after_seconds: Option<f64>,
    class: ErrorClass,
}

impl ApiError {
    /// Create an error for `status`, classified and coded from the status.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self::with_class(ErrorClass::from_status(status), status, message)
    }

    fn with_class(class: ErrorClass, status: u16, message: impl Into<String>) -> Self {
        Self {
            id: ErrorId::next(),
            message: message.into(),
            status,
            error_code: class.default_code().to_string(),
            request_id: None,
            retry_after_seconds: None,
            class,
        }
    }

    /// The call never obtained a response.
    pub fn connection_failed() -> Self {
        Self::with_class(ErrorClass::Connection, 0, CONNECTION_FAILED_MESSAGE)
    }

    /// A success status whose body could not be decoded.
    pub fn invalid_response(status: u16) -> Self {
        Self::with_class(ErrorClass::InvalidResponse, status, format!("HTTP {status}"))
    }

    /// The caller cancelled the call.
    pub fn cancelled() -> Self {
        Self::with_class(ErrorClass::Cancelled, 0, CANCELLED_MESSAGE)
    }

    /// Build an error from a non-success response.
    ///
    /// Each [`ApiErrorBody`] field is read on its own, so one field of the
    /// wrong type does not discard the others. When the body is not a JSON
    /// object, or carries no `error` text, the message falls back to
    /// `status_text` and then to `"HTTP <status>"`.
    pub fn from_response(status: u16, body: &[u8], status_text: Option<&str>) -> Self {
        let parsed = ApiErrorBody::lenient(body);
        let message = parsed
            .error
            .filter(|m| !m.trim().is_empty())
            .or_else(|| {
                status_text
                    .filter(|t| !t.trim().is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {status}"));

        let mut err = Self::new(status, message);
        if let Some(code) = parsed.error_code.filter(|c| !c.is_empty()) {
            err.error_code = code;
        }
        err.request_id = parsed.request_id;
        err.retry_after_seconds = parsed
            .retry_after
            .filter(|s| s.is_finite() && *s >= 0.0);
        err
    }

    /// Replace the machine-readable code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = code.into();
        self
    }

    /// Attach a correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach a retry hint in seconds. Negative or non-finite hints are ignored.
    pub fn with_retry_after(mut self, seconds: f64) -> Self {
        if seconds.is_finite() && seconds >= 0.0 {
            self.retry_after_seconds = Some(seconds);
        }
        self
    }

    /// Identity of this failure.
    pub fn id(&self) -> ErrorId {
        self.id
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Transport status; `0` when no response was obtained.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Machine-readable code.
    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    /// Server-side correlation id, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Retry hint in seconds, if any.
    pub fn retry_after_seconds(&self) -> Option<f64> {
        self.retry_after_seconds
    }

    /// Broad family of this failure.
    pub fn class(&self) -> ErrorClass {
        self.class
    }

    /// Shorthand for `self.class().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }

    /// `true` when `other` is this failure or a clone of it.
    pub fn same_instance(&self, other: &ApiError) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.message)?;
        if self.status != 0 {
            write!(f, " (HTTP {})", self.status)?;
        }
        if let Some(ref id) = self.request_id {
            write!(f, " request_id={id}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl From<&ApiError> for ApiErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            error: Some(err.message.clone()),
            error_code: Some(err.error_code.clone()),
            request_id: err.request_id.clone(),
            retry_after: err.retry_after_seconds,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
