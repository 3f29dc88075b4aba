// SPDX-License-Identifier: MIT OR Apache-2.0
//! Report payloads and the values captured into them.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::PanicHookInfo;

/// Message used when a rejection reason carries no usable text.
pub const REJECTION_FALLBACK_MESSAGE: &str = "Unhandled promise rejection";

/// Message used for errors whose own message is empty.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// How a failure reached the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// An uncaught synchronous failure.
    Exception,
    /// A background task that failed with nobody awaiting it.
    Rejection,
    /// A view failed to render.
    RenderError,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exception => "exception",
            Self::Rejection => "rejection",
            Self::RenderError => "render_error",
        })
    }
}

/// How bad a reported failure is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported but never shown to the user.
    Warning,
    /// Reported and shown.
    #[default]
    Error,
    /// Reported and shown; the view is likely unusable.
    Critical,
}

impl Severity {
    /// Whether reports of this severity raise a toast.
    pub fn notifies_user(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

/// Body posted to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// How the failure was captured.
    #[serde(rename = "type")]
    pub kind: ReportType,
    /// Failure message.
    pub message: String,
    /// Stack or cause chain, truncated when the payload is oversize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// View hierarchy at the point of a render failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    /// Where the failure happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    /// Identifies the reporting client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_string: Option<String>,
    /// RFC 3339 capture time.
    pub timestamp: String,
    /// Process-wide session id.
    pub session_id: String,
    /// How bad it is.
    pub severity: Severity,
    /// Optional caller-supplied code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ---------------------------------------------------------------------------
// Exception
// ---------------------------------------------------------------------------

/// A captured failure: a message and, when available, a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    message: String,
    stack: Option<String>,
}

impl Exception {
    /// Exception with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: if message.trim().is_empty() {
                UNKNOWN_ERROR_MESSAGE.to_string()
            } else {
                message
            },
            stack: None,
        }
    }

    /// Attach a stack. Blank stacks are ignored.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        if !stack.trim().is_empty() {
            self.stack = Some(stack);
        }
        self
    }

    /// Capture a `std::error::Error`; its source chain becomes the stack.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        let exception = Self::new(err.to_string());
        if chain.is_empty() {
            exception
        } else {
            exception.with_stack(chain.join("\n"))
        }
    }

    /// Capture a panic from inside a panic hook, with a backtrace as stack.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let message = panic_message(info.payload());
        let mut stack = String::new();
        if let Some(loc) = info.location() {
            stack.push_str(&format!("at {}:{}:{}\n", loc.file(), loc.line(), loc.column()));
        }
        stack.push_str(&std::backtrace::Backtrace::force_capture().to_string());
        Self::new(message).with_stack(stack)
    }

    /// Capture a panic payload recovered after unwinding.
    pub fn from_panic_payload(payload: &(dyn Any + Send)) -> Self {
        Self::new(panic_message(payload))
    }

    /// Failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack, if any.
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// RejectionReason
// ---------------------------------------------------------------------------

/// Why a background task failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// An error-like value.
    Error(Exception),
    /// A bare message.
    Message(String),
    /// A value with no usable description.
    Opaque,
}

impl RejectionReason {
    /// Capture a `std::error::Error` reason.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::Error(Exception::from_error(err))
    }

    /// Message used in the report.
    pub fn message(&self) -> &str {
        match self {
            Self::Error(e) => e.message(),
            Self::Message(m) => m,
            Self::Opaque => REJECTION_FALLBACK_MESSAGE,
        }
    }

    /// Stack used in the report.
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::Error(e) => e.stack(),
            Self::Message(_) | Self::Opaque => None,
        }
    }
}

impl From<Exception> for RejectionReason {
    fn from(e: Exception) -> Self {
        Self::Error(e)
    }
}

impl From<String> for RejectionReason {
    fn from(m: String) -> Self {
        Self::Message(m)
    }
}

impl From<&str> for RejectionReason {
    fn from(m: &str) -> Self {
        Self::Message(m.to_string())
    }
}

/// Options for [`crate::ErrorReporter::capture_exception`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Defaults to [`Severity::Error`].
    pub severity: Option<Severity>,
    /// Optional machine code forwarded with the report.
    pub code: Option<String>,
}

impl CaptureOptions {
    /// Options with an explicit severity.
    pub fn severity(severity: Severity) -> Self {
        Self {
            severity: Some(severity),
            code: None,
        }
    }

    /// Attach a code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("quote refresh failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn error_source_chain_becomes_stack() {
        let err = Outer(std::io::Error::other("socket closed"));
        let e = Exception::from_error(&err);
        assert_eq!(e.message(), "quote refresh failed");
        assert_eq!(e.stack(), Some("caused by: socket closed"));
    }

    #[test]
    fn stackless_error_has_no_stack() {
        let err = std::io::Error::other("plain");
        let e = Exception::from_error(&err);
        assert_eq!(e.message(), "plain");
        assert!(e.stack().is_none());
    }

    #[test]
    fn empty_message_gets_placeholder() {
        assert_eq!(Exception::new("  ").message(), UNKNOWN_ERROR_MESSAGE);
        assert!(Exception::new("x").with_stack("").stack().is_none());
    }

    #[test]
    fn panic_payload_messages() {
        let s: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(Exception::from_panic_payload(s.as_ref()).message(), "static str");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(Exception::from_panic_payload(s.as_ref()).message(), "owned");
        let s: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(Exception::from_panic_payload(s.as_ref()).message(), "unknown panic");
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(RejectionReason::from("timeout").message(), "timeout");
        assert_eq!(
            RejectionReason::from(Exception::new("bad")).message(),
            "bad"
        );
        assert_eq!(
            RejectionReason::Opaque.message(),
            "Unhandled promise rejection"
        );
        assert!(RejectionReason::Opaque.stack().is_none());
    }

    #[test]
    fn severity_notification_rule() {
        assert!(!Severity::Warning.notifies_user());
        assert!(Severity::Error.notifies_user());
        assert!(Severity::Critical.notifies_user());
        assert_eq!(Severity::default(), Severity::Error);
    }

    #[test]
    fn report_wire_names() {
        let report = ErrorReport {
            kind: ReportType::RenderError,
            message: "chart crashed".into(),
            stack: None,
            component_stack: Some("in PriceChart".into()),
            origin_url: None,
            agent_string: None,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            session_id: "s".into(),
            severity: Severity::Critical,
            code: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["type"], "render_error");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["component_stack"], "in PriceChart");
        assert!(json.get("stack").is_none());
    }
}
