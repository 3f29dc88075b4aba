// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialising reports under a hard size ceiling.

use crate::model::ErrorReport;

/// Largest payload sent to the ingestion endpoint, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 65_536;

/// Stack length kept when a payload is oversize, in characters.
pub const MAX_STACK_CHARS: usize = 5_000;

/// Size limits applied by [`encode_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Ceiling for the serialised report.
    pub max_payload_bytes: usize,
    /// Stack length kept when truncating.
    pub max_stack_chars: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            max_stack_chars: MAX_STACK_CHARS,
        }
    }
}

/// Why a report could not be encoded.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// `serde_json` refused the report.
    #[error("failed to serialise report: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The report is still too large after truncating the stack.
    #[error("report is {size} bytes after truncation (limit {limit})")]
    TooLarge {
        /// Final size in bytes.
        size: usize,
        /// Configured ceiling.
        limit: usize,
    },
}

/// Serialise `report`, truncating its stack only when the first encoding
/// exceeds the ceiling.
pub fn encode_report(mut report: ErrorReport, limits: &PayloadLimits) -> Result<String, PayloadError> {
    let payload = serde_json::to_string(&report)?;
    if payload.len() <= limits.max_payload_bytes {
        return Ok(payload);
    }

    if let Some(stack) = report.stack.as_mut() {
        truncate_chars(stack, limits.max_stack_chars);
    }
    let payload = serde_json::to_string(&report)?;
    if payload.len() > limits.max_payload_bytes {
        return Err(PayloadError::TooLarge {
            size: payload.len(),
            limit: limits.max_payload_bytes,
        });
    }
    Ok(payload)
}

/// Keep at most `max` characters of `s`.
fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReportType, Severity};
    use proptest::prelude::*;

    fn report(message: &str, stack: Option<String>) -> ErrorReport {
        ErrorReport {
            kind: ReportType::Exception,
            message: message.into(),
            stack,
            component_stack: None,
            origin_url: Some("https://dash.example/portfolio".into()),
            agent_string: Some("tickerboard/0.1.0".into()),
            timestamp: "2026-03-01T12:00:00.000Z".into(),
            session_id: "7f1c".into(),
            severity: Severity::Error,
            code: None,
        }
    }

    fn decoded(payload: &str) -> ErrorReport {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn small_reports_are_untouched() {
        let stack = "frame\n".repeat(2000);
        let payload = encode_report(report("m", Some(stack.clone())), &PayloadLimits::default()).unwrap();
        assert_eq!(decoded(&payload).stack, Some(stack));
    }

    #[test]
    fn oversize_stack_is_truncated() {
        let stack = "x".repeat(100_000);
        let payload = encode_report(report("m", Some(stack)), &PayloadLimits::default()).unwrap();
        assert!(payload.len() <= MAX_PAYLOAD_BYTES);
        assert_eq!(decoded(&payload).stack.unwrap().chars().count(), MAX_STACK_CHARS);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let stack = "é".repeat(40_000);
        let payload = encode_report(report("m", Some(stack)), &PayloadLimits::default()).unwrap();
        let stack = decoded(&payload).stack.unwrap();
        assert_eq!(stack.chars().count(), MAX_STACK_CHARS);
        assert!(stack.chars().all(|c| c == 'é'));
    }

    #[test]
    fn oversize_message_is_rejected() {
        let message = "m".repeat(70_000);
        let err = encode_report(report(&message, None), &PayloadLimits::default()).unwrap_err();
        assert!(matches!(err, PayloadError::TooLarge { limit: MAX_PAYLOAD_BYTES, .. }));
    }

    proptest! {
        #[test]
        fn encoded_reports_never_exceed_the_ceiling(
            stack_len in 0usize..200_000,
            message in "[a-z ]{0,200}",
        ) {
            let stack = "at quote_feed::poll (src/feed.rs:42)\n".chars().cycle().take(stack_len).collect::<String>();
            let payload = encode_report(report(&message, Some(stack)), &PayloadLimits::default()).unwrap();
            prop_assert!(payload.len() <= MAX_PAYLOAD_BYTES);
            let back = decoded(&payload);
            prop_assert!(back.stack.map_or(0, |s| s.chars().count()) <= stack_len.max(MAX_STACK_CHARS));
        }
    }
}
