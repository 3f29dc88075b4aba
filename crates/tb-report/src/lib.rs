// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deduplicated, size-bounded error reporting.
//!
//! Captured failures go through the same steps:
//!
//! 1. drop repeats of the same `(type, message)` inside the dedup window,
//! 2. raise an error toast for `error`/`critical` severity,
//! 3. serialise, truncating the stack only if the payload is oversize,
//! 4. send to the ingestion endpoint from a detached task.
//!
//! Nothing in the pipeline returns an error or panics to its caller; every
//! internal failure ends in a `tracing` event.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dedup;
pub mod handlers;
pub mod model;
pub mod payload;
pub mod reporter;
pub mod sink;

pub use handlers::{GlobalHandlers, handle_rejection, setup_global_handlers, spawn_reported};
pub use model::{
    CaptureOptions, ErrorReport, Exception, REJECTION_FALLBACK_MESSAGE, RejectionReason,
    ReportType, Severity,
};
pub use payload::{MAX_PAYLOAD_BYTES, MAX_STACK_CHARS, PayloadLimits};
pub use reporter::{
    CaptureOutcome, ErrorReporter, ReporterConfig, capture_exception, capture_rejection,
    capture_render_error, install_global, session_id, uninstall_global,
};
pub use sink::{DEFAULT_INGEST_PATH, HttpReportSink, ReportSink, SendError};
