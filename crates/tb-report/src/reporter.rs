// SPDX-License-Identifier: MIT OR Apache-2.0
//! The capture pipeline: dedup, notify, encode, send.

use crate::dedup::{DEFAULT_DEDUP_WINDOW, DedupCache};
use crate::model::{
    CaptureOptions, ErrorReport, Exception, RejectionReason, ReportType, Severity,
};
use crate::payload::{PayloadLimits, encode_report};
use crate::sink::ReportSink;
use chrono::{SecondsFormat, Utc};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tb_toast::{ToastBus, ToastKind};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

static SESSION_ID: LazyLock<String> = LazyLock::new(|| uuid::Uuid::new_v4().to_string());

/// Identifier shared by every report from this process.
pub fn session_id() -> &'static str {
    &SESSION_ID
}

/// Identifies this library in reports when no agent string is configured.
pub fn default_agent_string() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Settings for an [`ErrorReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    /// Repeats of the same `(type, message)` inside this window are dropped.
    pub dedup_window: Duration,
    /// Payload ceiling and truncation length.
    pub limits: PayloadLimits,
    /// Copied into every report's `origin_url`.
    pub origin_url: Option<String>,
    /// Copied into every report's `agent_string`.
    pub agent_string: Option<String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            limits: PayloadLimits::default(),
            origin_url: None,
            agent_string: Some(default_agent_string()),
        }
    }
}

/// What happened to one capture.
#[derive(Debug)]
pub enum CaptureOutcome {
    /// An identical report went out within the dedup window.
    Suppressed,
    /// The report is being sent by a detached task.
    Dispatched(JoinHandle<()>),
    /// The report could not be encoded or no runtime was available.
    Dropped,
}

impl CaptureOutcome {
    /// Whether a send was started.
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched(_))
    }

    /// Wait for a dispatched send to finish. Send failures are already
    /// logged by the task, so there is nothing to return.
    pub async fn settle(self) {
        if let Self::Dispatched(handle) = self {
            let _ = handle.await;
        }
    }
}

struct Draft<'a> {
    kind: ReportType,
    message: &'a str,
    stack: Option<&'a str>,
    component_stack: Option<&'a str>,
    severity: Severity,
    code: Option<&'a str>,
}

/// Turns captured failures into deduplicated, size-bounded reports.
pub struct ErrorReporter {
    config: ReporterConfig,
    sink: Arc<dyn ReportSink>,
    toasts: Arc<ToastBus>,
    runtime: Option<Handle>,
    dedup: Mutex<DedupCache>,
}

impl ErrorReporter {
    /// Reporter sending to `sink`, toasting on the process-wide bus.
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self::with_config(sink, ReporterConfig::default())
    }

    /// Reporter with explicit settings.
    pub fn with_config(sink: Arc<dyn ReportSink>, config: ReporterConfig) -> Self {
        Self {
            dedup: Mutex::new(DedupCache::new(config.dedup_window)),
            config,
            sink,
            toasts: tb_toast::global(),
            runtime: None,
        }
    }

    /// Toast on `bus` instead of the process-wide bus.
    pub fn with_toast_bus(mut self, bus: Arc<ToastBus>) -> Self {
        self.toasts = bus;
        self
    }

    /// Runtime used for sends captured outside any runtime context, such as
    /// panics on plain threads.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Current settings.
    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Report an exception. Severity defaults to [`Severity::Error`].
    pub fn capture_exception(&self, exception: &Exception, options: CaptureOptions) -> CaptureOutcome {
        self.capture(Draft {
            kind: ReportType::Exception,
            message: exception.message(),
            stack: exception.stack(),
            component_stack: None,
            severity: options.severity.unwrap_or_default(),
            code: options.code.as_deref(),
        })
    }

    /// Report a failed background task. Always [`Severity::Error`].
    pub fn capture_rejection(&self, reason: &RejectionReason, code: Option<&str>) -> CaptureOutcome {
        self.capture(Draft {
            kind: ReportType::Rejection,
            message: reason.message(),
            stack: reason.stack(),
            component_stack: None,
            severity: Severity::Error,
            code,
        })
    }

    /// Report a view that failed to render. Always [`Severity::Critical`].
    pub fn capture_render_error(&self, exception: &Exception, component_stack: &str) -> CaptureOutcome {
        self.capture(Draft {
            kind: ReportType::RenderError,
            message: exception.message(),
            stack: exception.stack(),
            component_stack: Some(component_stack),
            severity: Severity::Critical,
            code: None,
        })
    }

    /// Forget every dedup entry.
    pub fn reset(&self) {
        self.dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn capture(&self, draft: Draft<'_>) -> CaptureOutcome {
        match catch_unwind(AssertUnwindSafe(|| self.process(draft))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(target: "tb.report", "error reporter failed internally; report discarded");
                CaptureOutcome::Dropped
            }
        }
    }

    fn process(&self, draft: Draft<'_>) -> CaptureOutcome {
        let admitted = self
            .dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .admit(draft.kind, draft.message, Instant::now());
        if !admitted {
            debug!(
                target: "tb.report",
                kind = %draft.kind,
                message = draft.message,
                "duplicate report suppressed"
            );
            return CaptureOutcome::Suppressed;
        }

        let runtime = Handle::try_current().ok().or_else(|| self.runtime.clone());
        if draft.severity.notifies_user() {
            self.notify(draft.message, runtime.as_ref());
        }

        let report = ErrorReport {
            kind: draft.kind,
            message: draft.message.to_string(),
            stack: draft.stack.map(str::to_string),
            component_stack: draft.component_stack.map(str::to_string),
            origin_url: self.config.origin_url.clone(),
            agent_string: self.config.agent_string.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            session_id: session_id().to_string(),
            severity: draft.severity,
            code: draft.code.map(str::to_string),
        };

        let payload = match encode_report(report, &self.config.limits) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: "tb.report", error = %err, "error report dropped");
                return CaptureOutcome::Dropped;
            }
        };

        let Some(runtime) = runtime else {
            warn!(target: "tb.report", "no async runtime available; error report dropped");
            return CaptureOutcome::Dropped;
        };

        let sink = Arc::clone(&self.sink);
        let kind = draft.kind;
        CaptureOutcome::Dispatched(runtime.spawn(async move {
            match sink.send(payload).await {
                Ok(()) => debug!(target: "tb.report", %kind, "error report delivered"),
                Err(err) => warn!(target: "tb.report", error = %err, "failed to deliver error report"),
            }
        }))
    }

    /// Raise the error toast for a captured failure.
    ///
    /// A second panic inside a panic hook aborts the process, so while this
    /// thread is panicking the listener runs later as a runtime task.
    fn notify(&self, message: &str, runtime: Option<&Handle>) {
        if !std::thread::panicking() {
            self.toasts.toast(message, ToastKind::Error);
            return;
        }
        match runtime {
            Some(runtime) => {
                let toasts = Arc::clone(&self.toasts);
                let message = message.to_string();
                runtime.spawn(async move {
                    toasts.toast(message, ToastKind::Error);
                });
            }
            None => debug!(target: "tb.report", message, "toast skipped while panicking; no runtime"),
        }
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("config", &self.config)
            .field("has_runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Process-wide reporter
// ---------------------------------------------------------------------------

static GLOBAL: RwLock<Option<Arc<ErrorReporter>>> = RwLock::new(None);

/// Make `reporter` the target of the free capture functions, returning the
/// one it replaced.
pub fn install_global(reporter: Arc<ErrorReporter>) -> Option<Arc<ErrorReporter>> {
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(reporter)
}

/// Remove the process-wide reporter.
pub fn uninstall_global() -> Option<Arc<ErrorReporter>> {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner).take()
}

/// The process-wide reporter, if installed.
pub fn global() -> Option<Arc<ErrorReporter>> {
    GLOBAL.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Clear the process-wide reporter's dedup state.
pub fn reset() {
    if let Some(reporter) = global() {
        reporter.reset();
    }
}

fn with_global(f: impl FnOnce(&ErrorReporter) -> CaptureOutcome) -> CaptureOutcome {
    match global() {
        Some(reporter) => f(&reporter),
        None => {
            debug!(target: "tb.report", "no error reporter installed; capture ignored");
            CaptureOutcome::Dropped
        }
    }
}

/// [`ErrorReporter::capture_exception`] on the process-wide reporter.
pub fn capture_exception(exception: &Exception, options: CaptureOptions) -> CaptureOutcome {
    with_global(|r| r.capture_exception(exception, options))
}

/// [`ErrorReporter::capture_rejection`] on the process-wide reporter.
pub fn capture_rejection(reason: &RejectionReason, code: Option<&str>) -> CaptureOutcome {
    with_global(|r| r.capture_rejection(reason, code))
}

/// [`ErrorReporter::capture_render_error`] on the process-wide reporter.
pub fn capture_render_error(exception: &Exception, component_stack: &str) -> CaptureOutcome {
    with_global(|r| r.capture_render_error(exception, component_stack))
}
