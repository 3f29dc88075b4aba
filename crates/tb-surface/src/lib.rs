// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistent error surface.
//!
//! Holds the call failures currently shown to the user. Each entry is keyed
//! by error identity ([`ApiError::same_instance`]), not by value, and
//! dismisses itself after [`DEFAULT_AUTO_DISMISS`] unless dismissed first.
//! [`ErrorSurface::activate`] plugs the surface into an executor's
//! [`ReporterSlot`] so terminal call failures land here automatically.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tb_client::{ErrorReportHook, ReporterSlot};
use tb_error::ApiError;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long an entry stays before dismissing itself.
pub const DEFAULT_AUTO_DISMISS: Duration = Duration::from_secs(30);

struct Entry {
    error: ApiError,
    seq: u64,
    timer: Option<JoinHandle<()>>,
}

impl Entry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    entries: Mutex<Vec<Entry>>,
    next_seq: AtomicU64,
    auto_dismiss: Duration,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expire(&self, seq: u64) {
        let mut entries = self.entries();
        if let Some(pos) = entries.iter().position(|e| e.seq == seq) {
            let entry = entries.remove(pos);
            debug!(
                target: "tb.surface",
                error_id = %entry.error.id(),
                "surfaced error auto-dismissed"
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for entry in entries.iter_mut() {
            entry.cancel_timer();
        }
    }
}

/// The set of failures currently shown to the user. Clones share the set.
#[derive(Clone)]
pub struct ErrorSurface {
    inner: Arc<Inner>,
}

impl Default for ErrorSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorSurface {
    /// Empty surface with the default auto-dismiss delay.
    pub fn new() -> Self {
        Self::with_auto_dismiss(DEFAULT_AUTO_DISMISS)
    }

    /// Empty surface dismissing entries after `delay`.
    pub fn with_auto_dismiss(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Vec::new()),
                next_seq: AtomicU64::new(0),
                auto_dismiss: delay,
            }),
        }
    }

    /// Auto-dismiss delay.
    pub fn auto_dismiss(&self) -> Duration {
        self.inner.auto_dismiss
    }

    /// Show `error` unless this very instance is already shown.
    ///
    /// Starts the auto-dismiss timer when called inside a Tokio runtime;
    /// outside one the entry stays until dismissed. Returns `true` when the
    /// error was added.
    pub fn report_error(&self, error: ApiError) -> bool {
        let mut entries = self.inner.entries();
        if entries.iter().any(|e| e.error.same_instance(&error)) {
            return false;
        }
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "tb.surface",
            error_id = %error.id(),
            status = error.status(),
            "error surfaced"
        );
        entries.push(Entry {
            error,
            seq,
            timer: self.start_timer(seq),
        });
        true
    }

    fn start_timer(&self, seq: u64) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(target: "tb.surface", "no async runtime; surfaced error will not auto-dismiss");
            return None;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = self.inner.auto_dismiss;
        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(seq);
            }
        }))
    }

    /// Remove `error` and cancel its timer. Returns `true` if it was shown.
    pub fn dismiss_error(&self, error: &ApiError) -> bool {
        let mut entries = self.inner.entries();
        let Some(pos) = entries.iter().position(|e| e.error.same_instance(error)) else {
            return false;
        };
        let mut entry = entries.remove(pos);
        entry.cancel_timer();
        true
    }

    /// Remove every entry and cancel every timer.
    pub fn clear_all(&self) {
        let mut entries = self.inner.entries();
        for entry in entries.iter_mut() {
            entry.cancel_timer();
        }
        entries.clear();
    }

    /// Snapshot of the shown errors, oldest first.
    pub fn errors(&self) -> Vec<ApiError> {
        self.inner.entries().iter().map(|e| e.error.clone()).collect()
    }

    /// Number of shown errors.
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Whether nothing is shown.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive terminal failures from every client sharing `slot`.
    ///
    /// The returned registration deregisters the surface and clears it when
    /// torn down or dropped.
    pub fn activate(&self, slot: &ReporterSlot) -> SurfaceRegistration {
        let hook: Arc<dyn ErrorReportHook> = Arc::new(self.clone());
        slot.install(Arc::clone(&hook));
        SurfaceRegistration {
            surface: self.clone(),
            slot: slot.clone(),
            hook,
            active: true,
        }
    }
}

impl ErrorReportHook for ErrorSurface {
    fn report(&self, error: &ApiError) {
        self.report_error(error.clone());
    }

    fn name(&self) -> &str {
        "error-surface"
    }
}

impl std::fmt::Debug for ErrorSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSurface")
            .field("len", &self.len())
            .field("auto_dismiss", &self.inner.auto_dismiss)
            .finish()
    }
}

/// Live connection between an [`ErrorSurface`] and a [`ReporterSlot`].
#[must_use = "dropping the registration deregisters the surface"]
pub struct SurfaceRegistration {
    surface: ErrorSurface,
    slot: ReporterSlot,
    hook: Arc<dyn ErrorReportHook>,
    active: bool,
}

impl SurfaceRegistration {
    /// The registered surface.
    pub fn surface(&self) -> &ErrorSurface {
        &self.surface
    }

    /// Deregister and clear the surface now.
    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        // Another surface may have been installed since; leave it alone.
        self.slot.clear_if(&self.hook);
        self.surface.clear_all();
        debug!(target: "tb.surface", "error surface deactivated");
    }
}

impl Drop for SurfaceRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SurfaceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceRegistration")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
