// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable destination for terminal call failures.
//!
//! An [`ErrorReportHook`] installed into a [`ReporterSlot`] receives every
//! error an [`crate::ApiClient`] hands back to its caller (cancellations
//! excepted). The slot is cloneable so the component that owns the hook can
//! install and remove it without holding the client.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tb_error::ApiError;
use tracing::warn;

/// Receives terminal call failures.
pub trait ErrorReportHook: Send + Sync {
    /// Called once per failed call, after retries are exhausted.
    fn report(&self, error: &ApiError);

    /// Human-readable name for this hook (used in logging).
    fn name(&self) -> &str {
        "error-report-hook"
    }
}

impl<F> ErrorReportHook for F
where
    F: Fn(&ApiError) + Send + Sync,
{
    fn report(&self, error: &ApiError) {
        self(error)
    }
}

type SharedHook = Arc<dyn ErrorReportHook>;

/// Holds at most one [`ErrorReportHook`]. Clones share the same slot.
#[derive(Clone, Default)]
pub struct ReporterSlot {
    inner: Arc<RwLock<Option<SharedHook>>>,
}

impl ReporterSlot {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook`, returning the one it replaced.
    pub fn install(&self, hook: SharedHook) -> Option<SharedHook> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(hook)
    }

    /// Remove whatever hook is installed.
    pub fn clear(&self) -> Option<SharedHook> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.take()
    }

    /// Remove the installed hook only if it is `hook`.
    ///
    /// Returns `true` when the slot was cleared.
    pub fn clear_if(&self, hook: &SharedHook) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let matches = guard
            .as_ref()
            .is_some_and(|current| same_hook(current, hook));
        if matches {
            guard.take();
        }
        matches
    }

    /// Whether a hook is currently installed.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forward `error` to the installed hook, if any.
    ///
    /// The hook runs outside the slot lock; a panicking hook is logged and
    /// otherwise ignored.
    pub fn report(&self, error: &ApiError) {
        let hook = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(hook) = hook else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| hook.report(error))).is_err() {
            warn!(
                target: "tb.client.hook",
                hook = hook.name(),
                error_id = %error.id(),
                "error report hook panicked"
            );
        }
    }
}

fn same_hook(a: &SharedHook, b: &SharedHook) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl std::fmt::Debug for ReporterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}
