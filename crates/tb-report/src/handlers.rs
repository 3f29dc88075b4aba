// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide routing of uncaught failures into the reporter.
//!
//! [`setup_global_handlers`] installs a panic hook (uncaught synchronous
//! failures) and enables the rejection handler used by [`spawn_reported`]
//! (background tasks that fail with nobody awaiting them). Both route to
//! the process-wide [`crate::ErrorReporter`].

use crate::model::{CaptureOptions, Exception, RejectionReason};
use crate::reporter;
use futures::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static PREVIOUS_HOOK: Mutex<Option<Arc<PanicHook>>> = Mutex::new(None);
static GENERATION: AtomicU64 = AtomicU64::new(0);
static OUR_HOOK: AtomicUsize = AtomicUsize::new(0);

fn hook_address(hook: &PanicHook) -> usize {
    (hook as *const PanicHook).cast::<()>() as usize
}

/// Whether [`setup_global_handlers`] is in effect.
pub fn handlers_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Guard returned by [`setup_global_handlers`].
///
/// Dropping the guard that performed the installation (or calling
/// [`uninstall`](Self::uninstall)) disables the rejection handler and
/// restores the previous panic hook. If another hook was set after ours,
/// that hook is left in place and ours, still in its chain, only forwards
/// to the hook it wrapped. Guards from repeated calls own nothing.
#[derive(Debug)]
#[must_use = "dropping the guard uninstalls the handlers"]
pub struct GlobalHandlers {
    owner: bool,
}

impl GlobalHandlers {
    /// Whether this guard performed the installation.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Remove the handlers now.
    pub fn uninstall(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.owner) {
            return;
        }
        // set_hook/take_hook panic when called while panicking.
        if std::thread::panicking() {
            return;
        }
        let previous = PREVIOUS_HOOK
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        INSTALLED.store(false, Ordering::SeqCst);
        let current = panic::take_hook();
        if hook_address(&*current) == OUR_HOOK.swap(0, Ordering::SeqCst) {
            if let Some(previous) = previous {
                panic::set_hook(Box::new(move |info| previous(info)));
            }
        } else {
            panic::set_hook(current);
            debug!(
                target: "tb.report.handlers",
                "panic hook replaced after install; leaving the newer hook in place"
            );
        }
        debug!(target: "tb.report.handlers", "global error handlers removed");
    }
}

impl Drop for GlobalHandlers {
    fn drop(&mut self) {
        self.release();
    }
}

/// Install the panic hook and enable the rejection handler.
///
/// Safe to call more than once: only the first call installs anything and
/// only its guard uninstalls. The previously registered panic hook keeps
/// running after ours.
pub fn setup_global_handlers() -> GlobalHandlers {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        debug!(target: "tb.report.handlers", "global error handlers already installed");
        return GlobalHandlers { owner: false };
    }

    let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
    *PREVIOUS_HOOK.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&previous));

    let generation = GENERATION.fetch_add(1, Ordering::SeqCst) + 1;
    let hook: Box<PanicHook> = Box::new(move |info: &PanicHookInfo<'_>| {
        // Stale after uninstall or reinstall: forward only.
        if handlers_installed() && GENERATION.load(Ordering::SeqCst) == generation {
            let exception = Exception::from_panic(info);
            // A dispatched send runs detached.
            let _ = reporter::capture_exception(&exception, CaptureOptions::default());
        }
        previous(info);
    });
    OUR_HOOK.store(hook_address(&*hook), Ordering::SeqCst);
    panic::set_hook(hook);

    debug!(target: "tb.report.handlers", "global error handlers installed");
    GlobalHandlers { owner: true }
}

/// Route a failed background task to the reporter.
///
/// Without installed handlers the failure is only logged.
pub fn handle_rejection(reason: RejectionReason) {
    if handlers_installed() {
        let _ = reporter::capture_rejection(&reason, None);
    } else {
        warn!(
            target: "tb.report.handlers",
            reason = reason.message(),
            "unhandled task failure"
        );
    }
}

/// Spawn `future`, routing an `Err` result to [`handle_rejection`].
///
/// A panic inside the task has already been seen by the panic hook and is
/// not reported a second time.
pub fn spawn_reported<F, T, E>(future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::spawn(async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => handle_rejection(RejectionReason::from_error(&err)),
            Err(payload) => {
                let exception = Exception::from_panic_payload(payload.as_ref());
                debug!(
                    target: "tb.report.handlers",
                    panic = exception.message(),
                    "reported task panicked"
                );
            }
        }
    })
}
