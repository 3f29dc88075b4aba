// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-listener notification bus.
//!
//! Producers publish [`Toast`]s with [`ToastBus::toast`]; whichever listener
//! is registered at that moment receives it synchronously. With no listener
//! the toast is dropped. This is not a fan-out channel: registering a new
//! listener replaces the previous one.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::{trace, warn};

/// Visual flavour of a toast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    /// Something failed.
    #[default]
    Error,
    /// Something may need attention.
    Warning,
    /// Neutral information.
    Info,
    /// Something completed.
    Success,
}

impl fmt::Display for ToastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Success => "success",
        })
    }
}

/// A transient user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    /// Sequential decimal id: `"1"`, `"2"`, …
    pub id: String,
    /// Text shown to the user.
    pub message: String,
    /// Visual flavour.
    #[serde(rename = "type")]
    pub kind: ToastKind,
}

/// Callback receiving published toasts.
pub type ToastListener = Arc<dyn Fn(&Toast) + Send + Sync>;

/// Snapshot of bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToastBusStats {
    /// Toasts published since the last reset.
    pub total_published: u64,
    /// Toasts published while no listener was registered.
    pub dropped: u64,
}

/// Single-subscriber publish channel for [`Toast`]s.
pub struct ToastBus {
    next_id: AtomicU64,
    dropped: AtomicU64,
    listener: Mutex<Option<ToastListener>>,
}

impl ToastBus {
    /// A bus with no listener whose first toast gets id `"1"`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            listener: Mutex::new(None),
        }
    }

    /// Publish a toast and return it.
    ///
    /// The listener runs outside the bus lock, so it may itself publish. A
    /// panicking listener is logged and otherwise ignored.
    pub fn toast(&self, message: impl Into<String>, kind: ToastKind) -> Toast {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let toast = Toast {
            id: id.to_string(),
            message: message.into(),
            kind,
        };

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match listener {
            Some(listener) => {
                if catch_unwind(AssertUnwindSafe(|| listener(&toast))).is_err() {
                    warn!(target: "tb.toast", id = %toast.id, "toast listener panicked");
                }
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(target: "tb.toast", id = %toast.id, "no toast listener; dropped");
            }
        }
        toast
    }

    /// Publish an error toast.
    pub fn error(&self, message: impl Into<String>) -> Toast {
        self.toast(message, ToastKind::Error)
    }

    /// Replace the listener; `None` unregisters it.
    pub fn set_listener(&self, listener: Option<ToastListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Register `f` as the listener.
    pub fn listen<F>(&self, f: F)
    where
        F: Fn(&Toast) + Send + Sync + 'static,
    {
        self.set_listener(Some(Arc::new(f)));
    }

    /// Whether a listener is registered.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ToastBusStats {
        ToastBusStats {
            total_published: self.next_id.load(Ordering::SeqCst).saturating_sub(1),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Restart ids at `"1"` and clear the listener. Meant for test isolation.
    pub fn reset(&self) {
        self.set_listener(None);
        self.next_id.store(1, Ordering::SeqCst);
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for ToastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ToastBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastBus")
            .field("stats", &self.stats())
            .field("has_listener", &self.has_listener())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Process-wide bus
// ---------------------------------------------------------------------------

static GLOBAL: LazyLock<Arc<ToastBus>> = LazyLock::new(|| Arc::new(ToastBus::new()));

/// The process-wide bus.
pub fn global() -> Arc<ToastBus> {
    Arc::clone(&GLOBAL)
}

/// Publish on the process-wide bus.
pub fn toast(message: impl Into<String>, kind: ToastKind) -> Toast {
    GLOBAL.toast(message, kind)
}

/// Replace the process-wide listener.
pub fn set_listener(listener: Option<ToastListener>) {
    GLOBAL.set_listener(listener);
}

/// Reset the process-wide bus.
pub fn reset() {
    GLOBAL.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn recorder(bus: &ToastBus) -> Arc<Mutex<Vec<Toast>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.listen(move |t| sink.lock().unwrap().push(t.clone()));
        seen
    }

    #[test]
    fn publish_without_listener_is_dropped() {
        let bus = ToastBus::new();
        let t = bus.toast("x", ToastKind::Error);
        assert_eq!(t.id, "1");
        assert_eq!(bus.stats().dropped, 1);
    }

    #[test]
    fn listener_sees_sequential_ids() {
        let bus = ToastBus::new();
        let seen = recorder(&bus);
        bus.error("a");
        bus.error("b");
        let seen = seen.lock().unwrap();
        let ids: Vec<_> = seen.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(seen[0].message, "a");
        assert_eq!(seen[1].kind, ToastKind::Error);
    }

    #[test]
    fn new_listener_replaces_old() {
        let bus = ToastBus::new();
        let first = recorder(&bus);
        let second = recorder(&bus);
        bus.toast("hello", ToastKind::Info);
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn clearing_listener_drops_toasts() {
        let bus = ToastBus::new();
        let seen = recorder(&bus);
        bus.set_listener(None);
        bus.error("lost");
        assert!(seen.lock().unwrap().is_empty());
        assert!(!bus.has_listener());
    }

    #[test]
    fn reset_restarts_ids_and_clears_listener() {
        let bus = ToastBus::new();
        let _seen = recorder(&bus);
        bus.error("a");
        bus.error("b");
        bus.reset();
        assert!(!bus.has_listener());
        assert_eq!(bus.error("c").id, "1");
        assert_eq!(bus.stats().total_published, 1);
    }

    #[test]
    fn listener_may_publish_recursively() {
        let bus = Arc::new(ToastBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let bus2 = Arc::clone(&bus);
            let sink = Arc::clone(&seen);
            bus.listen(move |t| {
                sink.lock().unwrap().push(t.id.clone());
                if t.kind == ToastKind::Error {
                    bus2.toast("follow-up", ToastKind::Info);
                }
            });
        }
        bus.error("root");
        assert_eq!(*seen.lock().unwrap(), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn panicking_listener_is_contained() {
        let bus = ToastBus::new();
        bus.listen(|_| panic!("render failed"));
        let t = bus.error("boom");
        assert_eq!(t.id, "1");
        assert_eq!(bus.error("again").id, "2");
    }

    #[test]
    fn toast_serialises_kind_as_type() {
        let t = Toast {
            id: "3".into(),
            message: "m".into(),
            kind: ToastKind::Success,
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json, serde_json::json!({"id": "3", "message": "m", "type": "success"}));
    }

    #[test]
    #[serial]
    fn global_bus_round_trip() {
        reset();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        set_listener(Some(Arc::new(move |t: &Toast| {
            sink.lock().unwrap().push(t.id.clone())
        })));
        toast("a", ToastKind::Error);
        toast("b", ToastKind::Warning);
        assert_eq!(*seen.lock().unwrap(), vec!["1".to_string(), "2".to_string()]);
        reset();
        assert_eq!(toast("c", ToastKind::Error).id, "1");
        reset();
    }
}
