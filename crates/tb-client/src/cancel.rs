// SPDX-License-Identifier: MIT OR Apache-2.0
//! Abandoning a call from outside the executor.

use std::sync::Arc;
use tokio::sync::watch;

/// Handed to [`ApiClient::execute_with_cancel`](crate::ApiClient::execute_with_cancel)
/// to stop a call between or during attempts.
///
/// Clones control the same call. Once cancelled a token stays cancelled, so
/// one token per user action (a closed view, a replaced query) is the usual
/// shape.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// A token for a call that should run to completion unless cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Stop the call at its next await point: an in-flight request or a
    /// backoff sleep.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) was called on this token or a clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
