// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retrying backend call executor for the Tickerboard dashboard.
//!
//! [`ApiClient::execute`] issues one logical call, classifies the outcome
//! and retries transient failures (no response, 429, 5xx) up to
//! [`RetryConfig::max_retries`] times. Permanent failures (other 4xx)
//! return immediately. Terminal failures are also forwarded to the
//! [`ErrorReportHook`] installed in the client's [`ReporterSlot`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod hook;
pub mod retry;
pub mod transport;

pub use cancel::CancellationToken;
pub use hook::{ErrorReportHook, ReporterSlot};
pub use retry::RetryConfig;
pub use tb_error::{ApiError, ErrorClass};
pub use transport::{
    CallDescriptor, DEFAULT_API_BASE_URL, HttpTransport, RawResponse, Transport, TransportError,
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes [`CallDescriptor`]s with classification and bounded retry.
pub struct ApiClient<T = HttpTransport> {
    transport: Arc<T>,
    config: RetryConfig,
    reporter: ReporterSlot,
}

impl ApiClient<HttpTransport> {
    /// Client for the backend at `base_url` with the default retry policy.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_transport(HttpTransport::new(base_url), RetryConfig::default())
    }
}

impl<T: Transport> ApiClient<T> {
    /// Client over an arbitrary transport.
    pub fn with_transport(transport: T, config: RetryConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            reporter: ReporterSlot::new(),
        }
    }

    /// Share an existing reporter slot instead of the client's own.
    pub fn with_reporter_slot(mut self, slot: ReporterSlot) -> Self {
        self.reporter = slot;
        self
    }

    /// The slot terminal failures are forwarded to.
    pub fn reporter_slot(&self) -> &ReporterSlot {
        &self.reporter
    }

    /// The retry policy in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute `call` and decode the success body as `R`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the call fails permanently, exhausts its
    /// retries, or succeeds with a body that does not decode as `R`.
    pub async fn execute<R: DeserializeOwned>(&self, call: &CallDescriptor) -> Result<R, ApiError> {
        self.execute_with_cancel(call, &CancellationToken::new())
            .await
    }

    /// Execute `call` and return the success body as raw JSON.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_value(&self, call: &CallDescriptor) -> Result<Value, ApiError> {
        self.execute(call).await
    }

    /// Execute `call`, abandoning it as soon as `cancel` fires.
    ///
    /// A cancelled call resolves with an error of class
    /// [`ErrorClass::Cancelled`] and is not forwarded to the reporter hook.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_with_cancel<R: DeserializeOwned>(
        &self,
        call: &CallDescriptor,
        cancel: &CancellationToken,
    ) -> Result<R, ApiError> {
        let result = self.run(call, cancel).await;
        if let Err(ref err) = result
            && err.class() != ErrorClass::Cancelled
        {
            self.reporter.report(err);
        }
        result
    }

    async fn run<R: DeserializeOwned>(
        &self,
        call: &CallDescriptor,
        cancel: &CancellationToken,
    ) -> Result<R, ApiError> {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0u32;

        loop {
            debug!(
                target: "tb.client.retry",
                attempt,
                max_attempts,
                method = %call.method,
                path = %call.path,
                "attempting call"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::cancelled()),
                res = self.transport.send(call) => res,
            };

            let err = match outcome {
                Ok(response) if response.is_success() => return decode_success(&response),
                Ok(response) => error_from_response(&response),
                Err(transport_err) => {
                    debug!(
                        target: "tb.client.retry",
                        error = %transport_err,
                        attempt,
                        "no response obtained"
                    );
                    ApiError::connection_failed()
                }
            };

            if !err.is_retryable() {
                debug!(
                    target: "tb.client.retry",
                    status = err.status(),
                    error = %err,
                    "non-retryable error, giving up"
                );
                return Err(err);
            }

            if attempt + 1 >= max_attempts {
                warn!(
                    target: "tb.client.retry",
                    status = err.status(),
                    error = %err,
                    attempt,
                    "max retries exhausted"
                );
                return Err(err);
            }

            let delay = retry::retry_delay(&self.config, attempt, err.retry_after_seconds());
            warn!(
                target: "tb.client.retry",
                status = err.status(),
                error = %err,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retryable error, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

/// Build the error for a non-success response, preferring the header hint
/// over the body's `retry_after`.
fn error_from_response(response: &RawResponse) -> ApiError {
    let err = ApiError::from_response(
        response.status,
        &response.body,
        response.status_text.as_deref(),
    );
    match response
        .retry_after
        .as_deref()
        .and_then(retry::parse_retry_after)
    {
        Some(secs) => err.with_retry_after(secs),
        None => err,
    }
}

/// Decode a 2xx body. An empty body decodes as JSON `null`.
fn decode_success<R: DeserializeOwned>(response: &RawResponse) -> Result<R, ApiError> {
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|err| {
        debug!(
            target: "tb.client.retry",
            status = response.status,
            error = %err,
            "success body did not decode"
        );
        ApiError::invalid_response(response.status)
    })
}
