// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resilient backend calls and error reporting for the Tickerboard dashboard.
//!
//! This crate wires the workspace together:
//!
//! - [`tb_client`]: retrying call executor with a pluggable reporter hook
//! - [`tb_report`]: deduplicated, size-bounded error reports and the
//!   process-wide failure handlers
//! - [`tb_surface`]: the persistent, auto-dismissing list of call failures
//! - [`tb_toast`]: transient user notifications
//! - [`tb_config`]: TOML configuration with environment overrides
//!
//! [`Dashboard::bootstrap`] builds all of them from one [`DashboardConfig`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use tb_client::{
    ApiClient, CallDescriptor, CancellationToken, DEFAULT_API_BASE_URL, ErrorReportHook,
    HttpTransport, ReporterSlot, RetryConfig,
};
pub use tb_config::{ConfigError, ConfigWarning, DashboardConfig, load_config, validate_config};
pub use tb_error::{ApiError, ErrorClass};
pub use tb_report::{
    CaptureOptions, ErrorReporter, Exception, RejectionReason, ReporterConfig, Severity,
    capture_exception, capture_rejection, capture_render_error, spawn_reported,
};
pub use tb_surface::{ErrorSurface, SurfaceRegistration};
pub use tb_toast::{Toast, ToastBus, ToastKind};

use std::sync::Arc;
use std::time::Duration;
use tb_client::transport::join_url;
use tb_config::{ReportingSection, RetrySection};
use tb_report::{DEFAULT_INGEST_PATH, GlobalHandlers, HttpReportSink, PayloadLimits};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Errors raised while starting the dashboard layer.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A global subscriber was already installed.
    #[error("failed to initialise tracing: {0}")]
    Tracing(String),
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise every `tb.*` target logs at `level`.
pub fn init_tracing(level: &str, json: bool) -> Result<(), BootstrapError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tb={level}")));
    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|e| BootstrapError::Tracing(e.to_string()))
}

/// Level used when the configuration names none.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The `tb.*` log level `config` asks for.
pub fn log_level(config: &DashboardConfig) -> &str {
    config.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
}

/// [`init_tracing`] at the level named by `config.log_level`.
pub fn init_tracing_for(config: &DashboardConfig, json: bool) -> Result<(), BootstrapError> {
    init_tracing(log_level(config), json)
}

/// Executor retry policy described by `[retry]`.
pub fn retry_config(section: &RetrySection) -> RetryConfig {
    let defaults = RetryConfig::default();
    RetryConfig {
        max_retries: section.max_retries.unwrap_or(defaults.max_retries),
        base_delay: section
            .base_delay_ms
            .map_or(defaults.base_delay, Duration::from_millis),
        max_delay: section
            .max_delay_ms
            .map_or(defaults.max_delay, Duration::from_millis),
    }
}

/// Reporter settings described by `[reporting]`.
pub fn reporter_config(section: &ReportingSection) -> ReporterConfig {
    let defaults = ReporterConfig::default();
    ReporterConfig {
        dedup_window: section
            .dedup_window_ms
            .map_or(defaults.dedup_window, Duration::from_millis),
        limits: PayloadLimits {
            max_payload_bytes: section
                .max_payload_bytes
                .unwrap_or(defaults.limits.max_payload_bytes),
            max_stack_chars: section
                .max_stack_chars
                .unwrap_or(defaults.limits.max_stack_chars),
        },
        origin_url: section.origin_url.clone().or(defaults.origin_url),
        agent_string: section.agent_string.clone().or(defaults.agent_string),
    }
}

/// The running dashboard layer: executor, error surface, and reporter.
///
/// While alive it owns the process-wide reporter and failure handlers.
/// [`shutdown`](Self::shutdown) (or drop) releases them.
pub struct Dashboard {
    client: ApiClient,
    surface: ErrorSurface,
    reporter: Arc<ErrorReporter>,
    registration: Option<SurfaceRegistration>,
    handlers: Option<GlobalHandlers>,
}

impl Dashboard {
    /// Validate `config` and start every component.
    ///
    /// Call from inside a Tokio runtime so reports captured on plain threads
    /// can still be sent.
    ///
    /// No subscriber is installed here; the process owns that choice. Call
    /// [`init_tracing_for`] with the same `config` beforehand to apply its
    /// `log_level`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] when `config` fails validation.
    pub fn bootstrap(config: &DashboardConfig) -> Result<Self, BootstrapError> {
        for warning in validate_config(config)? {
            warn!(target: "tb.dashboard", %warning, "configuration warning");
        }

        let base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let client = ApiClient::with_transport(
            HttpTransport::new(base_url.clone()),
            retry_config(&config.retry),
        );

        let surface = config
            .surface
            .auto_dismiss_secs
            .map_or_else(ErrorSurface::new, |secs| {
                ErrorSurface::with_auto_dismiss(Duration::from_secs(secs))
            });
        let registration = surface.activate(client.reporter_slot());

        let ingest_path = config
            .reporting
            .ingest_path
            .as_deref()
            .unwrap_or(DEFAULT_INGEST_PATH);
        let sink = HttpReportSink::new(join_url(&base_url, ingest_path));
        let mut reporter =
            ErrorReporter::with_config(Arc::new(sink), reporter_config(&config.reporting));
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            reporter = reporter.with_runtime(handle);
        }
        let reporter = Arc::new(reporter);
        tb_report::install_global(Arc::clone(&reporter));
        let handlers = tb_report::setup_global_handlers();

        info!(
            target: "tb.dashboard",
            base_url = %base_url,
            ingest_path,
            log_level = log_level(config),
            "dashboard layer started"
        );
        Ok(Self {
            client,
            surface,
            reporter,
            registration: Some(registration),
            handlers: Some(handlers),
        })
    }

    /// The configured call executor.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// The error surface fed by [`client`](Self::client).
    pub fn surface(&self) -> &ErrorSurface {
        &self.surface
    }

    /// The process-wide reporter installed by [`bootstrap`](Self::bootstrap).
    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    /// Release the surface, the failure handlers, and the global reporter.
    pub fn shutdown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.teardown();
        }
        if let Some(handlers) = self.handlers.take() {
            handlers.uninstall();
            // Only remove the global reporter if it is still ours.
            if tb_report::reporter::global().is_some_and(|r| Arc::ptr_eq(&r, &self.reporter)) {
                tb_report::uninstall_global();
            }
            info!(target: "tb.dashboard", "dashboard layer stopped");
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("client", &self.client)
            .field("surface", &self.surface)
            .field("active", &self.handlers.is_some())
            .finish_non_exhaustive()
    }
}
