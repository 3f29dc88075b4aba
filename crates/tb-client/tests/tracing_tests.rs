// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured log output of the retry loop.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tb_client::{ApiClient, CallDescriptor, RawResponse, RetryConfig, Transport, TransportError};
use tracing_subscriber::fmt::MakeWriter;

// ---------------------------------------------------------------------------
// Capturing infrastructure
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;
    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

fn capturing_subscriber() -> (tracing::subscriber::DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (guard, logs)
}

struct Always(u16);

#[async_trait]
impl Transport for Always {
    async fn send(&self, _call: &CallDescriptor) -> Result<RawResponse, TransportError> {
        Ok(RawResponse::new(self.0, ""))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn backoff_and_exhaustion_are_logged() {
    let (_guard, logs) = capturing_subscriber();
    let api = ApiClient::with_transport(Always(502), RetryConfig::default());
    api.execute::<Value>(&CallDescriptor::get("/api/quotes"))
        .await
        .unwrap_err();

    let out = logs.contents();
    assert!(out.contains("retryable error, backing off"), "{out}");
    assert!(out.contains("delay_ms=500"), "{out}");
    assert!(out.contains("delay_ms=1000"), "{out}");
    assert!(out.contains("max retries exhausted"), "{out}");
    assert!(out.contains("tb.client.retry"), "{out}");
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_logs_give_up() {
    let (_guard, logs) = capturing_subscriber();
    let api = ApiClient::with_transport(Always(401), RetryConfig::default());
    api.execute::<Value>(&CallDescriptor::get("/api/account"))
        .await
        .unwrap_err();

    let out = logs.contents();
    assert!(out.contains("non-retryable error, giving up"), "{out}");
    assert!(!out.contains("backing off"), "{out}");
}
