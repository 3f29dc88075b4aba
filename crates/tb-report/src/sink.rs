// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery of encoded reports to the ingestion endpoint.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

/// Default ingestion path, relative to the backend base URL.
pub const DEFAULT_INGEST_PATH: &str = "/api/errors";

/// Why a report was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// No response was obtained.
    #[error("ingestion request failed: {0}")]
    Transport(String),
    /// The endpoint answered with a non-success status.
    #[error("ingestion endpoint returned HTTP {status}")]
    Rejected {
        /// Response status.
        status: u16,
    },
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Destination for encoded reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver one JSON payload.
    async fn send(&self, payload: String) -> Result<(), SendError>;
}

/// Posts reports as JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpReportSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReportSink {
    /// Sink posting to the absolute URL `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Sink reusing an existing client.
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Sink posting to [`DEFAULT_INGEST_PATH`] under `base_url`.
    pub fn for_base_url(base_url: &str) -> Self {
        Self::new(format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            DEFAULT_INGEST_PATH
        ))
    }

    /// Target URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn send(&self, payload: String) -> Result<(), SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SendError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn default_endpoint_under_base_url() {
        let sink = HttpReportSink::for_base_url("http://localhost:8000/");
        assert_eq!(sink.endpoint(), "http://localhost:8000/api/errors");
    }

    #[tokio::test]
    async fn posts_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/errors"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpReportSink::for_base_url(&server.uri());
        sink.send(r#"{"message":"x"}"#.into()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = HttpReportSink::for_base_url(&server.uri())
            .send("{}".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Rejected { status: 500 }));
    }
}
