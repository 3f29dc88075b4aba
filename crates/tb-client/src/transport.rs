// SPDX-License-Identifier: MIT OR Apache-2.0
//! The network seam used by [`crate::ApiClient`].
//!
//! [`HttpTransport`] is the production implementation on top of `reqwest`;
//! tests substitute scripted transports.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;

/// One logical backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the transport's base URL, or an absolute URL.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl CallDescriptor {
    /// Describe a call with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path` with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// `PUT path` with a JSON body.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// What a transport obtained from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    /// Numeric status.
    pub status: u16,
    /// Canonical reason phrase for the status, when known.
    pub status_text: Option<String>,
    /// Raw `Retry-After` header value.
    pub retry_after: Option<String>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Response with a status and a body, no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: None,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Attach a `Retry-After` header value.
    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    /// `true` for statuses in `[200, 299]`.
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Failure to obtain any response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be built or sent, or the body could not be read.
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Sends a single attempt of a call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one network round trip.
    async fn send(&self, call: &CallDescriptor) -> Result<RawResponse, TransportError>;
}

/// Backend location used when none is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// `reqwest`-backed transport rooted at a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Transport with a default `reqwest` client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Transport reusing an existing client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `path` against the base URL.
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Join a base URL and a path with exactly one `/` between them.
/// Absolute `http(s)://` paths are returned unchanged.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        format!("/{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, call: &CallDescriptor) -> Result<RawResponse, TransportError> {
        let mut request = self
            .client
            .request(call.method.clone(), self.url_for(&call.path))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(ref body) = call.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().map(str::to_string),
            retry_after,
            body,
        })
    }
}
