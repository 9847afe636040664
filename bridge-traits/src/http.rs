//! HTTP client seam used by the manifest transport.
//!
//! The engine only ever reads: a buffered GET for the JSON manifest (retried)
//! and a streamed GET for skin packages (never retried).

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Whole-request deadline; `None` leaves the client default in place.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Attach an RFC 7617 `Authorization: Basic` header.
    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        self.header("Authorization", format!("Basic {}", encoded))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Fully buffered response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Server overload and 5xx answers are worth another attempt; everything
/// else (including 401) is final.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Streamed response body.
///
/// Only produced for 2xx responses; the status is kept for logging.
pub struct HttpStream {
    pub status: u16,
    /// Value of the `Content-Length` header, when the server sent one
    pub content_length: Option<u64>,
    pub reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts; 1 disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Pause before attempt `failed + 1`, after `failed` attempts went wrong.
    pub fn delay_after(&self, failed: u32) -> Duration {
        if !self.use_exponential_backoff || failed == 0 {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(failed - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

/// Async HTTP client.
///
/// The desktop implementation owns connection pooling and TLS; the manifest
/// transport is tested against a mock.
///
/// ```ignore
/// async fn fetch_manifest(client: &dyn HttpClient) -> Result<String> {
///     let request = HttpRequest::get("https://skins.example.com/api/skins/list")
///         .basic_auth("driver", "secret");
///     client.execute(request).await?.text()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a buffered request with the client's default retry policy.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }

    /// Start a streamed download.
    ///
    /// Fails with [`BridgeError::Transfer`] on a non-2xx status and with
    /// [`BridgeError::Connectivity`] when the server cannot be reached. Never
    /// retried: a partially consumed stream cannot be replayed.
    async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream>;
}
