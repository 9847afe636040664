//! `HttpClient` over reqwest.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{
        is_retryable_status, HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream,
        RetryPolicy,
    },
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Pooled rustls client. Buffered requests are retried on 429/5xx and
/// connection failures; streamed downloads are sent once.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// 30 second read timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// The timeout bounds connection setup and buffered requests. Streamed
    /// downloads are bounded per read instead, so large packages on slow
    /// links are not cut off.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .read_timeout(timeout)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("skinsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        };
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    /// Refused connections and timeouts mean the server is unreachable.
    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_connect() {
            BridgeError::Connectivity(format!("Connection failed: {}", e))
        } else if e.is_timeout() {
            BridgeError::Connectivity("Request timed out".to_string())
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    async fn buffer(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Transfer(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut failed = 0;

        loop {
            debug!(attempt = failed + 1, attempts, url = %request.url, "Sending HTTP request");

            let error = match self.build_request(request.clone()).send().await {
                Ok(response) if is_retryable_status(response.status().as_u16()) => {
                    let status = response.status().as_u16();
                    warn!(status, attempt = failed + 1, "Retryable HTTP status");
                    BridgeError::Transfer(format!("HTTP {} error", status))
                }
                Ok(response) => return Self::buffer(response).await,
                Err(e) => {
                    warn!(error = %e, attempt = failed + 1, "HTTP request failed");
                    Self::map_send_error(e)
                }
            };

            failed += 1;
            if failed >= attempts {
                return Err(error);
            }

            let delay = policy.delay_after(failed);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.send_with_retry(request, policy).await
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream> {
        let url = request.url.clone();
        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Transfer(format!(
                "Unable to download {}, response code {}",
                url,
                status.as_u16()
            )));
        }

        let content_length = response.content_length();
        debug!(url = %url, content_length = ?content_length, "Download stream opened");

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(HttpStream {
            status: status.as_u16(),
            content_length,
            reader: Box::new(reader),
        })
    }
}
