//! Skins API connector implementation
//!
//! Implements the `RemoteInventory` trait for the HTTP/JSON manifest server.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::inventory::{Category, ProgressFn, RemoteInventory, RemoteSkin};
use core_runtime::config::{Credentials, SyncConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::SkinsApiError;
use crate::types::ManifestEntry;

/// Manifest endpoint, relative to the server base
const LIST_PATH: &str = "api/skins/list";

/// Read buffer for package downloads
const CHUNK_SIZE: usize = 8 * 1024;

/// Default per-request timeout for ping and listing
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP/JSON skins server connector
///
/// # Features
///
/// - Single-request listing of every category from one flat manifest
/// - Streaming downloads into any `AsyncWrite` sink
/// - Basic authentication via `HttpClient`
/// - Exponential backoff on listing requests (never on downloads)
///
/// # Example
///
/// ```ignore
/// use provider_skins_api::SkinsApiConnector;
/// use bridge_traits::{Category, RemoteInventory};
///
/// let connector = SkinsApiConnector::new(http_client, "https://skins.example.com", credentials)?;
/// let skins = connector.list_items(Category::Ac).await?;
/// ```
pub struct SkinsApiConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// Server base URL, always ending with `/`
    base: Url,

    credentials: Credentials,

    /// Retry policy for listings
    retry_policy: RetryPolicy,

    timeout: Duration,
}

impl SkinsApiConnector {
    /// Create a new connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `server` - Server base URL (`http` or `https`)
    /// * `credentials` - Basic auth credentials; anonymous sends no header
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        server: &str,
        credentials: Credentials,
    ) -> crate::Result<Self> {
        let mut base = Url::parse(server)
            .map_err(|e| SkinsApiError::InvalidEndpoint(format!("{}: {}", server, e)))?;
        if base.cannot_be_a_base() {
            return Err(SkinsApiError::InvalidEndpoint(server.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http_client,
            base,
            credentials,
            retry_policy: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Build a connector from validated configuration.
    pub fn from_config(config: &SyncConfig) -> crate::Result<Self> {
        let http_client = config.http_client.clone().ok_or_else(|| {
            SkinsApiError::BridgeError(BridgeError::NotAvailable(
                "HTTP client not configured".to_string(),
            ))
        })?;

        Ok(Self::new(http_client, config.server_url.as_str(), config.credentials.clone())?
            .with_timeout(config.request_timeout))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of the manifest listing
    pub fn list_url(&self) -> String {
        self.join(&[LIST_PATH])
    }

    /// URL of one skin package: `api/skins/{group}/{car}/{file}/download`
    pub fn download_url(&self, skin: &RemoteSkin) -> String {
        let file_name = skin.file_name();
        self.join(&[
            "api",
            "skins",
            &skin.id.group,
            &skin.id.content,
            &file_name,
            "download",
        ])
    }

    fn join(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/'));
            }
        }
        url.to_string()
    }

    fn request(&self, url: impl Into<String>) -> HttpRequest {
        let request = HttpRequest::get(url).header("Accept", "application/json");
        if self.credentials.is_anonymous() {
            request
        } else {
            request.basic_auth(&self.credentials.username, &self.credentials.password)
        }
    }

    /// Map a non-success listing or ping response.
    fn status_error(response: &HttpResponse) -> SkinsApiError {
        match response.status {
            401 | 403 => SkinsApiError::Unauthorized(response.status),
            status => SkinsApiError::ApiError {
                status_code: status,
                message: response
                    .text()
                    .unwrap_or_default()
                    .chars()
                    .take(200)
                    .collect(),
            },
        }
    }

    /// Fetch and parse the full manifest.
    #[instrument(skip(self))]
    pub async fn fetch_manifest(&self) -> crate::Result<Vec<ManifestEntry>> {
        let request = self.request(self.list_url()).timeout(self.timeout);
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;

        if !response.is_success() {
            warn!(status = response.status, "Manifest request failed");
            return Err(Self::status_error(&response));
        }

        let entries: Vec<ManifestEntry> = serde_json::from_slice(&response.body)
            .map_err(|e| SkinsApiError::ParseError(e.to_string()))?;

        debug!(entries = entries.len(), "Manifest fetched");
        Ok(entries)
    }
}

#[async_trait]
impl RemoteInventory for SkinsApiConnector {
    fn transport(&self) -> &'static str {
        "manifest"
    }

    fn endpoint(&self) -> String {
        let mut endpoint = self.base.clone();
        // Userinfo never leaves the connector.
        let _ = endpoint.set_username("");
        let _ = endpoint.set_password(None);
        endpoint.to_string()
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        let request = self.request(self.base.as_str()).timeout(self.timeout);

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::none())
            .await
            .map_err(|e| BridgeError::Connectivity(e.to_string()))?;

        if response.is_success() {
            info!(endpoint = %self.endpoint(), "Skins server reachable");
            Ok(())
        } else {
            Err(BridgeError::Connectivity(format!(
                "Response code {}",
                response.status
            )))
        }
    }

    #[instrument(skip(self), fields(category = %category))]
    async fn list_items(&self, category: Category) -> Result<Vec<RemoteSkin>> {
        let entries = self.fetch_manifest().await?;
        Ok(select(&entries, category))
    }

    /// One manifest request serves every category.
    #[instrument(skip(self))]
    async fn list_categories(
        &self,
        categories: &[Category],
    ) -> Vec<(Category, Result<Vec<RemoteSkin>>)> {
        match self.fetch_manifest().await {
            Ok(entries) => categories
                .iter()
                .map(|&category| (category, Ok(select(&entries, category))))
                .collect(),
            Err(e) => {
                let error = BridgeError::from(e);
                categories
                    .iter()
                    .map(|&category| (category, Err(error.clone())))
                    .collect()
            }
        }
    }

    #[instrument(skip(self, sink, progress), fields(skin = %skin.id))]
    async fn fetch_item(
        &self,
        skin: &RemoteSkin,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &ProgressFn<'_>,
    ) -> Result<u64> {
        let url = self.download_url(skin);
        let mut stream = self.http_client.download_stream(self.request(url)).await?;

        let total = stream.content_length.or(skin.size).unwrap_or(0);
        debug!(total, status = stream.status, "Download started");

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = stream
                .reader
                .read(&mut buffer)
                .await
                .map_err(|e| BridgeError::Transfer(format!("Download interrupted: {}", e)))?;
            if read == 0 {
                break;
            }

            sink.write_all(&buffer[..read]).await?;
            written += read as u64;
            progress(total, read as u64);
        }

        if total > 0 && written < total {
            return Err(BridgeError::Transfer(format!(
                "Download ended early: {} of {} bytes",
                written, total
            )));
        }

        sink.flush().await?;
        info!(bytes = written, "Download finished");
        Ok(written)
    }
}

/// Manifest entries of `category` that name a skin.
fn select(entries: &[ManifestEntry], category: Category) -> Vec<RemoteSkin> {
    let skins: Vec<RemoteSkin> = entries
        .iter()
        .filter(|entry| entry.category() == Some(category))
        .filter_map(|entry| {
            let remote = entry.clone().into_remote();
            if remote.is_none() {
                warn!(entry = %format!("{}/{}", entry.car, entry.skin), "Skipping manifest entry without a skin name");
            }
            remote
        })
        .collect();

    info!(category = %category, listed = skins.len(), manifest = entries.len(), "Listed skins from manifest");
    skins
}

impl std::fmt::Debug for SkinsApiConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkinsApiConnector")
            .field("endpoint", &self.endpoint())
            .field("credentials", &self.credentials)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::HttpStream;
    use bridge_traits::ErrorKind;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse>;
            async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream>;
        }
    }

    const MANIFEST: &str = r#"[
        {"game_id": 2, "league_id": 3, "car": "ks_audi_r8_lms", "skin": "red.zip", "sum": "aa", "timestamp": 1714816800},
        {"game_id": 2, "league_id": 3, "car": "ks_audi_r8_lms", "skin": "blue.zip", "sum": "bb", "timestamp": 1714816800},
        {"game_id": 1, "league_id": 3, "car": "audi_r8_lms_evo", "skin": "green.zip", "sum": "cc", "timestamp": 1714816800},
        {"game_id": 5, "league_id": 3, "car": "unknown", "skin": "x.zip"}
    ]"#;

    fn ok(body: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn status(code: u16) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: code,
            headers: HashMap::new(),
            body: Bytes::from_static(b"nope"),
        })
    }

    fn connector(mock: MockHttpClient) -> SkinsApiConnector {
        SkinsApiConnector::new(
            Arc::new(mock),
            "https://skins.example.com/base",
            Credentials::new("driver", "secret"),
        )
        .unwrap()
    }

    fn skin() -> RemoteSkin {
        ManifestEntry {
            game_id: 2,
            league_id: crate::types::Scalar::Integer(3),
            league_name: None,
            league_color: None,
            car: "ks_audi_r8_lms".to_string(),
            skin: "red team.zip".to_string(),
            sum: None,
            timestamp: None,
            size: None,
            driver: None,
            team: None,
            class: None,
            year: None,
            number: None,
        }
        .into_remote()
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let connector = connector(MockHttpClient::new());

        assert_eq!(connector.list_url(), "https://skins.example.com/base/api/skins/list");
        assert_eq!(
            connector.download_url(&skin()),
            "https://skins.example.com/base/api/skins/3/ks_audi_r8_lms/red%20team.zip/download"
        );
    }

    #[test]
    fn test_invalid_server() {
        let result = SkinsApiConnector::new(
            Arc::new(MockHttpClient::new()),
            "not a url",
            Credentials::default(),
        );
        assert!(matches!(result, Err(SkinsApiError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_list_items_filters_category() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .times(2)
            .returning(|req, policy| {
                assert!(req.url.ends_with("/api/skins/list"));
                assert!(req.headers.get("Authorization").unwrap().starts_with("Basic "));
                assert_eq!(policy.max_attempts, RetryPolicy::default().max_attempts);
                ok(MANIFEST)
            });

        let connector = connector(mock_http);

        let ac = connector.list_items(Category::Ac).await.unwrap();
        assert_eq!(ac.len(), 2);
        assert_eq!(ac[0].id.name, "red");
        assert_eq!(ac[1].change_token.as_deref(), Some("bb"));

        let acc = connector.list_items(Category::Acc).await.unwrap();
        assert_eq!(acc.len(), 1);
        assert_eq!(acc[0].id.display_name(), "green");
    }

    #[tokio::test]
    async fn test_refresh_listing_fetches_manifest_once() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .times(1)
            .returning(|_, _| ok(MANIFEST));

        let listings = connector(mock_http)
            .list_categories(&[Category::Ac, Category::Acc])
            .await;

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].0, Category::Ac);
        assert_eq!(listings[0].1.as_ref().unwrap().len(), 2);
        assert_eq!(listings[1].0, Category::Acc);
        assert_eq!(listings[1].1.as_ref().unwrap()[0].id.display_name(), "green");
    }

    #[tokio::test]
    async fn test_refresh_listing_failure_reaches_every_category() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .times(1)
            .returning(|_, _| status(401));

        let listings = connector(mock_http)
            .list_categories(&[Category::Ac, Category::Acc])
            .await;

        assert_eq!(listings.len(), 2);
        for (_, listing) in listings {
            assert_eq!(listing.unwrap_err().kind(), ErrorKind::Connectivity);
        }
    }

    #[tokio::test]
    async fn test_list_items_unauthorized() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .returning(|_, _| status(401));

        let err = connector(mock_http).list_items(Category::Ac).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_list_items_bad_json() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .returning(|_, _| ok("{\"not\": \"a list\"}"));

        let err = connector(mock_http).list_items(Category::Ac).await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn test_ping() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .times(1)
            .returning(|req, policy| {
                assert_eq!(req.url, "https://skins.example.com/base/");
                assert_eq!(policy.max_attempts, 1);
                ok("")
            });
        connector(mock_http).ping().await.unwrap();

        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .returning(|_, _| status(503));
        let err = connector(mock_http).ping().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);

        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .returning(|_, _| Err(BridgeError::OperationFailed("dns".to_string())));
        let err = connector(mock_http).ping().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_fetch_item_reports_progress() {
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let body = payload.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_download_stream()
            .times(1)
            .returning(move |req| {
                assert!(req.url.ends_with("/download"));
                Ok(HttpStream {
                    status: 200,
                    content_length: Some(body.len() as u64),
                    reader: Box::new(std::io::Cursor::new(body.clone())),
                })
            });

        let calls = Mutex::new(Vec::new());
        let progress = |total: u64, chunk: u64| calls.lock().unwrap().push((total, chunk));

        let mut sink: Vec<u8> = Vec::new();
        let written = connector(mock_http)
            .fetch_item(&skin(), &mut sink, &progress)
            .await
            .unwrap();

        assert_eq!(written, 20_000);
        assert_eq!(sink, payload);

        let calls = calls.into_inner().unwrap();
        assert!(calls.iter().all(|(total, _)| *total == 20_000));
        assert_eq!(calls.iter().map(|(_, chunk)| chunk).sum::<u64>(), 20_000);
    }

    #[tokio::test]
    async fn test_fetch_item_short_body_fails() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_download_stream().returning(|_| {
            Ok(HttpStream {
                status: 200,
                content_length: Some(100),
                reader: Box::new(std::io::Cursor::new(vec![0u8; 10])),
            })
        });

        let mut sink: Vec<u8> = Vec::new();
        let err = connector(mock_http)
            .fetch_item(&skin(), &mut sink, &|_: u64, _: u64| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
    }

    #[tokio::test]
    async fn test_fetch_item_status_error_passes_through() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_download_stream().returning(|_| {
            Err(BridgeError::Transfer(
                "Unable to download, response code 404".to_string(),
            ))
        });

        let mut sink: Vec<u8> = Vec::new();
        let err = connector(mock_http)
            .fetch_item(&skin(), &mut sink, &|_: u64, _: u64| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert!(sink.is_empty());
    }
}
