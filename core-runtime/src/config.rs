//! # Core Configuration Module
//!
//! Provides configuration management for the skin sync engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `SyncConfig`
//! holding the values the host application has already collected from its
//! settings screen: server URL, credentials, transport kind, per-game content
//! directories and the backup destination. Loading those values from disk is
//! the host's job; this module only validates them and fails fast with an
//! actionable message.
//!
//! ## Required Values
//!
//! - Server URL (`http(s)://` for the manifest transport, `ftp://` for the tree transport)
//! - At least one content root (`ac_root` or `acc_root`)
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - HTTP operations for the manifest transport (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled, the reqwest-backed client is
//! injected automatically if none was provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{SyncConfig, TransportKind};
//!
//! let config = SyncConfig::builder()
//!     .server_url("https://skins.example.com")
//!     .credentials("driver", "secret")
//!     .transport(TransportKind::Manifest)
//!     .ac_root("C:/Steam/steamapps/common/assettocorsa/content/cars")
//!     .acc_root("C:/Users/me/Documents/Assetto Corsa Competizione")
//!     .backup_dir("D:/backups/acc")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::SyncConfig;
//!
//! // No content root configured
//! let config = SyncConfig::builder()
//!     .server_url("https://skins.example.com")
//!     .build()
//!     .expect("Should fail - no content root");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Category, HttpClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default number of pool workers.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default server offset for tree-listing timestamps (UTC+1).
pub const DEFAULT_SERVER_UTC_OFFSET_MINUTES: i32 = 60;

const MAX_WORKER_COUNT: usize = 64;
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Remote listing mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Single JSON manifest request (`GET /api/skins/list`)
    #[default]
    Manifest,
    /// FTP directory traversal
    Tree,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Manifest => "manifest",
            TransportKind::Tree => "tree",
        }
    }
}

/// Server credentials.
///
/// `Debug` never prints the password.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Anonymous login is used when no username was configured.
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Validated engine configuration.
///
/// Use [`SyncConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SyncConfig {
    /// Content server base URL
    pub server_url: Url,

    /// Credentials sent with every request
    pub credentials: Credentials,

    /// Which transport lists and fetches skins
    pub transport: TransportKind,

    /// Assetto Corsa `content/cars` directory
    pub ac_root: Option<PathBuf>,

    /// Assetto Corsa Competizione documents directory (contains `Customs/`)
    pub acc_root: Option<PathBuf>,

    /// Directory holding `backup.zip`; may be empty, in which case backup
    /// operations fail with a configuration error
    pub backup_dir: PathBuf,

    /// Number of pool workers
    pub worker_count: usize,

    /// Fixed UTC offset applied to tree-listing timestamps (no DST)
    pub server_utc_offset_minutes: i32,

    /// Timeout for connection setup and listing requests
    pub request_timeout: Duration,

    /// Directory for temporary package files (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,

    /// HTTP client used by the manifest transport
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("server_url", &self.server_url.as_str())
            .field("credentials", &self.credentials)
            .field("transport", &self.transport)
            .field("ac_root", &self.ac_root)
            .field("acc_root", &self.acc_root)
            .field("backup_dir", &self.backup_dir)
            .field("worker_count", &self.worker_count)
            .field("server_utc_offset_minutes", &self.server_utc_offset_minutes)
            .field("request_timeout", &self.request_timeout)
            .field("temp_dir", &self.temp_dir)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .finish()
    }
}

impl SyncConfig {
    /// Creates a new builder for constructing a `SyncConfig`.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Content root configured for `category`, if any.
    pub fn content_root(&self, category: Category) -> Option<&Path> {
        match category {
            Category::Ac => self.ac_root.as_deref(),
            Category::Acc => self.acc_root.as_deref(),
        }
    }

    /// Categories that have a content root configured, in display order.
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.content_root(*c).is_some())
            .collect()
    }

    /// Server URL as a string without a trailing slash.
    pub fn server_base(&self) -> String {
        self.server_url.as_str().trim_end_matches('/').to_string()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The URL scheme matches the transport
    /// - At least one content root is configured and no root is empty
    /// - Worker count is within 1..=64
    /// - The server UTC offset is within +-14h
    /// - A manifest transport has an HTTP client
    pub fn validate(&self) -> Result<()> {
        let scheme = self.server_url.scheme();
        match self.transport {
            TransportKind::Manifest if scheme != "http" && scheme != "https" => {
                return Err(Error::Config(format!(
                    "Manifest transport requires an http(s) server URL, got '{}'",
                    scheme
                )));
            }
            TransportKind::Tree if scheme != "ftp" => {
                return Err(Error::Config(format!(
                    "Tree transport requires an ftp:// server URL, got '{}'",
                    scheme
                )));
            }
            _ => {}
        }

        if self.server_url.host_str().map_or(true, str::is_empty) {
            return Err(Error::Config("Server URL has no host".to_string()));
        }

        if self.ac_root.is_none() && self.acc_root.is_none() {
            return Err(Error::Config(
                "No content directory configured. Set ac_root and/or acc_root.".to_string(),
            ));
        }

        for (label, root) in [("ac_root", &self.ac_root), ("acc_root", &self.acc_root)] {
            if root.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                return Err(Error::Config(format!("{} cannot be empty", label)));
            }
        }

        if self.worker_count == 0 {
            return Err(Error::Config(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if self.worker_count > MAX_WORKER_COUNT {
            return Err(Error::Config(format!(
                "Worker count exceeds maximum of {}",
                MAX_WORKER_COUNT
            )));
        }

        if self.server_utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(Error::Config(format!(
                "Server UTC offset {} minutes is out of range",
                self.server_utc_offset_minutes
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.transport == TransportKind::Manifest && self.http_client.is_none() {
            return Err(http_client_missing_error());
        }

        Ok(())
    }
}

fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "The manifest transport needs an HttpClient. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient, \
                 or inject an implementation with .http_client()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`SyncConfig`] instances.
#[derive(Default)]
pub struct SyncConfigBuilder {
    server_url: Option<String>,
    credentials: Credentials,
    transport: TransportKind,
    ac_root: Option<PathBuf>,
    acc_root: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    worker_count: Option<usize>,
    server_utc_offset_minutes: Option<i32>,
    request_timeout: Option<Duration>,
    temp_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl SyncConfigBuilder {
    /// Sets the content server URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::SyncConfig;
    ///
    /// let builder = SyncConfig::builder()
    ///     .server_url("https://skins.example.com");
    /// ```
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Sets the username and password sent with every request.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Selects the listing transport.
    ///
    /// Default: [`TransportKind::Manifest`]
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the Assetto Corsa `content/cars` directory.
    pub fn ac_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ac_root = Some(path.into());
        self
    }

    /// Sets the Assetto Corsa Competizione documents directory.
    pub fn acc_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.acc_root = Some(path.into());
        self
    }

    /// Sets the directory holding `backup.zip`.
    pub fn backup_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.backup_dir = Some(path.into());
        self
    }

    /// Sets the number of pool workers.
    ///
    /// Default: 5
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Sets the fixed UTC offset used to interpret tree-listing timestamps.
    ///
    /// Default: +60 minutes. Daylight saving is not applied.
    pub fn server_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.server_utc_offset_minutes = Some(minutes);
        self
    }

    /// Sets the timeout for connection setup and listing requests.
    ///
    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Overrides the directory used for temporary package files.
    pub fn temp_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the final `SyncConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(SyncConfig)` on success, or an error if:
    /// - The server URL is missing or unparsable
    /// - No HTTP client is available for the manifest transport
    /// - Any value fails [`SyncConfig::validate`]
    pub fn build(self) -> Result<SyncConfig> {
        let raw_url = self
            .server_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("Server URL is required. Use .server_url() to set it.".to_string())
            })?;

        let server_url = Url::parse(raw_url.trim())
            .map_err(|e| Error::Config(format!("Invalid server URL '{}': {}", raw_url, e)))?;

        let request_timeout = self.request_timeout.unwrap_or(Duration::from_secs(30));

        let http_client = match (self.http_client, self.transport) {
            (Some(client), _) => Some(client),
            (None, TransportKind::Manifest) => Some(provide_default_http_client(request_timeout)?),
            (None, TransportKind::Tree) => None,
        };

        let config = SyncConfig {
            server_url,
            credentials: self.credentials,
            transport: self.transport,
            ac_root: self.ac_root,
            acc_root: self.acc_root,
            backup_dir: self.backup_dir.unwrap_or_default(),
            worker_count: self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
            server_utc_offset_minutes: self
                .server_utc_offset_minutes
                .unwrap_or(DEFAULT_SERVER_UTC_OFFSET_MINUTES),
            request_timeout,
            temp_dir: self.temp_dir,
            http_client,
        };

        config.validate()?;

        Ok(config)
    }
}
