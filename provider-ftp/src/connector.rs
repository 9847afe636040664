//! FTP tree connector implementation
//!
//! Implements the `RemoteInventory` trait by walking
//! `{root}/{category}/{group}/{car}/{skin file}` on an FTP server.
//!
//! ## Overview
//!
//! FTP sessions are blocking, so every operation opens its own session on a
//! `spawn_blocking` thread. Downloads hand chunks back to the async side over
//! a bounded channel, where they are written to the caller's sink and counted
//! for progress.
//!
//! Modification times come from `MLSD` facts, which carry no zone. They are
//! interpreted with a single fixed offset taken from configuration; daylight
//! saving is not applied.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::inventory::{
    split_file_name, Category, ProgressFn, RemoteInventory, RemoteSkin, SkinDetails, SkinId,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use core_runtime::config::SyncConfig;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::error::FtpError;
use crate::session::{DirEntry, SessionFactory, SuppaFtpFactory, TreeSession};

const DEFAULT_FTP_PORT: u16 = 21;

/// Chunks buffered between the session thread and the sink
const CHANNEL_DEPTH: usize = 16;

enum Transfer {
    Size(u64),
    Data(Vec<u8>),
}

/// Layout of the category trees on the server.
#[derive(Debug, Clone)]
struct TreeLayout {
    /// Server path holding the `ac/` and `acc/` trees, without trailing slash
    root: String,

    /// Zone of the server's `modify` facts
    offset: FixedOffset,
}

impl TreeLayout {
    fn category_path(&self, category: Category) -> String {
        format!("{}/{}", self.root, category.as_str())
    }

    fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Walks `{category}/{group}/{car}`. Only an unreadable category root
    /// fails the listing; unreadable subdirectories are skipped.
    fn walk(&self, session: &mut dyn TreeSession, category: Category) -> crate::Result<Vec<RemoteSkin>> {
        let category_path = self.category_path(category);
        let groups = session.list_dir(&category_path)?;

        let mut skins = Vec::new();
        for group in groups.iter().filter(|e| is_child_dir(e)) {
            let group_path = format!("{}/{}", category_path, group.name);
            let cars = match session.list_dir(&group_path) {
                Ok(cars) => cars,
                Err(e) => {
                    warn!(path = %group_path, error = %e, "Skipping unreadable group directory");
                    continue;
                }
            };

            for car in cars.iter().filter(|e| is_child_dir(e)) {
                let car_path = format!("{}/{}", group_path, car.name);
                let files = match session.list_dir(&car_path) {
                    Ok(files) => files,
                    Err(e) => {
                        warn!(path = %car_path, error = %e, "Skipping unreadable car directory");
                        continue;
                    }
                };

                skins.extend(
                    files
                        .iter()
                        .filter(|e| !e.is_dir())
                        .filter_map(|file| self.remote_skin(category, &group.name, &car.name, file)),
                );
            }
        }

        Ok(skins)
    }

    fn remote_skin(
        &self,
        category: Category,
        group: &str,
        car: &str,
        file: &DirEntry,
    ) -> Option<RemoteSkin> {
        let (name, extension) = split_file_name(&file.name);
        if name.is_empty() {
            return None;
        }

        Some(RemoteSkin {
            id: SkinId::new(category, group, car, name),
            extension: extension.to_ascii_lowercase(),
            modified_at: file.modified.and_then(|local| self.to_utc(local)),
            change_token: None,
            size: file.size,
            details: SkinDetails::default(),
        })
    }
}

/// FTP directory-tree connector
///
/// # Example
///
/// ```ignore
/// use provider_ftp::FtpConnector;
/// use bridge_traits::{Category, RemoteInventory};
///
/// let connector = FtpConnector::from_config(&config)?;
/// let skins = connector.list_items(Category::Acc).await?;
/// ```
pub struct FtpConnector {
    factory: Arc<dyn SessionFactory>,
    layout: TreeLayout,
    endpoint: String,
}

impl FtpConnector {
    /// Create a connector over an arbitrary session factory.
    ///
    /// # Arguments
    ///
    /// * `factory` - Opens one logged-in session per operation
    /// * `root` - Server directory containing the category trees (`""` for `/`)
    /// * `utc_offset_minutes` - Fixed offset of server timestamps
    /// * `endpoint` - Label for logs, without credentials
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        root: &str,
        utc_offset_minutes: i32,
        endpoint: impl Into<String>,
    ) -> crate::Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            FtpError::InvalidEndpoint(format!(
                "UTC offset of {} minutes is out of range",
                utc_offset_minutes
            ))
        })?;

        Ok(Self {
            factory,
            layout: TreeLayout {
                root: root.trim_end_matches('/').to_string(),
                offset,
            },
            endpoint: endpoint.into(),
        })
    }

    /// Build a suppaftp-backed connector from validated configuration.
    pub fn from_config(config: &SyncConfig) -> crate::Result<Self> {
        let url = &config.server_url;
        if url.scheme() != "ftp" {
            return Err(FtpError::InvalidEndpoint(format!(
                "expected ftp:// URL, got {}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FtpError::InvalidEndpoint("missing host".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(DEFAULT_FTP_PORT);

        let factory = SuppaFtpFactory::new(
            host,
            port,
            config.credentials.clone(),
            config.request_timeout,
        );

        Self::new(
            Arc::new(factory),
            url.path(),
            config.server_utc_offset_minutes,
            format!("ftp://{}:{}{}", host, port, url.path()),
        )
    }

    /// Server path of a category tree.
    pub fn category_path(&self, category: Category) -> String {
        self.layout.category_path(category)
    }

    /// Server path of one skin package.
    pub fn item_path(&self, skin: &RemoteSkin) -> String {
        format!(
            "{}/{}/{}/{}",
            self.layout.category_path(skin.id.category),
            skin.id.group,
            skin.id.content,
            skin.file_name()
        )
    }

    /// Converts a server wall-clock time with the configured offset.
    pub fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.layout.to_utc(local)
    }

    /// Starts `job` on a fresh session on the blocking pool.
    fn spawn_session<T, F>(&self, job: F) -> JoinHandle<crate::Result<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TreeSession) -> crate::Result<T> + Send + 'static,
    {
        let factory = Arc::clone(&self.factory);
        tokio::task::spawn_blocking(move || {
            let mut session = factory.connect()?;
            let result = job(session.as_mut());
            session.quit();
            result
        })
    }

    async fn run_session<T, F>(&self, job: F) -> crate::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TreeSession) -> crate::Result<T> + Send + 'static,
    {
        join(self.spawn_session(job).await)
    }
}

fn join<T>(joined: std::result::Result<crate::Result<T>, JoinError>) -> crate::Result<T> {
    joined.map_err(|e| FtpError::Task(e.to_string()))?
}

fn is_child_dir(entry: &DirEntry) -> bool {
    entry.is_dir() && entry.name != "." && entry.name != ".."
}

/// Runs on the session thread: size probe, then `RETR` chunk by chunk.
fn stream_file(
    session: &mut dyn TreeSession,
    path: &str,
    size_hint: Option<u64>,
    tx: &mpsc::Sender<Transfer>,
) -> crate::Result<u64> {
    let total = session.size(path)?.or(size_hint).unwrap_or(0);
    // A closed receiver surfaces below as a failed chunk send.
    let _ = tx.blocking_send(Transfer::Size(total));

    session.retrieve(path, &mut |bytes: &[u8]| {
        tx.blocking_send(Transfer::Data(bytes.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "download receiver closed"))
    })
}

fn transfer_error(error: FtpError) -> BridgeError {
    match BridgeError::from(error) {
        BridgeError::Connectivity(msg) => BridgeError::Transfer(msg),
        other => other,
    }
}

#[async_trait]
impl RemoteInventory for FtpConnector {
    fn transport(&self) -> &'static str {
        "tree"
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        self.run_session(|_| Ok(()))
            .await
            .map_err(|e| BridgeError::Connectivity(e.to_string()))?;

        info!(endpoint = %self.endpoint, "FTP server reachable");
        Ok(())
    }

    #[instrument(skip(self), fields(category = %category))]
    async fn list_items(&self, category: Category) -> Result<Vec<RemoteSkin>> {
        let layout = self.layout.clone();
        let skins = self
            .run_session(move |session| layout.walk(session, category))
            .await?;

        info!(listed = skins.len(), "Listed skins from directory tree");
        Ok(skins)
    }

    #[instrument(skip(self, sink, progress), fields(skin = %skin.id))]
    async fn fetch_item(
        &self,
        skin: &RemoteSkin,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &ProgressFn<'_>,
    ) -> Result<u64> {
        let path = self.item_path(skin);
        let size_hint = skin.size;
        let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);

        debug!(path = %path, "Download started");
        let task = {
            let path = path.clone();
            self.spawn_session(move |session| stream_file(session, &path, size_hint, &tx))
        };

        let mut total = 0u64;
        let mut written = 0u64;
        while let Some(message) = rx.recv().await {
            match message {
                Transfer::Size(size) => total = size,
                Transfer::Data(bytes) => {
                    sink.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                    progress(total, bytes.len() as u64);
                }
            }
        }

        let retrieved = join(task.await).map_err(transfer_error)?;
        if written != retrieved || (total > 0 && written < total) {
            return Err(BridgeError::Transfer(format!(
                "Download ended early: {} of {} bytes",
                written,
                total.max(retrieved)
            )));
        }

        sink.flush().await?;
        info!(bytes = written, path = %path, "Download finished");
        Ok(written)
    }
}

impl std::fmt::Debug for FtpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpConnector")
            .field("endpoint", &self.endpoint)
            .field("layout", &self.layout)
            .finish()
    }
}
