//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`SyncConfig`] into the engine: it picks the
//! remote transport, starts the worker pool, builds one [`SkinCatalog`] per
//! configured game and the [`BackupManager`]. [`SkinSyncService`] is the only
//! surface the presentation layer talks to; everything it needs to display
//! arrives through the [`EventReceiver`] returned at construction.
//!
//! Desktop apps enable the `desktop-shims` feature for the reqwest-backed
//! HTTP client. The FTP tree transport is behind `tree-transport`.

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::{Category, Clock, ErrorKind, RemoteInventory, SkinId, SystemClock};
use core_backup::{BackupManager, BackupOutcome, OverwriteConfirmation};
use core_runtime::config::{SyncConfig, TransportKind};
use core_runtime::events::{
    event_channel, CommandDispatcher, CoreEvent, EventReceiver, EventSender, StatusEvent,
    SyncCommand,
};
use core_runtime::{PoolStats, WorkerPool};
use core_sync::{ListingDiff, Pipeline, SkinCatalog, SyncContext, SyncItem};
use provider_skins_api::SkinsApiConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of one [`SkinSyncService::refresh`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub listed: Vec<(Category, ListingDiff)>,
    pub failed: Vec<(Category, ErrorKind)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Primary façade exposed to host applications.
pub struct SkinSyncService {
    config: SyncConfig,
    inventory: Arc<dyn RemoteInventory>,
    pool: WorkerPool,
    events: EventSender,
    dispatcher: CommandDispatcher,
    catalogs: Vec<SkinCatalog>,
    backup: BackupManager,
}

impl SkinSyncService {
    /// Build the service with the transport selected by `config.transport`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: SyncConfig) -> Result<(Self, EventReceiver)> {
        let inventory = build_inventory(&config)?;
        Self::with_inventory(config, inventory)
    }

    /// Build the service around an already constructed transport.
    pub fn with_inventory(
        config: SyncConfig,
        inventory: Arc<dyn RemoteInventory>,
    ) -> Result<(Self, EventReceiver)> {
        Self::with_components(config, inventory, Arc::new(SystemClock))
    }

    /// Build the service with an explicit transport and clock.
    pub fn with_components(
        config: SyncConfig,
        inventory: Arc<dyn RemoteInventory>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, EventReceiver)> {
        config.validate()?;

        let pool = WorkerPool::new(config.worker_count)?;
        let (events, receiver) = event_channel();
        let dispatcher = CommandDispatcher::new();

        let pipeline = Pipeline::new(Arc::clone(&inventory), clock, config.temp_dir.clone());
        let context = Arc::new(SyncContext::new(pool.clone(), events.clone(), pipeline));

        let catalogs = config
            .categories()
            .into_iter()
            .filter_map(|category| {
                config.content_root(category).map(|root| {
                    SkinCatalog::new(category, root, Arc::clone(&context), dispatcher.clone())
                })
            })
            .collect();

        let backup = BackupManager::from_config(&config, events.clone());

        info!(
            transport = inventory.transport(),
            endpoint = %inventory.endpoint(),
            categories = ?config.categories(),
            workers = config.worker_count,
            "Skin sync service initialized"
        );

        Ok((
            Self {
                config,
                inventory,
                pool,
                events,
                dispatcher,
                catalogs,
                backup,
            },
            receiver,
        ))
    }

    /// Register the prompt consulted before an existing backup is replaced.
    pub fn with_overwrite_confirmation(mut self, confirmation: Arc<dyn OverwriteConfirmation>) -> Self {
        self.backup = self.backup.with_confirmation(confirmation);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        self.inventory.endpoint()
    }

    /// Categories with a configured content root.
    pub fn categories(&self) -> Vec<Category> {
        self.catalogs.iter().map(SkinCatalog::category).collect()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ========================================================================
    // Remote
    // ========================================================================

    /// Check that the server is reachable and accepts the credentials.
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<()> {
        let endpoint = self.inventory.endpoint();
        self.emit_status(StatusEvent::Connecting {
            endpoint: endpoint.clone(),
        });

        match self.inventory.ping().await {
            Ok(()) => {
                self.emit_status(StatusEvent::Connected { endpoint });
                Ok(())
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Server not reachable");
                self.emit_status(StatusEvent::ConnectionFailed {
                    endpoint,
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Ping, then list every category. A failed ping does not skip listing.
    pub async fn initialize(&self) -> RefreshReport {
        if let Err(e) = self.ping().await {
            warn!(error = %e, "Continuing with listing after failed ping");
        }
        self.refresh().await
    }

    /// List every configured category and reconcile the catalogs.
    ///
    /// A failing category keeps its current items and does not stop the
    /// others.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        let listings = self.inventory.list_categories(&self.categories()).await;

        for (category, listing) in listings {
            let Some(catalog) = self.catalog(category) else {
                continue;
            };
            match listing {
                Ok(records) => {
                    let diff = catalog.apply_listing(records);
                    self.emit_status(StatusEvent::Listed {
                        category,
                        count: catalog.len(),
                    });
                    report.listed.push((category, diff));
                }
                Err(e) => {
                    warn!(category = %category, error = %e, "Listing failed");
                    self.emit_status(StatusEvent::ListingFailed {
                        category,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    report.failed.push((category, e.kind()));
                }
            }
        }

        report
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Items of `category` in identity order; empty when not configured.
    pub fn items(&self, category: Category) -> Vec<Arc<SyncItem>> {
        self.catalog(category)
            .map(SkinCatalog::items)
            .unwrap_or_default()
    }

    pub fn item(&self, id: &SkinId) -> Option<Arc<SyncItem>> {
        self.catalog(id.category).and_then(|catalog| catalog.get(id))
    }

    /// Queue a transfer for one skin. `Ok(false)` when nothing was queued
    /// (parent missing or a transfer already running).
    pub fn download(&self, id: &SkinId) -> Result<bool> {
        let catalog = self
            .catalog(id.category)
            .ok_or(CoreError::CategoryNotConfigured(id.category))?;
        Ok(catalog.download(id)?)
    }

    /// Transfer every skin that needs a download or an update.
    ///
    /// Returns the number of items notified.
    pub fn download_all(&self) -> usize {
        self.publish(SyncCommand::DownloadAll)
    }

    /// Re-apply every installable skin from scratch.
    ///
    /// Returns the number of items notified.
    pub fn recreate_all(&self) -> usize {
        self.publish(SyncCommand::RecreateAll)
    }

    /// Handle a command coming from the presentation layer.
    pub async fn dispatch(&self, command: SyncCommand) {
        match command {
            SyncCommand::Initialize => {
                self.initialize().await;
            }
            SyncCommand::Refresh => {
                self.refresh().await;
            }
            SyncCommand::DownloadAll | SyncCommand::RecreateAll => {
                self.publish(command);
            }
        }
    }

    // ========================================================================
    // Backup
    // ========================================================================

    pub fn backup(&self) -> &BackupManager {
        &self.backup
    }

    pub async fn ensure_backup_destination(&self) -> Result<PathBuf> {
        Ok(self.backup.ensure_destination().await?)
    }

    pub async fn create_backup(&self, overwrite_confirmed: bool) -> Result<BackupOutcome> {
        Ok(self.backup.create_backup(overwrite_confirmed).await?)
    }

    /// Restore `backup.zip` and reclassify every item from disk.
    pub async fn restore_backup(&self) -> Result<PathBuf> {
        let result = self.backup.restore_backup().await;
        self.refresh_local();
        Ok(result?)
    }

    /// Empty the acc content subtrees and reclassify every item.
    ///
    /// Destructive; the caller confirms with the user first.
    pub async fn clean_content(&self) -> Result<()> {
        let result = self.backup.clean_content(true).await;
        self.refresh_local();
        Ok(result?)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop accepting transfers and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!(stats = ?self.pool.stats(), "Skin sync service stopped");
    }

    fn catalog(&self, category: Category) -> Option<&SkinCatalog> {
        self.catalogs.iter().find(|c| c.category() == category)
    }

    fn refresh_local(&self) {
        for catalog in &self.catalogs {
            catalog.refresh_local();
        }
    }

    fn publish(&self, command: SyncCommand) -> usize {
        let notified = self.dispatcher.publish(command);
        info!(?command, notified, "Command published");
        notified
    }

    fn emit_status(&self, event: StatusEvent) {
        let _ = self.events.emit(CoreEvent::Status(event));
    }
}

impl std::fmt::Debug for SkinSyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkinSyncService")
            .field("transport", &self.inventory.transport())
            .field("endpoint", &self.inventory.endpoint())
            .field("categories", &self.categories())
            .field("pool", &self.pool)
            .finish()
    }
}

fn build_inventory(config: &SyncConfig) -> Result<Arc<dyn RemoteInventory>> {
    match config.transport {
        TransportKind::Manifest => {
            let connector = SkinsApiConnector::from_config(config).map_err(bridge_traits::BridgeError::from)?;
            Ok(Arc::new(connector))
        }
        TransportKind::Tree => tree_inventory(config),
    }
}

#[cfg(feature = "tree-transport")]
fn tree_inventory(config: &SyncConfig) -> Result<Arc<dyn RemoteInventory>> {
    let connector =
        provider_ftp::FtpConnector::from_config(config).map_err(bridge_traits::BridgeError::from)?;
    Ok(Arc::new(connector))
}

#[cfg(not(feature = "tree-transport"))]
fn tree_inventory(_config: &SyncConfig) -> Result<Arc<dyn RemoteInventory>> {
    Err(CoreError::CapabilityMissing {
        capability: "tree-transport".to_string(),
        message: "FTP listing is not compiled in. Enable the 'tree-transport' feature.".to_string(),
    })
}
