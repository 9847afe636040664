//! Integration tests for the service façade
//!
//! The remote side is an in-memory inventory; everything local (pool,
//! catalogs, pipeline, backup) is the real implementation on temp dirs.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, HttpStream};
use bridge_traits::{
    BridgeError, Category, ErrorKind, ProgressFn, RemoteInventory, RemoteSkin, SkinDetails, SkinId,
};
use chrono::{TimeZone, Utc};
use core_runtime::config::{SyncConfig, TransportKind};
use core_runtime::events::{CoreEvent, EventReceiver, StatusEvent, SyncCommand};
use core_service::{CoreError, SkinSyncService};
use core_sync::{SkinState, SyncItem};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ============================================================================
// Test Doubles
// ============================================================================

struct OfflineHttp;

#[async_trait]
impl HttpClient for OfflineHttp {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("offline".to_string()))
    }

    async fn download_stream(&self, _request: HttpRequest) -> BridgeResult<HttpStream> {
        Err(BridgeError::NotAvailable("offline".to_string()))
    }
}

#[derive(Default)]
struct MemoryInventory {
    unreachable: bool,
    failing: HashSet<Category>,
    listings: HashMap<Category, Vec<RemoteSkin>>,
    packages: HashMap<SkinId, Vec<u8>>,
}

impl MemoryInventory {
    fn offer(&mut self, skin: RemoteSkin, package: Vec<u8>) {
        self.packages.insert(skin.id.clone(), package);
        self.listings.entry(skin.id.category).or_default().push(skin);
    }
}

#[async_trait]
impl RemoteInventory for MemoryInventory {
    fn transport(&self) -> &'static str {
        "memory"
    }

    fn endpoint(&self) -> String {
        "memory://skins".to_string()
    }

    async fn ping(&self) -> BridgeResult<()> {
        if self.unreachable {
            return Err(BridgeError::Connectivity("connection refused".to_string()));
        }
        Ok(())
    }

    async fn list_items(&self, category: Category) -> BridgeResult<Vec<RemoteSkin>> {
        if self.failing.contains(&category) {
            return Err(BridgeError::Transfer("Response code 500".to_string()));
        }
        Ok(self.listings.get(&category).cloned().unwrap_or_default())
    }

    async fn fetch_item(
        &self,
        skin: &RemoteSkin,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &ProgressFn<'_>,
    ) -> BridgeResult<u64> {
        let bytes = self
            .packages
            .get(&skin.id)
            .ok_or_else(|| BridgeError::Transfer(format!("Response code 404 for {}", skin.id)))?;

        let total = bytes.len() as u64;
        for chunk in bytes.chunks(128) {
            sink.write_all(chunk).await?;
            progress(total, chunk.len() as u64);
        }
        Ok(total)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Dirs {
    _base: TempDir,
    ac_root: PathBuf,
    acc_root: PathBuf,
    backup_dir: PathBuf,
    temp_dir: PathBuf,
}

impl Dirs {
    fn new() -> Self {
        let base = TempDir::new().unwrap();
        let dirs = Self {
            ac_root: base.path().join("ac/content/cars"),
            acc_root: base.path().join("acc"),
            backup_dir: base.path().join("backups"),
            temp_dir: base.path().join("tmp"),
            _base: base,
        };
        for dir in [&dirs.ac_root, &dirs.acc_root, &dirs.temp_dir] {
            std::fs::create_dir_all(dir).unwrap();
        }
        dirs
    }

    fn config(&self) -> SyncConfig {
        SyncConfig::builder()
            .server_url("https://skins.example.com")
            .credentials("driver", "secret")
            .ac_root(&self.ac_root)
            .acc_root(&self.acc_root)
            .backup_dir(&self.backup_dir)
            .temp_dir(&self.temp_dir)
            .worker_count(2)
            .http_client(Arc::new(OfflineHttp))
            .build()
            .unwrap()
    }
}

fn remote(category: Category, car: &str, name: &str) -> RemoteSkin {
    RemoteSkin {
        id: SkinId::new(category, "7", car, name),
        extension: "zip".to_string(),
        modified_at: Some(Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap()),
        change_token: Some(format!("{}-v1", name)),
        size: None,
        details: SkinDetails::default(),
    }
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Two ac skins (one with its car installed, one without) and one acc livery.
fn catalog_inventory() -> MemoryInventory {
    let mut inventory = MemoryInventory::default();
    inventory.offer(
        remote(Category::Ac, "ks_audi_r8_lms", "red"),
        zip_bytes(&[("red/livery.png", "red"), ("red/ui_skin.json", "{}")]),
    );
    inventory.offer(
        remote(Category::Ac, "ks_ferrari_488_gt3", "yellow"),
        zip_bytes(&[("yellow/livery.png", "yellow")]),
    );
    inventory.offer(
        remote(Category::Acc, "porsche_991ii_gt3_r", "team_a"),
        zip_bytes(&[
            ("Customs/Cars/team_a.json", "{\"carModelType\": 25}"),
            ("Customs/Liveries/team_a/decals.png", "decals"),
        ]),
    );
    inventory
}

fn start_service(dirs: &Dirs, inventory: MemoryInventory) -> (SkinSyncService, EventReceiver) {
    SkinSyncService::with_inventory(dirs.config(), Arc::new(inventory)).unwrap()
}

async fn wait_settled(item: &SyncItem) -> SkinState {
    for _ in 0..200 {
        if !item.is_in_flight() {
            return item.state();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("transfer for {} did not settle", item.id());
}

fn status_events(receiver: &mut EventReceiver) -> Vec<StatusEvent> {
    receiver
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CoreEvent::Status(status) => Some(status),
            _ => None,
        })
        .collect()
}

fn exists(root: &Path, relative: &str) -> bool {
    root.join(relative).exists()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_ping_reports_status() {
    let dirs = Dirs::new();
    let (service, mut receiver) = start_service(&dirs, MemoryInventory::default());

    service.ping().await.unwrap();
    assert_eq!(
        status_events(&mut receiver),
        vec![
            StatusEvent::Connecting {
                endpoint: "memory://skins".to_string()
            },
            StatusEvent::Connected {
                endpoint: "memory://skins".to_string()
            },
        ]
    );

    let inventory = MemoryInventory {
        unreachable: true,
        ..Default::default()
    };
    let (service, mut receiver) = start_service(&dirs, inventory);

    let err = service.ping().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    let events = status_events(&mut receiver);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], StatusEvent::ConnectionFailed { .. }));
}

#[tokio::test]
async fn test_refresh_isolates_failing_category() {
    let dirs = Dirs::new();
    let mut inventory = catalog_inventory();
    inventory.failing.insert(Category::Acc);
    let (service, mut receiver) = start_service(&dirs, inventory);

    let report = service.refresh().await;
    assert!(!report.is_complete());
    assert_eq!(report.listed.len(), 1);
    assert_eq!(report.listed[0].0, Category::Ac);
    assert_eq!(report.listed[0].1.added, 2);
    assert_eq!(report.failed, vec![(Category::Acc, ErrorKind::Transfer)]);

    assert_eq!(service.items(Category::Ac).len(), 2);
    assert!(service.items(Category::Acc).is_empty());

    let events = status_events(&mut receiver);
    assert!(events.contains(&StatusEvent::Listed {
        category: Category::Ac,
        count: 2
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::ListingFailed {
            category: Category::Acc,
            kind: ErrorKind::Transfer,
            ..
        }
    )));
}

#[tokio::test]
async fn test_download_all_installs_pending_skins() {
    let dirs = Dirs::new();
    std::fs::create_dir_all(dirs.ac_root.join("ks_audi_r8_lms")).unwrap();
    let (service, _receiver) = start_service(&dirs, catalog_inventory());

    service.refresh().await;
    let red = service
        .item(&SkinId::new(Category::Ac, "7", "ks_audi_r8_lms", "red"))
        .unwrap();
    let yellow = service
        .item(&SkinId::new(Category::Ac, "7", "ks_ferrari_488_gt3", "yellow"))
        .unwrap();
    let team_a = service
        .item(&SkinId::new(Category::Acc, "7", "porsche_991ii_gt3_r", "team_a"))
        .unwrap();

    assert_eq!(red.state(), SkinState::NeedsDownload);
    assert_eq!(yellow.state(), SkinState::MissingParent);
    assert_eq!(team_a.state(), SkinState::NeedsDownload);

    assert_eq!(service.download_all(), 3);

    assert_eq!(wait_settled(&red).await, SkinState::UpToDate);
    assert_eq!(wait_settled(&team_a).await, SkinState::UpToDate);
    assert_eq!(yellow.state(), SkinState::MissingParent);

    assert!(exists(&dirs.ac_root, "ks_audi_r8_lms/skins/red/livery.png"));
    assert!(exists(&dirs.acc_root, "Customs/Cars/team_a.json"));
    assert!(exists(&dirs.acc_root, "Customs/Liveries/team_a/decals.png"));
    assert!(!exists(&dirs.ac_root, "ks_ferrari_488_gt3"));
    assert_eq!(std::fs::read_dir(&dirs.temp_dir).unwrap().count(), 0);

    // Everything is current: nothing to do.
    service.download_all();
    assert!(!red.is_in_flight());
    assert!(!team_a.is_in_flight());

    service.shutdown().await;
    assert_eq!(service.pool_stats().completed, 2);
}

#[tokio::test]
async fn test_download_errors() {
    let dirs = Dirs::new();
    let (service, _receiver) = start_service(&dirs, catalog_inventory());
    service.refresh().await;

    let err = service
        .download(&SkinId::new(Category::Acc, "7", "porsche_991ii_gt3_r", "unlisted"))
        .unwrap_err();
    assert!(matches!(err, CoreError::Sync(_)));

    let config = SyncConfig::builder()
        .server_url("https://skins.example.com")
        .acc_root(&dirs.acc_root)
        .http_client(Arc::new(OfflineHttp))
        .build()
        .unwrap();
    let (acc_only, _rx) =
        SkinSyncService::with_inventory(config, Arc::new(catalog_inventory())).unwrap();

    assert_eq!(acc_only.categories(), vec![Category::Acc]);
    assert!(acc_only.items(Category::Ac).is_empty());
    let err = acc_only
        .download(&SkinId::new(Category::Ac, "7", "ks_audi_r8_lms", "red"))
        .unwrap_err();
    assert!(matches!(err, CoreError::CategoryNotConfigured(Category::Ac)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_dispatch_initialize_lists_after_failed_ping() {
    let dirs = Dirs::new();
    let mut inventory = catalog_inventory();
    inventory.unreachable = true;
    let (service, mut receiver) = start_service(&dirs, inventory);

    service.dispatch(SyncCommand::Initialize).await;

    assert_eq!(service.items(Category::Ac).len(), 2);
    assert_eq!(service.items(Category::Acc).len(), 1);

    let events = status_events(&mut receiver);
    assert!(matches!(events[1], StatusEvent::ConnectionFailed { .. }));
    assert!(events
        .iter()
        .any(|e| matches!(e, StatusEvent::Listed { category: Category::Acc, count: 1 })));
}

#[tokio::test]
async fn test_backup_operations_reclassify_items() {
    let dirs = Dirs::new();
    let (service, _receiver) = start_service(&dirs, catalog_inventory());
    service.refresh().await;

    let id = SkinId::new(Category::Acc, "7", "porsche_991ii_gt3_r", "team_a");
    assert!(service.download(&id).unwrap());
    let team_a = service.item(&id).unwrap();
    assert_eq!(wait_settled(&team_a).await, SkinState::UpToDate);

    let err = service.restore_backup().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArchiveState);
    assert_eq!(team_a.state(), SkinState::UpToDate);

    service.create_backup(false).await.unwrap();

    service.clean_content().await.unwrap();
    assert_eq!(team_a.state(), SkinState::NeedsDownload);

    service.restore_backup().await.unwrap();
    assert!(exists(&dirs.acc_root, "Customs/Liveries/team_a/decals.png"));
    assert_ne!(team_a.state(), SkinState::NeedsDownload);
}

#[tokio::test]
async fn test_shutdown_rejects_new_transfers() {
    let dirs = Dirs::new();
    let (service, _receiver) = start_service(&dirs, catalog_inventory());
    service.refresh().await;
    service.shutdown().await;

    let id = SkinId::new(Category::Acc, "7", "porsche_991ii_gt3_r", "team_a");
    let err = service.download(&id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let item = service.item(&id).unwrap();
    assert_eq!(wait_settled(&item).await, SkinState::NeedsDownload);
}

#[cfg(not(feature = "tree-transport"))]
#[tokio::test]
async fn test_tree_transport_requires_feature() {
    let dirs = Dirs::new();
    let config = SyncConfig::builder()
        .server_url("ftp://skins.example.com/skins")
        .transport(TransportKind::Tree)
        .acc_root(&dirs.acc_root)
        .build()
        .unwrap();

    let err = SkinSyncService::new(config).unwrap_err();
    assert!(matches!(err, CoreError::CapabilityMissing { .. }));
}

#[cfg(feature = "tree-transport")]
#[tokio::test]
async fn test_tree_transport_is_selected() {
    let dirs = Dirs::new();
    let config = SyncConfig::builder()
        .server_url("ftp://skins.example.com/skins")
        .transport(TransportKind::Tree)
        .acc_root(&dirs.acc_root)
        .build()
        .unwrap();

    let (service, _receiver) = SkinSyncService::new(config).unwrap();
    assert_eq!(service.endpoint(), "ftp://skins.example.com:21/skins");
}
