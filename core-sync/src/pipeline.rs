//! # Download-Extract Pipeline
//!
//! Turns one remote package into an installed skin, or into nothing at all.
//!
//! ## Steps
//!
//! 1. Reject packages that cannot be unpacked (only `.zip` is supported)
//! 2. Allocate a named temporary file scoped to the run
//! 3. Stream the package into it, reporting progress once per chunk
//! 4. Flush and close the temporary file
//! 5. Extract into a staging directory next to the item and check that the
//!    skin folder is there
//! 6. Swap the staged item in for the installed one (plus the definition
//!    file for acc, when the package ships one)
//! 7. Stamp the item directory with the completion time
//!
//! The temporary file and the staging directory are deleted on every exit
//! path when their guards drop. Nothing else a package contains is kept.
//!
//! ## Failure Policy
//!
//! - Transfer failures (status, broken stream) leave the target untouched;
//!   extraction never started.
//! - Extraction failures (corrupt archive, missing skin folder) happen in
//!   staging and leave the installed item as it was.
//! - A failed swap removes the item path, so no half-installed skin stays
//!   on disk.

use crate::archive;
use crate::error::{Result, SyncError};
use crate::paths::{remove_path, LocalPaths};
use crate::state::{AppliedMarker, TransferPhase};
use bridge_traits::{Clock, RemoteInventory, RemoteSkin};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Receives phase changes and progress while a transfer runs.
pub trait TransferObserver: Send + Sync {
    fn on_phase(&self, phase: TransferPhase);

    /// Called only when the whole-percent value changes.
    fn on_progress(&self, percent: u8);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn on_phase(&self, _phase: TransferPhase) {}
    fn on_progress(&self, _percent: u8) {}
}

/// Prefix of the per-extraction staging directory.
const STAGING_PREFIX: &str = ".skin-";

// ============================================================================
// Progress
// ============================================================================

const NO_PERCENT: u8 = u8::MAX;

/// Accumulates received bytes and derives a whole percentage.
pub struct ProgressTracker<'a> {
    received: &'a AtomicU64,
    last_percent: AtomicU8,
}

impl<'a> ProgressTracker<'a> {
    /// Resets `received` to zero and starts tracking into it.
    pub fn new(received: &'a AtomicU64) -> Self {
        received.store(0, Ordering::SeqCst);
        Self {
            received,
            last_percent: AtomicU8::new(NO_PERCENT),
        }
    }

    /// Records one chunk; returns the new percentage if it changed.
    ///
    /// A `total` of zero means the size is unknown and nothing is reported.
    pub fn record(&self, total: u64, chunk: u64) -> Option<u8> {
        let received = self.received.fetch_add(chunk, Ordering::SeqCst) + chunk;
        if total == 0 {
            return None;
        }

        let percent = percent_of(received, total);
        let previous = self.last_percent.swap(percent, Ordering::SeqCst);
        (previous != percent).then_some(percent)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }
}

/// `floor(received * 100 / total)`, clamped to 100.
pub fn percent_of(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (received as u128 * 100) / total as u128;
    percent.min(100) as u8
}

// ============================================================================
// Pipeline
// ============================================================================

/// Shared, cloneable pipeline configuration.
#[derive(Clone)]
pub struct Pipeline {
    inventory: Arc<dyn RemoteInventory>,
    clock: Arc<dyn Clock>,
    temp_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(
        inventory: Arc<dyn RemoteInventory>,
        clock: Arc<dyn Clock>,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            inventory,
            clock,
            temp_dir,
        }
    }

    pub fn inventory(&self) -> &Arc<dyn RemoteInventory> {
        &self.inventory
    }

    /// Runs the full download-extract sequence for `remote`.
    ///
    /// `received` is the item's byte counter; it is reset at the start.
    /// Returns the freshness marker to remember as "last applied".
    #[instrument(skip_all, fields(skin = %remote.id, transport = self.inventory.transport()))]
    pub async fn run(
        &self,
        remote: &RemoteSkin,
        paths: &LocalPaths,
        received: &AtomicU64,
        observer: &dyn TransferObserver,
    ) -> Result<AppliedMarker> {
        if !archive::is_supported(&remote.extension) {
            return Err(SyncError::UnsupportedPackage(remote.extension.clone()));
        }

        let package = self.download(remote, received, observer).await?;

        observer.on_phase(TransferPhase::Extracting);
        let files = self.apply(&package, paths).await?;

        info!(files, bytes = received.load(Ordering::SeqCst), "Skin installed");
        Ok(AppliedMarker::from_remote(remote))
    }

    async fn download(
        &self,
        remote: &RemoteSkin,
        received: &AtomicU64,
        observer: &dyn TransferObserver,
    ) -> Result<NamedTempFile> {
        let package = self.temp_file(&remote.extension)?;
        let mut sink = tokio::fs::File::from_std(package.reopen()?);

        let tracker = ProgressTracker::new(received);
        let progress = |total: u64, chunk: u64| {
            if let Some(percent) = tracker.record(total, chunk) {
                observer.on_progress(percent);
            }
        };

        observer.on_phase(TransferPhase::Downloading { percent: 0 });
        let bytes = self.inventory.fetch_item(remote, &mut sink, &progress).await?;

        sink.flush().await?;
        sink.sync_all().await?;
        drop(sink);

        debug!(bytes, received = tracker.received(), path = %package.path().display(), "Package downloaded");
        Ok(package)
    }

    fn temp_file(&self, extension: &str) -> Result<NamedTempFile> {
        let suffix = format!(".{}", extension);
        let mut builder = tempfile::Builder::new();
        builder.prefix("skin-").suffix(&suffix);

        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }

    async fn apply(&self, package: &NamedTempFile, paths: &LocalPaths) -> Result<usize> {
        let archive_path = package.path().to_path_buf();
        let task_paths = paths.clone();
        let clock = Arc::clone(&self.clock);

        tokio::task::spawn_blocking(move || {
            let outcome = extract_item(&archive_path, &task_paths, clock.as_ref());
            if let Err(err) = &outcome {
                warn!(error = %err, target = %task_paths.item_path.display(), "Extraction failed");
            }
            outcome
        })
        .await
        .map_err(|e| {
            SyncError::extraction(&paths.extract_target, format!("extraction task aborted: {}", e))
        })?
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("transport", &self.inventory.transport())
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

fn extract_item(archive_path: &Path, paths: &LocalPaths, clock: &dyn Clock) -> Result<usize> {
    let parent = paths.staging_parent();
    fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)?;

    let files = archive::extract_zip(archive_path, staging.path())?;

    let staged_item = paths
        .staged_item(staging.path())
        .filter(|staged| staged.is_dir())
        .ok_or_else(|| {
            SyncError::extraction(&paths.item_path, "package does not contain the skin folder")
        })?;

    if let Err(err) = install_staged(&staged_item, staging.path(), paths) {
        if let Err(cleanup) = remove_path(&paths.item_path) {
            warn!(error = %cleanup, path = %paths.item_path.display(), "Failed to remove partial install");
        }
        return Err(err);
    }

    let completed = FileTime::from_system_time(SystemTime::from(clock.now()));
    filetime::set_file_mtime(&paths.item_path, completed)?;

    Ok(files)
}

/// Moves the staged item over the installed one.
///
/// The acc definition file is replaced only when the package carries it.
fn install_staged(staged_item: &Path, staging: &Path, paths: &LocalPaths) -> Result<()> {
    remove_path(&paths.item_path)?;
    if let Some(parent) = paths.item_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(staged_item, &paths.item_path)?;

    if let Some(definition) = paths.staged_definition(staging).filter(|p| p.is_file()) {
        if let Some(parent) = paths.container.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&definition, &paths.container)?;
    }

    debug!(item = %paths.item_path.display(), "Staged item installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 200), 0);
        assert_eq!(percent_of(1, 200), 0);
        assert_eq!(percent_of(2, 200), 1);
        assert_eq!(percent_of(199, 200), 99);
        assert_eq!(percent_of(200, 200), 100);
        assert_eq!(percent_of(500, 200), 100);
        assert_eq!(percent_of(10, 0), 0);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_tracker_reports_changes_only() {
        let counter = AtomicU64::new(42);
        let tracker = ProgressTracker::new(&counter);
        assert_eq!(tracker.received(), 0);

        assert_eq!(tracker.record(1000, 4), Some(0));
        assert_eq!(tracker.record(1000, 4), None);
        assert_eq!(tracker.record(1000, 500), Some(50));
        assert_eq!(tracker.record(1000, 492), Some(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_tracker_unknown_total() {
        let counter = AtomicU64::new(0);
        let tracker = ProgressTracker::new(&counter);

        assert_eq!(tracker.record(0, 10), None);
        assert_eq!(tracker.record(0, 10), None);
        assert_eq!(tracker.received(), 20);
    }
}
