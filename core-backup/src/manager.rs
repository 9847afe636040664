//! Backup, restore and clean over the acc `Customs/` tree.
//!
//! ## Archive layout
//!
//! ```text
//! backup.zip
//! ├── Customs/Cars/...        <- {acc_root}/Customs/Cars/...
//! └── Customs/Liveries/...    <- {acc_root}/Customs/Liveries/...
//! ```
//!
//! Entry names are relative to the acc root, so restoring is a plain
//! extraction over that directory once both subtrees have been cleaned. An
//! archive is checked before anything is cleaned: it must open and every
//! entry must live under `Customs/`.

use crate::error::{BackupError, Result};
use async_trait::async_trait;
use core_runtime::config::SyncConfig;
use core_runtime::events::{BackupEvent, CoreEvent, EventSender};
use core_sync::archive::extract_zip;
use core_sync::paths::{CARS_DIR, CUSTOMS_DIR, LIVERIES_DIR};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// File name of the archive inside the backup directory.
pub const ARCHIVE_NAME: &str = "backup.zip";

/// The two subtrees of `Customs/` that are backed up.
pub const SUBTREES: [&str; 2] = [CARS_DIR, LIVERIES_DIR];

/// Asks the user whether an existing archive may be replaced.
#[async_trait]
pub trait OverwriteConfirmation: Send + Sync {
    async fn confirm_overwrite(&self, archive: &Path) -> bool;
}

/// Declines every overwrite; used when the host registers no prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineOverwrite;

#[async_trait]
impl OverwriteConfirmation for DeclineOverwrite {
    async fn confirm_overwrite(&self, _archive: &Path) -> bool {
        false
    }
}

/// Result of [`BackupManager::create_backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created { path: PathBuf, files: usize },
    /// An archive already existed and overwriting it was declined.
    Declined { path: PathBuf },
}

pub struct BackupManager {
    destination: PathBuf,
    /// acc documents directory holding `Customs/`, when acc is configured
    acc_root: Option<PathBuf>,
    events: EventSender,
    confirmation: Arc<dyn OverwriteConfirmation>,
}

impl BackupManager {
    pub fn new(destination: impl Into<PathBuf>, acc_root: Option<&Path>, events: EventSender) -> Self {
        Self {
            destination: destination.into(),
            acc_root: acc_root.map(Path::to_path_buf),
            events,
            confirmation: Arc::new(DeclineOverwrite),
        }
    }

    pub fn from_config(config: &SyncConfig, events: EventSender) -> Self {
        Self::new(config.backup_dir.clone(), config.acc_root.as_deref(), events)
    }

    pub fn with_confirmation(mut self, confirmation: Arc<dyn OverwriteConfirmation>) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.destination.join(ARCHIVE_NAME)
    }

    pub fn has_archive(&self) -> bool {
        !self.destination.as_os_str().is_empty() && self.archive_path().is_file()
    }

    /// Creates the backup directory if needed.
    pub async fn ensure_destination(&self) -> Result<PathBuf> {
        let result = self.prepare_destination().await;
        self.report(result)
    }

    /// Archives `Customs/Cars` and `Customs/Liveries` into `backup.zip`.
    ///
    /// An existing archive is only replaced when `overwrite_confirmed` is set
    /// or the registered [`OverwriteConfirmation`] accepts.
    #[instrument(skip(self))]
    pub async fn create_backup(&self, overwrite_confirmed: bool) -> Result<BackupOutcome> {
        let result = self.write_backup(overwrite_confirmed).await;
        self.report(result)
    }

    /// Cleans the content subtrees and extracts `backup.zip` over them.
    ///
    /// Fails with [`BackupError::NoArchive`] before touching anything when no
    /// archive exists.
    #[instrument(skip(self))]
    pub async fn restore_backup(&self) -> Result<PathBuf> {
        let result = self.restore().await;
        self.report(result)
    }

    /// Empties both content subtrees. `notify` controls the `Cleaned` event.
    ///
    /// Destructive; confirmation is the caller's job.
    #[instrument(skip(self))]
    pub async fn clean_content(&self, notify: bool) -> Result<()> {
        let result = self.clean().await;
        if result.is_ok() && notify {
            info!("Content cleaned");
            self.emit(BackupEvent::Cleaned);
        }
        self.report(result)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    async fn prepare_destination(&self) -> Result<PathBuf> {
        if self.destination.as_os_str().is_empty() {
            return Err(BackupError::NotConfigured("Backup directory"));
        }
        tokio::fs::create_dir_all(&self.destination).await?;
        Ok(self.destination.clone())
    }

    fn acc_dir(&self) -> Result<&Path> {
        self.acc_root
            .as_deref()
            .ok_or(BackupError::NotConfigured("acc content directory"))
    }

    fn customs_dir(&self) -> Result<PathBuf> {
        Ok(self.acc_dir()?.join(CUSTOMS_DIR))
    }

    async fn write_backup(&self, overwrite_confirmed: bool) -> Result<BackupOutcome> {
        let acc_root = self.acc_dir()?.to_path_buf();
        let destination = self.prepare_destination().await?;
        let archive = self.archive_path();

        if archive.exists()
            && !overwrite_confirmed
            && !self.confirmation.confirm_overwrite(&archive).await
        {
            info!(path = %archive.display(), "Backup overwrite declined");
            self.emit(BackupEvent::ConfirmationDeclined {
                path: archive.display().to_string(),
            });
            return Ok(BackupOutcome::Declined { path: archive });
        }

        let target = archive.clone();
        let files = tokio::task::spawn_blocking(move || write_archive(&acc_root, &destination, &target))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))??;

        info!(path = %archive.display(), files, "Backup created");
        self.emit(BackupEvent::Created {
            path: archive.display().to_string(),
            files,
        });
        Ok(BackupOutcome::Created {
            path: archive,
            files,
        })
    }

    async fn restore(&self) -> Result<PathBuf> {
        let acc_root = self.acc_dir()?.to_path_buf();
        if self.destination.as_os_str().is_empty() {
            return Err(BackupError::NotConfigured("Backup directory"));
        }
        let archive = self.archive_path();
        if !archive.is_file() {
            return Err(BackupError::NoArchive(archive));
        }

        let source = archive.clone();
        let entries = tokio::task::spawn_blocking(move || inspect_archive(&source))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))??;
        debug!(path = %archive.display(), entries, "Backup archive checked");

        self.clean().await?;

        let source = archive.clone();
        let files = tokio::task::spawn_blocking(move || extract_zip(&source, &acc_root))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))??;

        info!(path = %archive.display(), files, "Backup restored");
        self.emit(BackupEvent::Restored {
            path: archive.display().to_string(),
        });
        Ok(archive)
    }

    async fn clean(&self) -> Result<()> {
        let customs = self.customs_dir()?;
        for subtree in SUBTREES {
            let path = customs.join(subtree);
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed content subtree"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tokio::fs::create_dir_all(&path).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn emit(&self, event: BackupEvent) {
        let _ = self.events.emit(CoreEvent::Backup(event));
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, kind = %e.kind(), "Backup operation failed");
            self.emit(BackupEvent::Failed {
                kind: e.kind(),
                message: e.to_string(),
            });
        }
        result
    }
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("destination", &self.destination)
            .field("acc_root", &self.acc_root)
            .finish()
    }
}

/// Writes the archive to a temporary file in `destination` and renames it
/// over `archive` once complete. Returns the number of files stored.
fn write_archive(acc_root: &Path, destination: &Path, archive: &Path) -> Result<usize> {
    let staging = tempfile::Builder::new()
        .prefix(".backup-")
        .suffix(".zip")
        .tempfile_in(destination)?;

    let mut writer = ZipWriter::new(staging);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0;
    let customs = acc_root.join(CUSTOMS_DIR);
    for subtree in SUBTREES {
        let root = customs.join(subtree);
        if !root.is_dir() {
            debug!(path = %root.display(), "Content subtree missing, archiving it empty");
            writer.add_directory(format!("{}/{}/", CUSTOMS_DIR, subtree), options)?;
            continue;
        }

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let name = entry_name(acc_root, entry.path())?;

            if entry.file_type().is_dir() {
                writer.add_directory(format!("{}/", name), options)?;
            } else if entry.file_type().is_file() {
                writer.start_file(name, options)?;
                let mut source = File::open(entry.path())?;
                io::copy(&mut source, &mut writer)?;
                files += 1;
            }
        }
    }

    let staging = writer.finish()?;
    staging.persist(archive).map_err(|e| BackupError::Io(e.error))?;
    Ok(files)
}

/// Archive name of `path`: relative to `acc_root`, `/`-separated.
fn entry_name(acc_root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(acc_root).map_err(|_| {
        BackupError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is outside {}", path.display(), acc_root.display()),
        ))
    })?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Opens `archive` and checks that every entry sits under `Customs/`.
/// Returns the number of entries.
fn inspect_archive(archive: &Path) -> Result<usize> {
    let unrecognized = |reason: String| BackupError::Unrecognized {
        path: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive)?;
    let zip = ZipArchive::new(io::BufReader::new(file)).map_err(|e| unrecognized(e.to_string()))?;
    if zip.len() == 0 {
        return Err(unrecognized("archive is empty".to_string()));
    }

    for name in zip.file_names() {
        let under_customs = matches!(
            Path::new(name).components().next(),
            Some(Component::Normal(first)) if first.to_str() == Some(CUSTOMS_DIR)
        );
        if !under_customs {
            return Err(unrecognized(format!(
                "entry '{}' is outside {}/",
                name, CUSTOMS_DIR
            )));
        }
    }

    Ok(zip.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_is_slash_separated() {
        let acc_root = Path::new("/games/acc");
        let path = acc_root
            .join("Customs")
            .join("Liveries")
            .join("team_a")
            .join("decals.png");

        assert_eq!(
            entry_name(acc_root, &path).unwrap(),
            "Customs/Liveries/team_a/decals.png"
        );
        assert!(entry_name(acc_root, Path::new("/elsewhere/file")).is_err());
    }

    #[test]
    fn test_archive_path() {
        let (events, _rx) = core_runtime::events::event_channel();
        let manager = BackupManager::new("/backups", Some(Path::new("/games/acc")), events);

        assert_eq!(manager.archive_path(), PathBuf::from("/backups/backup.zip"));
        assert_eq!(
            manager.customs_dir().unwrap(),
            PathBuf::from("/games/acc/Customs")
        );
    }

    #[test]
    fn test_missing_acc_root() {
        let (events, _rx) = core_runtime::events::event_channel();
        let manager = BackupManager::new("/backups", None, events);

        assert!(matches!(
            manager.customs_dir(),
            Err(BackupError::NotConfigured(_))
        ));
    }
}
