use bridge_traits::ErrorKind;
use core_sync::SyncError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("No backup archive at {0}")]
    NoArchive(PathBuf),

    #[error("{path} is not a content backup: {reason}")]
    Unrecognized { path: PathBuf, reason: String },

    #[error("Failed to write backup archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Restore failed: {0}")]
    Restore(#[from] SyncError),

    #[error("Backup task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Category tag for user-facing notifications.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::NotConfigured(_) => ErrorKind::Configuration,
            BackupError::NoArchive(_) | BackupError::Unrecognized { .. } => {
                ErrorKind::ArchiveState
            }
            BackupError::Restore(e) => e.kind(),
            BackupError::Archive(_) | BackupError::Task(_) | BackupError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
