use bridge_traits::{BridgeError, ErrorKind, SkinId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot reach content server: {0}")]
    Connectivity(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Extraction into {path} failed: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Unsupported package type '.{0}'")]
    UnsupportedPackage(String),

    #[error("No content directory configured for {0}")]
    NotConfigured(bridge_traits::Category),

    #[error("Skin {0} is not in the current listing")]
    UnknownSkin(SkinId),

    #[error("Bridge error: {0}")]
    Bridge(BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SyncError::Extraction {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Category tag for user-facing notifications.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Connectivity(_) => ErrorKind::Connectivity,
            SyncError::Transfer(_) => ErrorKind::Transfer,
            SyncError::Extraction { .. } | SyncError::UnsupportedPackage(_) => {
                ErrorKind::Extraction
            }
            SyncError::NotConfigured(_) => ErrorKind::Configuration,
            SyncError::Bridge(e) => e.kind(),
            SyncError::Runtime(e) => e.kind(),
            SyncError::UnknownSkin(_) | SyncError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Connectivity(msg) => SyncError::Connectivity(msg),
            BridgeError::Transfer(msg) => SyncError::Transfer(msg),
            other => SyncError::Bridge(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_errors_keep_their_kind() {
        let err: SyncError = BridgeError::Connectivity("refused".into()).into();
        assert!(matches!(err, SyncError::Connectivity(_)));
        assert_eq!(err.kind(), ErrorKind::Connectivity);

        let err: SyncError = BridgeError::Transfer("HTTP 500".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transfer);

        let err: SyncError = BridgeError::OperationFailed("bad json".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_extraction_kinds() {
        assert_eq!(
            SyncError::extraction("/tmp/x", "invalid zip").kind(),
            ErrorKind::Extraction
        );
        assert_eq!(
            SyncError::UnsupportedPackage("7z".into()).kind(),
            ErrorKind::Extraction
        );
    }
}
