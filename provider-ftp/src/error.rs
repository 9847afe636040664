//! Error types for the FTP tree provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// FTP provider errors
#[derive(Error, Debug)]
pub enum FtpError {
    /// Server unreachable or control connection dropped
    #[error("FTP connection failed: {0}")]
    Connection(String),

    /// Login rejected
    #[error("FTP login failed: {0}")]
    Login(String),

    /// A command failed on an established session
    #[error("FTP command failed on {path}: {message}")]
    Command { path: String, message: String },

    /// Server URL unusable for FTP
    #[error("Invalid FTP endpoint: {0}")]
    InvalidEndpoint(String),

    /// Blocking session task panicked or was cancelled
    #[error("FTP session task failed: {0}")]
    Task(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for FTP operations
pub type Result<T> = std::result::Result<T, FtpError>;

impl FtpError {
    pub fn command(path: impl Into<String>, message: impl ToString) -> Self {
        FtpError::Command {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<FtpError> for BridgeError {
    fn from(error: FtpError) -> Self {
        match error {
            FtpError::Connection(msg) => BridgeError::Connectivity(msg),
            FtpError::Login(msg) => BridgeError::Connectivity(format!("Login failed: {}", msg)),
            FtpError::Command { path, message } => {
                BridgeError::Transfer(format!("{}: {}", path, message))
            }
            FtpError::InvalidEndpoint(msg) => {
                BridgeError::OperationFailed(format!("Invalid FTP endpoint: {}", msg))
            }
            FtpError::Task(msg) => BridgeError::OperationFailed(msg),
            FtpError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ErrorKind;

    #[test]
    fn test_error_conversion() {
        let e: BridgeError = FtpError::Login("530 Login incorrect".into()).into();
        assert_eq!(e.kind(), ErrorKind::Connectivity);

        let e: BridgeError = FtpError::command("/ac/1/car/skin.zip", "550 No such file").into();
        assert_eq!(e.kind(), ErrorKind::Transfer);
        assert!(e.to_string().contains("/ac/1/car/skin.zip"));
    }
}
