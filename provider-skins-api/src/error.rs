//! Error types for the skins API provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Skins API provider errors
#[derive(Error, Debug)]
pub enum SkinsApiError {
    /// Credentials rejected by the server
    #[error("Authentication failed (status {0})")]
    Unauthorized(u16),

    /// Server answered with a non-success status
    #[error("Skins API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse the manifest
    #[error("Failed to parse skins manifest: {0}")]
    ParseError(String),

    /// Server URL cannot carry the request path
    #[error("Invalid server URL: {0}")]
    InvalidEndpoint(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for skins API operations
pub type Result<T> = std::result::Result<T, SkinsApiError>;

impl From<SkinsApiError> for BridgeError {
    fn from(error: SkinsApiError) -> Self {
        match error {
            SkinsApiError::Unauthorized(status) => {
                BridgeError::Connectivity(format!("Authentication failed, response code {}", status))
            }
            SkinsApiError::ApiError {
                status_code,
                message,
            } => BridgeError::Transfer(format!("Response code {}: {}", status_code, message)),
            SkinsApiError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            SkinsApiError::InvalidEndpoint(msg) => {
                BridgeError::OperationFailed(format!("Invalid server URL: {}", msg))
            }
            SkinsApiError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ErrorKind;

    #[test]
    fn test_error_display() {
        let error = SkinsApiError::ApiError {
            status_code: 404,
            message: "Not Found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Skins API error (status 404): Not Found"
        );
    }

    #[test]
    fn test_error_conversion() {
        let bridge_error: BridgeError = SkinsApiError::Unauthorized(401).into();
        assert_eq!(bridge_error.kind(), ErrorKind::Connectivity);

        let bridge_error: BridgeError = SkinsApiError::ApiError {
            status_code: 502,
            message: String::new(),
        }
        .into();
        assert_eq!(bridge_error.kind(), ErrorKind::Transfer);

        let bridge_error: BridgeError = SkinsApiError::ParseError("eof".to_string()).into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));
    }
}
