use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while initializing, ingesting or deleting an upload session
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Missing upload identity")]
    MissingIdentity,

    /// Never carries decryption detail; the cause is dropped at the codec boundary.
    #[error("Invalid upload identity")]
    InvalidIdentity,

    #[error("Invalid upload range: {message}")]
    InvalidRange { message: String },

    #[error("Upload session not found")]
    SessionNotFound,

    #[error("Storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Storage operation failed: {reason}")]
    Storage { reason: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl UploadError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid range error
    pub fn invalid_range<S: Into<String>>(message: S) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Create a storage unavailable error
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::StorageUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a storage failure error
    pub fn storage<S: Into<String>>(reason: S) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for errors caused by the request itself (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingIdentity | Self::InvalidIdentity | Self::InvalidRange { .. } | Self::SessionNotFound
        )
    }

    /// HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound => 404,
            e if e.is_client_error() => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        assert_eq!(UploadError::MissingIdentity.status_code(), 400);
        assert_eq!(UploadError::InvalidIdentity.status_code(), 400);
        assert_eq!(UploadError::invalid_range("offset").status_code(), 400);
        assert_eq!(UploadError::SessionNotFound.status_code(), 404);
    }

    #[test]
    fn storage_errors_map_to_500() {
        assert_eq!(UploadError::unavailable("down").status_code(), 500);
        assert_eq!(UploadError::storage("delete").status_code(), 500);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(UploadError::from(io).status_code(), 500);
    }

    #[test]
    fn invalid_identity_message_is_generic() {
        assert_eq!(UploadError::InvalidIdentity.to_string(), "Invalid upload identity");
    }
}
