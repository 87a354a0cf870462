//! Error taxonomy for the sync engine.

use thiserror::Error;

/// Failures crossing an engine boundary (network, storage, wire decoding).
///
/// Every engine operation converts these into a typed outcome before they reach
/// the UI; only [`InitError`] is ever returned to a caller directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The server could not be reached (connect failure, timeout, dropped connection).
    /// Transient: callers fall back to the cache.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The server answered with a non-success status.
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// A persisted value could not be parsed. Treated as an empty value.
    #[error("cache corrupt: {0}")]
    CacheCorrupt(String),

    /// The local database failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The server answered 2xx but the body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    pub fn is_network_unavailable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }

    pub fn user_visible_message(&self) -> String {
        match self {
            Self::NetworkUnavailable(_) => "Can't reach the server".into(),
            Self::ServerRejected { message, .. } => message.clone(),
            Self::CacheCorrupt(_) | Self::Storage(_) => "Local storage error".into(),
            Self::InvalidResponse(_) => "Unexpected response from server".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        SyncError::Storage(e.to_string())
    }
}

/// Errors that prevent the app core from starting at all.
#[derive(Debug, Error, uniffi::Error)]
pub enum InitError {
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    #[error("http client unavailable: {reason}")]
    HttpClientUnavailable { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_error_display() {
        let err = SyncError::NetworkUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "network unavailable: connection refused");

        let err = SyncError::ServerRejected {
            status: 500,
            message: "Failed to fetch messages".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server rejected request (500): Failed to fetch messages"
        );

        let err = SyncError::CacheCorrupt("expected value".to_string());
        assert_eq!(err.to_string(), "cache corrupt: expected value");
    }

    #[test]
    fn rejected_message_is_shown_verbatim() {
        let err = SyncError::ServerRejected {
            status: 400,
            message: "user_id and text are required".to_string(),
        };
        assert_eq!(err.user_visible_message(), "user_id and text are required");
        assert!(!err.is_network_unavailable());
    }

    #[test]
    fn storage_error_converts_to_sync_error() {
        let json_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: SyncError = StorageError::from(json_err).into();
        assert!(matches!(err, SyncError::Storage(ref m) if m.starts_with("serialization error")));
    }
}
