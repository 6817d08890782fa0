//! # Media Error Types
//!
//! Error types for the media cache and resumable downloads.
//!
//! `MediaError` is `Clone` so a single transfer outcome can be shared by
//! every caller attached to it.

use bridge_traits::BridgeError;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Local read or write failed. Never swallowed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The budget cannot fit the asset even after evicting everything
    /// evictable. Raised before any bytes are written.
    #[error("Insufficient storage: {required} bytes required, {available} available")]
    InsufficientStorage { required: u64, available: i64 },

    // ========================================================================
    // Transfer Errors
    // ========================================================================
    /// Transport failure while fetching bytes.
    #[error("Network error: {0}")]
    Network(String),

    /// Size or checksum verification failed after the transfer.
    #[error("Corrupt transfer: {0}")]
    CorruptTransfer(String),

    /// The transfer was cancelled cooperatively.
    #[error("Transfer cancelled: {0}")]
    Cancelled(String),

    // ========================================================================
    // Lookup / Input Errors
    // ========================================================================
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::Network(_) | MediaError::CorruptTransfer(_)
        )
    }

    /// Map a failure of the remote byte source.
    pub(crate) fn network(err: BridgeError) -> Self {
        MediaError::Network(err.to_string())
    }
}

impl From<BridgeError> for MediaError {
    fn from(err: BridgeError) -> Self {
        MediaError::Persistence(err.to_string())
    }
}

impl From<SyncError> for MediaError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Network(msg) => MediaError::Network(msg),
            other => MediaError::Persistence(other.to_string()),
        }
    }
}

/// Result type for media operations.
pub type Result<T> = std::result::Result<T, MediaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(MediaError::Network("reset".into()).is_retryable());
        assert!(MediaError::CorruptTransfer("size".into()).is_retryable());
        assert!(!MediaError::Cancelled("a1".into()).is_retryable());
        assert!(!MediaError::InsufficientStorage {
            required: 150,
            available: 100
        }
        .is_retryable());
    }

    #[test]
    fn test_conversions() {
        let err: MediaError = BridgeError::StorageError("read-only".into()).into();
        assert!(matches!(err, MediaError::Persistence(_)));

        let err: MediaError = SyncError::Persistence("disk full".into()).into();
        assert!(matches!(err, MediaError::Persistence(ref m) if m.contains("disk full")));
    }
}
