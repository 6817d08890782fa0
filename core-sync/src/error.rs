use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    // ========================================================================
    // Local persistence
    // ========================================================================
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ========================================================================
    // Remote replay
    // ========================================================================
    #[error("Network error: {0}")]
    Network(String),

    // ========================================================================
    // Caller input
    // ========================================================================
    #[error("Invalid key '{0}': keys must be non-empty and must not start with '__'")]
    InvalidKey(String),

    #[error("Invalid operation ID: {0}")]
    InvalidOperationId(String),
}

impl SyncError {
    /// Whether the failure came from the remote side and may succeed later.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        SyncError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_errors_are_persistence_failures() {
        let err: SyncError = BridgeError::StorageError("disk full".to_string()).into();
        assert!(matches!(err, SyncError::Persistence(ref msg) if msg.contains("disk full")));
        assert!(!err.is_remote());
    }

    #[test]
    fn test_network_errors_are_remote() {
        assert!(SyncError::Network("HTTP 503".to_string()).is_remote());
    }
}
