use thiserror::Error as ThisError;

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Malformed document id: {0:?}")]
    InvalidId(String),
    #[error("{0}")]
    Operation(String),
}

impl StoreError {
    /// Connectivity failures are reported apart from everything else
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::NotConnected)
    }
}

/// Counts reported by an update.
///
/// `modified` only counts documents whose contents actually changed, so a
/// document can be matched without being modified.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_kinds() {
        assert!(StoreError::NotConnected.is_connectivity());
        assert!(StoreError::Connection("refused".into()).is_connectivity());
        assert!(!StoreError::DuplicateKey("_id".into()).is_connectivity());
        assert!(!StoreError::InvalidId("xyz".into()).is_connectivity());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StoreError::InvalidId("xyz".into()).to_string(),
            "Malformed document id: \"xyz\""
        );
        assert_eq!(StoreError::NotConnected.to_string(), "Not connected");
    }
}
