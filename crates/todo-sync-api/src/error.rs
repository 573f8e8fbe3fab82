use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the sync layer and its remote collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Network, storage or query failure reported by a remote collaborator
    #[error("Remote {operation} failed: {message}")]
    Remote { operation: String, message: String },

    /// Malformed record payload, malformed image bytes, or a response that
    /// breaks the store contract
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Operation invoked on a record that lacks the identity it needs
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl SyncError {
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        SyncError::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        SyncError::InvalidState {
            message: message.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, SyncError::Decode { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, SyncError::InvalidState { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_operation() {
        let err = SyncError::remote("insert", "HTTP 409");
        assert_eq!(err.to_string(), "Remote insert failed: HTTP 409");
        assert!(err.is_remote());
        assert!(!err.is_decode());
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err: SyncError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(err.is_decode());
    }
}
