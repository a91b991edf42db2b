//! Session manager error types.

use hld_store::StoreError;

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Error surfaced by the conversation store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session is running in the store but not owned by this manager.
    #[error("session not active: {0}")]
    NotActive(String),

    /// The caller supplied an unusable value.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for session manager operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn store_error_is_transparent() {
        let err: SessionError = StoreError::SessionNotFound("sess-1".into()).into();
        assert_eq!(err.to_string(), "session not found: sess-1");
        assert_matches!(err, SessionError::Store(StoreError::SessionNotFound(_)));
    }

    #[test]
    fn not_active_display() {
        let err = SessionError::NotActive("sess-9".into());
        assert_eq!(err.to_string(), "session not active: sess-9");
    }

    #[test]
    fn invalid_input_display() {
        let err = SessionError::InvalidInput("query must not be empty".into());
        assert_eq!(err.to_string(), "invalid input: query must not be empty");
    }
}
