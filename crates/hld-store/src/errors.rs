//! Error types for the conversation store.
//!
//! [`StoreError`] is returned by every [`ConversationStore`](crate::ConversationStore)
//! operation. The first group of variants describes contract violations a
//! caller can act on; the second group wraps backend failures and keeps the
//! underlying cause attached for diagnosis.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A session with this ID already exists.
    #[error("session already exists: {0}")]
    Conflict(String),

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No session carries the requested claude session ID.
    #[error("conversation not found for claude session: {0}")]
    ConversationNotFound(String),

    /// The mutation violates the session state machine.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The mutation carries values that do not fit the requested transition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller abandoned the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Internal error (e.g. a blocking task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
