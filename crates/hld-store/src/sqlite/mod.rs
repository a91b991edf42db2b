//! `SQLite` backend for the conversation store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode, foreign keys and
//!   `synchronous = FULL` applied to every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`repositories`]**: stateless SQL over `&Connection`.
//! - **[`conversation_store`]**: the async [`ConversationStore`](crate::ConversationStore)
//!   implementation composing the repositories into transactions.

pub mod connection;
pub mod conversation_store;
pub mod migrations;
pub mod repositories;

pub use connection::{
    ConnectionConfig, ConnectionPool, PragmaState, new_file, new_in_memory,
    verify_pragmas,
};
pub use conversation_store::SqliteConversationStore;
pub use migrations::{current_version, latest_version, run_migrations};
