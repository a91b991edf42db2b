//! # hld-store
//!
//! Durable registry of agent sessions and their conversation events.
//!
//! - **Types**: [`Session`], [`ConversationEvent`] and the write-side inputs
//!   ([`NewConversationEvent`], [`CompletionFields`])
//! - **Contract**: the [`ConversationStore`] trait, the only way other crates
//!   touch persisted state
//! - **`SQLite` backend**: [`SqliteConversationStore`] over an `r2d2` pool with
//!   WAL mode, stateless repositories and embedded migrations
//!
//! Enable the `mock` feature to get `MockConversationStore` for component
//! tests that must not depend on persistence.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{Result, StoreError};
pub use sqlite::{
    ConnectionConfig, ConnectionPool, SqliteConversationStore, new_file, new_in_memory,
    run_migrations,
};
#[cfg(any(test, feature = "mock"))]
pub use store::MockConversationStore;
pub use store::ConversationStore;
pub use types::{
    CompletionFields, ConversationEvent, EventType, NewConversationEvent, Session, SessionStatus,
};
