//! The persistence contract.
//!
//! Everything above the store (session manager, RPC handlers) holds an
//! `Arc<dyn ConversationStore>`. Every operation takes the caller's
//! cancellation token; a cancelled caller gets [`StoreError::Cancelled`]
//! while any transaction already started runs to commit or rollback.
//!
//! [`StoreError::Cancelled`]: crate::StoreError::Cancelled

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::types::{CompletionFields, ConversationEvent, NewConversationEvent, Session, SessionStatus};

/// Durable, append-only registry of sessions and their conversation events.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a new running session. `Conflict` if the ID exists.
    async fn create_session(&self, cancel: &CancellationToken, session: &Session) -> Result<()>;

    /// Append an event, assigning the next sequence atomically with the write.
    ///
    /// `SessionNotFound` if the session is missing, `InvalidState` if it is
    /// terminal.
    async fn append_event(
        &self,
        cancel: &CancellationToken,
        event: &NewConversationEvent,
    ) -> Result<ConversationEvent>;

    /// Move a running session to a terminal status, recording completion
    /// fields exactly once.
    async fn update_session_status(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        status: SessionStatus,
        completion: &CompletionFields,
    ) -> Result<Session>;

    /// Set the claude session ID of a running session. Idempotent for the
    /// same value; `InvalidState` if a different value is already set.
    async fn assign_claude_session_id(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        claude_session_id: &str,
    ) -> Result<Session>;

    /// Fetch one session.
    async fn get_session(&self, cancel: &CancellationToken, session_id: &str) -> Result<Session>;

    /// All sessions, most recent activity first.
    async fn list_sessions(&self, cancel: &CancellationToken) -> Result<Vec<Session>>;

    /// Events of one session in ascending sequence order.
    async fn get_session_conversation(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Vec<ConversationEvent>>;

    /// Events of every session sharing `claude_session_id`, ordered by
    /// session creation then sequence.
    async fn get_conversation(
        &self,
        cancel: &CancellationToken,
        claude_session_id: &str,
    ) -> Result<Vec<ConversationEvent>>;
}
