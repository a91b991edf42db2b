//! [`ConversationStore`] backed by a pooled `SQLite` database.
//!
//! Each operation checks out a connection on the blocking pool and runs in a
//! single transaction. Writes use `BEGIN IMMEDIATE` so appenders serialize on
//! the database write lock before reading `MAX(sequence)`; reads use a
//! deferred transaction for a consistent snapshot. If the caller's token is
//! cancelled the caller is released with [`StoreError::Cancelled`] and the
//! blocking task still runs to commit or rollback.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::{EventRepo, Finalize, SessionRepo};
use crate::store::ConversationStore;
use crate::types::{CompletionFields, ConversationEvent, NewConversationEvent, Session, SessionStatus};

/// `SQLite` implementation of [`ConversationStore`].
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: ConnectionPool,
}

impl SqliteConversationStore {
    /// Wrap an already-migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open a file-backed store and bring its schema up to date.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = new_file(path, config)?;
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
        drop(conn);
        Ok(Self::new(pool))
    }

    /// Open a migrated single-connection in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let pool = new_in_memory(&ConnectionConfig::default())?;
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
        drop(conn);
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    async fn run<T, F>(&self, cancel: &CancellationToken, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(op, "caller cancelled, store task left to finish");
                Err(StoreError::Cancelled)
            }
            joined = task => joined
                .map_err(|e| StoreError::Internal(format!("{op} task failed: {e}")))?,
        }
    }
}

fn require_running(session: &Session) -> Result<()> {
    if session.status.is_terminal() {
        return Err(StoreError::InvalidState(format!(
            "session {} is {}",
            session.id, session.status
        )));
    }
    Ok(())
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_session(&self, cancel: &CancellationToken, session: &Session) -> Result<()> {
        if session.id.is_empty() {
            return Err(StoreError::InvalidArgument("session id is required".into()));
        }
        if session.status != SessionStatus::Running {
            return Err(StoreError::InvalidArgument(format!(
                "new session {} must be running, got {}",
                session.id, session.status
            )));
        }

        let session = session.clone();
        self.run(cancel, "create_session", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if SessionRepo::exists(&tx, &session.id)? {
                return Err(StoreError::Conflict(session.id));
            }
            if let Some(parent) = session.parent_session_id.as_deref() {
                if !SessionRepo::exists(&tx, parent)? {
                    return Err(StoreError::SessionNotFound(parent.to_string()));
                }
            }
            SessionRepo::insert(&tx, &session)?;
            tx.commit()?;
            debug!(session_id = %session.id, run_id = %session.run_id, "session row created");
            Ok(())
        })
        .await
    }

    async fn append_event(
        &self,
        cancel: &CancellationToken,
        event: &NewConversationEvent,
    ) -> Result<ConversationEvent> {
        event.validate().map_err(StoreError::InvalidArgument)?;

        let event = event.clone();
        self.run(cancel, "append_event", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let session = SessionRepo::get_by_id(&tx, &event.session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(event.session_id.clone()))?;
            require_running(&session)?;

            let sequence = EventRepo::get_next_sequence(&tx, &session.id)?;
            let claude_session_id = event
                .claude_session_id
                .clone()
                .or(session.claude_session_id);
            let now = Utc::now();
            let stored = EventRepo::insert(&tx, &event, sequence, claude_session_id, now)?;
            SessionRepo::touch(&tx, &session.id, now)?;
            tx.commit()?;

            debug!(
                session_id = %stored.session_id,
                sequence = stored.sequence,
                event_type = %stored.event_type,
                "event appended"
            );
            Ok(stored)
        })
        .await
    }

    async fn update_session_status(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        status: SessionStatus,
        completion: &CompletionFields,
    ) -> Result<Session> {
        if status == SessionStatus::Running {
            return Err(StoreError::InvalidState(format!(
                "session {session_id} cannot transition to running"
            )));
        }
        let error_message = completion.error_message.clone().unwrap_or_default();
        if status != SessionStatus::Failed && !error_message.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "error message is only valid for failed sessions, got {status}"
            )));
        }

        let session_id = session_id.to_string();
        let completion = completion.clone();
        self.run(cancel, "update_session_status", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let session = SessionRepo::get_by_id(&tx, &session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;
            if session.status.is_terminal() {
                return Err(StoreError::InvalidState(format!(
                    "session {session_id} is already {}",
                    session.status
                )));
            }

            let _ = SessionRepo::finalize(
                &tx,
                &session_id,
                &Finalize {
                    status,
                    completed_at: completion.completed_at.unwrap_or_else(Utc::now),
                    cost_usd: completion.cost_usd,
                    total_tokens: completion.total_tokens,
                    duration_ms: completion.duration_ms,
                    error_message: &error_message,
                },
            )?;
            let updated = SessionRepo::get_by_id(&tx, &session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;
            tx.commit()?;

            info!(session_id = %updated.id, status = %updated.status, "session finalized");
            Ok(updated)
        })
        .await
    }

    async fn assign_claude_session_id(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        claude_session_id: &str,
    ) -> Result<Session> {
        if claude_session_id.is_empty() {
            return Err(StoreError::InvalidArgument(
                "claude session id is required".into(),
            ));
        }

        let session_id = session_id.to_string();
        let claude_session_id = claude_session_id.to_string();
        self.run(cancel, "assign_claude_session_id", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let session = SessionRepo::get_by_id(&tx, &session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;
            require_running(&session)?;

            if session.claude_session_id.as_deref() == Some(claude_session_id.as_str()) {
                return Ok(session);
            }
            if let Some(existing) = &session.claude_session_id {
                return Err(StoreError::InvalidState(format!(
                    "session {session_id} already has claude session id {existing}"
                )));
            }

            SessionRepo::set_claude_session_id(&tx, &session_id, &claude_session_id, Utc::now())?;
            let updated = SessionRepo::get_by_id(&tx, &session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;
            tx.commit()?;

            debug!(session_id = %session_id, claude_session_id = %claude_session_id, "claude session assigned");
            Ok(updated)
        })
        .await
    }

    async fn get_session(&self, cancel: &CancellationToken, session_id: &str) -> Result<Session> {
        let session_id = session_id.to_string();
        self.run(cancel, "get_session", move |conn| {
            SessionRepo::get_by_id(conn, &session_id)?
                .ok_or(StoreError::SessionNotFound(session_id))
        })
        .await
    }

    async fn list_sessions(&self, cancel: &CancellationToken) -> Result<Vec<Session>> {
        self.run(cancel, "list_sessions", |conn| SessionRepo::list(conn))
            .await
    }

    async fn get_session_conversation(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Vec<ConversationEvent>> {
        let session_id = session_id.to_string();
        self.run(cancel, "get_session_conversation", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            if !SessionRepo::exists(&tx, &session_id)? {
                return Err(StoreError::SessionNotFound(session_id));
            }
            let events = EventRepo::list_by_session(&tx, &session_id)?;
            tx.commit()?;
            debug!(session_id = %session_id, count = events.len(), "session conversation loaded");
            Ok(events)
        })
        .await
    }

    async fn get_conversation(
        &self,
        cancel: &CancellationToken,
        claude_session_id: &str,
    ) -> Result<Vec<ConversationEvent>> {
        let claude_session_id = claude_session_id.to_string();
        self.run(cancel, "get_conversation", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let known = SessionRepo::exists_for_claude_session(&tx, &claude_session_id)?
                || EventRepo::exists_for_claude_session(&tx, &claude_session_id)?;
            if !known {
                return Err(StoreError::ConversationNotFound(claude_session_id));
            }
            let events = EventRepo::list_by_claude_session(&tx, &claude_session_id)?;
            tx.commit()?;
            debug!(claude_session_id = %claude_session_id, count = events.len(), "conversation loaded");
            Ok(events)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
