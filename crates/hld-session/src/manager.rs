//! Session manager: create, record, finalize, continue and list sessions.
//!
//! The manager is the only writer into the conversation store. It keeps an
//! explicit registry of the sessions it started; writes to anything else are
//! rejected, either as `InvalidState` (the session already finished) or as
//! [`SessionError::NotActive`] (a running row left behind by an earlier
//! daemon process).

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use hld_store::{ConversationEvent, ConversationStore, Session, SessionStatus, StoreError};
use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::{Result, SessionError};
use crate::types::{ContinueConfig, EventInput, SessionConfig, SessionSummary};

/// Error message recorded for sessions still running at shutdown.
pub const SHUTDOWN_ERROR_MESSAGE: &str = "daemon shutting down";

/// Error message recorded for running rows found at startup.
pub const ORPHANED_ERROR_MESSAGE: &str = "daemon restarted before session finished";

/// Registry entry for a session owned by this manager.
#[derive(Clone, Debug)]
pub struct ActiveSession {
    /// External invocation ID.
    pub run_id: String,
    /// When the manager registered the session.
    pub started_at: Instant,
}

/// Session manager.
pub struct SessionManager {
    store: Arc<dyn ConversationStore>,
    active_sessions: DashMap<String, ActiveSession>,
}

impl SessionManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            active_sessions: DashMap::new(),
        }
    }

    /// The store this manager writes to.
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Create a running session and register it as active.
    #[instrument(skip(self, cancel, config), fields(model = %config.model))]
    pub async fn create_session(
        &self,
        cancel: &CancellationToken,
        config: SessionConfig,
    ) -> Result<Session> {
        if config.query.trim().is_empty() {
            return Err(SessionError::InvalidInput("query is required".into()));
        }

        let session_id = config
            .session_id
            .unwrap_or_else(|| format!("sess_{}", Uuid::now_v7()));
        let run_id = config
            .run_id
            .unwrap_or_else(|| format!("run_{}", Uuid::now_v7()));
        let session = Session::new(session_id, run_id, config.query)
            .with_model(config.model)
            .with_working_dir(config.working_dir);

        self.store.create_session(cancel, &session).await?;
        self.register(&session);
        info!(session_id = %session.id, run_id = %session.run_id, "session created");
        Ok(session)
    }

    /// Record the claude session ID reported by the agent runtime.
    #[instrument(skip(self, cancel))]
    pub async fn set_claude_session_id(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        claude_session_id: &str,
    ) -> Result<Session> {
        self.ensure_writable(cancel, session_id).await?;
        let session = self
            .store
            .assign_claude_session_id(cancel, session_id, claude_session_id)
            .await
            .inspect_err(|e| log_rejected(session_id, "set_claude_session_id", e))?;
        debug!(session_id, claude_session_id, "claude session id recorded");
        Ok(session)
    }

    /// Append one conversation event to an active session.
    #[instrument(skip(self, cancel, input))]
    pub async fn record_event(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        input: EventInput,
    ) -> Result<ConversationEvent> {
        self.ensure_writable(cancel, session_id).await?;
        let event = self
            .store
            .append_event(cancel, &input.into_new_event(session_id))
            .await
            .inspect_err(|e| log_rejected(session_id, "record_event", e))?;
        counter!("conversation_events_total", "event_type" => event.event_type.as_str())
            .increment(1);
        Ok(event)
    }

    /// Mark an active session completed.
    #[instrument(skip(self, cancel, summary))]
    pub async fn complete_session(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        summary: SessionSummary,
    ) -> Result<Session> {
        self.finalize(
            cancel,
            session_id,
            SessionStatus::Completed,
            summary,
            None,
        )
        .await
    }

    /// Mark an active session failed with `error_message`.
    #[instrument(skip(self, cancel, summary))]
    pub async fn fail_session(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        error_message: &str,
        summary: SessionSummary,
    ) -> Result<Session> {
        if error_message.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "error message is required".into(),
            ));
        }
        self.finalize(
            cancel,
            session_id,
            SessionStatus::Failed,
            summary,
            Some(error_message.to_string()),
        )
        .await
    }

    /// Start a new session resuming a finished one.
    ///
    /// The child points at the parent and inherits its claude session ID, so
    /// a conversation lookup by that ID returns both runs in order.
    #[instrument(skip(self, cancel, config))]
    pub async fn continue_session(
        &self,
        cancel: &CancellationToken,
        parent_session_id: &str,
        config: ContinueConfig,
    ) -> Result<Session> {
        if config.query.trim().is_empty() {
            return Err(SessionError::InvalidInput("query is required".into()));
        }

        let parent = self.store.get_session(cancel, parent_session_id).await?;
        if !parent.status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "session {parent_session_id} is still running"
            ))
            .into());
        }
        let Some(claude_session_id) = parent.claude_session_id.clone() else {
            return Err(StoreError::InvalidState(format!(
                "session {parent_session_id} has no claude session id to resume"
            ))
            .into());
        };

        let run_id = config
            .run_id
            .unwrap_or_else(|| format!("run_{}", Uuid::now_v7()));
        let child = Session::new(format!("sess_{}", Uuid::now_v7()), run_id, config.query)
            .with_model(config.model.unwrap_or(parent.model))
            .with_working_dir(config.working_dir.unwrap_or(parent.working_dir))
            .with_claude_session_id(claude_session_id)
            .with_parent(parent.id);

        self.store.create_session(cancel, &child).await?;
        self.register(&child);
        info!(
            session_id = %child.id,
            parent_session_id,
            "session continued"
        );
        Ok(child)
    }

    /// Fetch one session.
    pub async fn get_session(&self, cancel: &CancellationToken, session_id: &str) -> Result<Session> {
        Ok(self.store.get_session(cancel, session_id).await?)
    }

    /// All sessions, most recent activity first.
    pub async fn list_sessions(&self, cancel: &CancellationToken) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions(cancel).await?)
    }

    /// IDs of sessions this manager is driving, sorted.
    pub fn active_session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .active_sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether `session_id` is owned by this manager.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active_sessions.contains_key(session_id)
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.active_sessions.len()
    }

    /// Fail running rows that no manager owns (left by a crashed daemon).
    ///
    /// Returns the number of sessions finalized.
    #[instrument(skip(self, cancel))]
    pub async fn reconcile_orphans(&self, cancel: &CancellationToken) -> Result<usize> {
        let sessions = self.store.list_sessions(cancel).await?;
        let mut reconciled = 0;
        for session in sessions {
            if session.status.is_terminal() || self.is_active(&session.id) {
                continue;
            }
            let completion = SessionSummary::default()
                .into_completion(Some(ORPHANED_ERROR_MESSAGE.to_string()));
            match self
                .store
                .update_session_status(cancel, &session.id, SessionStatus::Failed, &completion)
                .await
            {
                Ok(_) => {
                    warn!(session_id = %session.id, "orphaned running session marked failed");
                    reconciled += 1;
                }
                Err(StoreError::InvalidState(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(reconciled)
    }

    /// Fail every still-active session. Returns how many were finalized.
    #[instrument(skip(self, cancel))]
    pub async fn shutdown(&self, cancel: &CancellationToken) -> usize {
        let ids = self.active_session_ids();
        if ids.is_empty() {
            return 0;
        }
        info!(count = ids.len(), "failing active sessions on shutdown");

        let mut failed = 0;
        for id in ids {
            match self
                .fail_session(cancel, &id, SHUTDOWN_ERROR_MESSAGE, SessionSummary::default())
                .await
            {
                Ok(_) => failed += 1,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "could not finalize session on shutdown");
                    self.unregister(&id);
                }
            }
        }
        failed
    }

    async fn finalize(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        status: SessionStatus,
        summary: SessionSummary,
        error_message: Option<String>,
    ) -> Result<Session> {
        self.ensure_writable(cancel, session_id).await?;
        let result = self
            .store
            .update_session_status(
                cancel,
                session_id,
                status,
                &summary.into_completion(error_message),
            )
            .await;

        match result {
            Ok(session) => {
                self.unregister(session_id);
                info!(session_id, status = %session.status, "session finished");
                Ok(session)
            }
            Err(e) => {
                log_rejected(session_id, "finalize", &e);
                if matches!(e, StoreError::InvalidState(_) | StoreError::SessionNotFound(_)) {
                    self.unregister(session_id);
                }
                Err(e.into())
            }
        }
    }

    async fn ensure_writable(&self, cancel: &CancellationToken, session_id: &str) -> Result<()> {
        if self.is_active(session_id) {
            return Ok(());
        }

        let session = self.store.get_session(cancel, session_id).await?;
        if session.status.is_terminal() {
            warn!(session_id, status = %session.status, "rejected write to finished session");
            return Err(StoreError::InvalidState(format!(
                "session {session_id} is {}",
                session.status
            ))
            .into());
        }
        warn!(session_id, "rejected write to session not owned by this daemon");
        Err(SessionError::NotActive(session_id.to_string()))
    }

    fn register(&self, session: &Session) {
        let _ = self.active_sessions.insert(
            session.id.clone(),
            ActiveSession {
                run_id: session.run_id.clone(),
                started_at: Instant::now(),
            },
        );
        counter!("sessions_created_total").increment(1);
        gauge!("sessions_active").increment(1.0);
    }

    fn unregister(&self, session_id: &str) {
        if let Some((_, active)) = self.active_sessions.remove(session_id) {
            gauge!("sessions_active").decrement(1.0);
            debug!(
                session_id,
                run_id = %active.run_id,
                elapsed_ms = u64::try_from(active.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                "session unregistered"
            );
        }
    }
}

fn log_rejected(session_id: &str, op: &'static str, err: &StoreError) {
    if matches!(err, StoreError::InvalidState(_)) {
        warn!(session_id, op, error = %err, "store rejected write");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use hld_store::{EventType, MockConversationStore, SqliteConversationStore};

    use super::*;

    fn setup() -> SessionManager {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        SessionManager::new(Arc::new(store))
    }

    fn config(query: &str) -> SessionConfig {
        SessionConfig {
            query: query.into(),
            model: "claude-3-opus".into(),
            working_dir: "/home/user/project".into(),
            ..SessionConfig::default()
        }
    }

    fn message(role: &str, content: &str) -> EventInput {
        EventInput::Message {
            role: role.into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn create_registers_active_session() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let session = mgr.create_session(&cancel, config("hello")).await.unwrap();

        assert!(session.id.starts_with("sess_"));
        assert!(session.run_id.starts_with("run_"));
        assert_eq!(session.status, SessionStatus::Running);
        assert!(mgr.is_active(&session.id));
        assert_eq!(mgr.active_count(), 1);
        assert_eq!(mgr.active_session_ids(), vec![session.id.clone()]);
    }

    #[tokio::test]
    async fn create_honors_caller_ids() {
        let mgr = setup();
        let session = mgr
            .create_session(
                &CancellationToken::new(),
                SessionConfig {
                    session_id: Some("sess-123".into()),
                    run_id: Some("run-456".into()),
                    ..config("hello")
                },
            )
            .await
            .unwrap();
        assert_eq!(session.id, "sess-123");
        assert_eq!(session.run_id, "run-456");
    }

    #[tokio::test]
    async fn create_requires_query() {
        let mgr = setup();
        let err = mgr
            .create_session(&CancellationToken::new(), config("  "))
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::InvalidInput(_));
        assert_eq!(mgr.active_count(), 0);
    }

    #[tokio::test]
    async fn record_and_complete_lifecycle() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let session = mgr.create_session(&cancel, config("2+2?")).await.unwrap();

        let _ = mgr
            .set_claude_session_id(&cancel, &session.id, "claude-456")
            .await
            .unwrap();
        let first = mgr
            .record_event(&cancel, &session.id, message("user", "What is 2+2?"))
            .await
            .unwrap();
        let second = mgr
            .record_event(
                &cancel,
                &session.id,
                EventInput::ToolCall {
                    tool_id: "tool-1".into(),
                    tool_name: "calculator".into(),
                    input_json: r#"{"operation": "add", "a": 2, "b": 2}"#.into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.event_type, EventType::ToolCall);
        assert_eq!(first.claude_session_id.as_deref(), Some("claude-456"));

        let done = mgr
            .complete_session(
                &cancel,
                &session.id,
                SessionSummary {
                    cost_usd: Some(0.05),
                    total_tokens: Some(1500),
                    duration_ms: Some(600_000),
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.total_tokens, Some(1500));
        assert!(done.completed_at.is_some());
        assert!(!mgr.is_active(&session.id));
    }

    #[tokio::test]
    async fn writes_after_completion_are_invalid_state() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let session = mgr.create_session(&cancel, config("q")).await.unwrap();
        let _ = mgr
            .complete_session(&cancel, &session.id, SessionSummary::default())
            .await
            .unwrap();

        let err = mgr
            .record_event(&cancel, &session.id, message("user", "late"))
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Store(StoreError::InvalidState(_)));

        let err = mgr
            .fail_session(&cancel, &session.id, "boom", SessionSummary::default())
            .await
            .unwrap_err();
        assert_matches!(
            err,
            SessionError::NotActive(_) | SessionError::Store(StoreError::InvalidState(_))
        );

        let err = mgr
            .set_claude_session_id(&cancel, &session.id, "claude-x")
            .await
            .unwrap_err();
        assert_matches!(
            err,
            SessionError::NotActive(_) | SessionError::Store(StoreError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn fail_records_message() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let session = mgr.create_session(&cancel, config("q")).await.unwrap();
        let failed = mgr
            .fail_session(&cancel, &session.id, "Connection timeout", SessionSummary::default())
            .await
            .unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.error_message, "Connection timeout");
        assert_eq!(mgr.active_count(), 0);
    }

    #[tokio::test]
    async fn fail_requires_message() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let session = mgr.create_session(&cancel, config("q")).await.unwrap();
        let err = mgr
            .fail_session(&cancel, &session.id, "", SessionSummary::default())
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::InvalidInput(_));
        assert!(mgr.is_active(&session.id));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let mgr = setup();
        let err = mgr
            .record_event(&CancellationToken::new(), "ghost", message("user", "hi"))
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Store(StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn running_row_not_owned_is_not_active() {
        let store: Arc<dyn ConversationStore> =
            Arc::new(SqliteConversationStore::open_in_memory().unwrap());
        let cancel = CancellationToken::new();
        let first = SessionManager::new(Arc::clone(&store));
        let session = first.create_session(&cancel, config("q")).await.unwrap();

        let second = SessionManager::new(store);
        let err = second
            .record_event(&cancel, &session.id, message("user", "hi"))
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::NotActive(id) if id == session.id);
    }

    #[tokio::test]
    async fn reconcile_fails_orphaned_rows() {
        let store: Arc<dyn ConversationStore> =
            Arc::new(SqliteConversationStore::open_in_memory().unwrap());
        let cancel = CancellationToken::new();
        let crashed = SessionManager::new(Arc::clone(&store));
        let orphan = crashed.create_session(&cancel, config("q")).await.unwrap();

        let fresh = SessionManager::new(store);
        let own = fresh.create_session(&cancel, config("mine")).await.unwrap();
        assert_eq!(fresh.reconcile_orphans(&cancel).await.unwrap(), 1);

        let orphan = fresh.get_session(&cancel, &orphan.id).await.unwrap();
        assert_eq!(orphan.status, SessionStatus::Failed);
        assert_eq!(orphan.error_message, ORPHANED_ERROR_MESSAGE);
        let own = fresh.get_session(&cancel, &own.id).await.unwrap();
        assert_eq!(own.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn continue_inherits_claude_session() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let parent = mgr.create_session(&cancel, config("first")).await.unwrap();
        let _ = mgr
            .set_claude_session_id(&cancel, &parent.id, "claude-789")
            .await
            .unwrap();
        let _ = mgr
            .record_event(&cancel, &parent.id, message("user", "first"))
            .await
            .unwrap();
        let _ = mgr
            .complete_session(&cancel, &parent.id, SessionSummary::default())
            .await
            .unwrap();

        let child = mgr
            .continue_session(
                &cancel,
                &parent.id,
                ContinueConfig {
                    query: "second".into(),
                    ..ContinueConfig::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(child.parent_session_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.claude_session_id.as_deref(), Some("claude-789"));
        assert_eq!(child.model, "claude-3-opus");
        assert!(mgr.is_active(&child.id));

        let _ = mgr
            .record_event(&cancel, &child.id, message("user", "second"))
            .await
            .unwrap();
        let events = mgr
            .store()
            .get_conversation(&cancel, "claude-789")
            .await
            .unwrap();
        let contents: Vec<_> = events.iter().filter_map(|e| e.content.as_deref()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn continue_running_session_rejected() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let parent = mgr.create_session(&cancel, config("first")).await.unwrap();
        let err = mgr
            .continue_session(
                &cancel,
                &parent.id,
                ContinueConfig {
                    query: "again".into(),
                    ..ContinueConfig::default()
                },
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            SessionError::NotActive(_) | SessionError::Store(StoreError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn continue_without_claude_id_rejected() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let parent = mgr.create_session(&cancel, config("first")).await.unwrap();
        let _ = mgr
            .complete_session(&cancel, &parent.id, SessionSummary::default())
            .await
            .unwrap();
        let err = mgr
            .continue_session(
                &cancel,
                &parent.id,
                ContinueConfig {
                    query: "again".into(),
                    ..ContinueConfig::default()
                },
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            SessionError::NotActive(_) | SessionError::Store(StoreError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn shutdown_fails_active_sessions() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let a = mgr.create_session(&cancel, config("a")).await.unwrap();
        let b = mgr.create_session(&cancel, config("b")).await.unwrap();
        let _ = mgr
            .complete_session(&cancel, &b.id, SessionSummary::default())
            .await
            .unwrap();

        assert_eq!(mgr.shutdown(&cancel).await, 1);
        assert_eq!(mgr.active_count(), 0);

        let a = mgr.get_session(&cancel, &a.id).await.unwrap();
        assert_eq!(a.status, SessionStatus::Failed);
        assert_eq!(a.error_message, SHUTDOWN_ERROR_MESSAGE);
        let b = mgr.get_session(&cancel, &b.id).await.unwrap();
        assert_eq!(b.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn list_sessions_delegates() {
        let mgr = setup();
        let cancel = CancellationToken::new();
        let _ = mgr.create_session(&cancel, config("a")).await.unwrap();
        let _ = mgr.create_session(&cancel, config("b")).await.unwrap();
        assert_eq!(mgr.list_sessions(&cancel).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn store_failure_does_not_register() {
        let mut store = MockConversationStore::new();
        let _ = store
            .expect_create_session()
            .times(1)
            .returning(|_, session| Err(StoreError::Conflict(session.id.clone())));
        let mgr = SessionManager::new(Arc::new(store));

        let err = mgr
            .create_session(
                &CancellationToken::new(),
                SessionConfig {
                    session_id: Some("dup".into()),
                    ..config("q")
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Store(StoreError::Conflict(id)) if id == "dup");
        assert_eq!(mgr.active_count(), 0);
    }

    #[tokio::test]
    async fn store_rejection_unregisters_session() {
        let mut store = MockConversationStore::new();
        let _ = store.expect_create_session().returning(|_, _| Ok(()));
        let _ = store
            .expect_update_session_status()
            .times(1)
            .returning(|_, id, _, _| Err(StoreError::InvalidState(format!("session {id} is failed"))));
        let mgr = SessionManager::new(Arc::new(store));
        let cancel = CancellationToken::new();

        let session = mgr.create_session(&cancel, config("q")).await.unwrap();
        let err = mgr
            .complete_session(&cancel, &session.id, SessionSummary::default())
            .await
            .unwrap_err();
        assert_matches!(
            err,
            SessionError::NotActive(_) | SessionError::Store(StoreError::InvalidState(_))
        );
        assert!(!mgr.is_active(&session.id));
    }

    #[tokio::test]
    async fn concurrent_recording_keeps_order() {
        let mgr = Arc::new(setup());
        let cancel = CancellationToken::new();
        let session = mgr.create_session(&cancel, config("q")).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let mgr = Arc::clone(&mgr);
                let id = session.id.clone();
                tokio::spawn(async move {
                    mgr.record_event(&CancellationToken::new(), &id, message("user", &format!("m{i}")))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for joined in futures::future::join_all(tasks).await {
            let _ = joined.unwrap();
        }

        let events = mgr
            .store()
            .get_session_conversation(&cancel, &session.id)
            .await
            .unwrap();
        let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=16).collect::<Vec<_>>());
    }
}
