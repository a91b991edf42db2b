//! Session repository: lifecycle rows and the claude-session secondary key.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Timestamp;
use crate::errors::Result;
use crate::types::{Session, SessionStatus};

/// Terminal values written by [`SessionRepo::finalize`].
pub struct Finalize<'a> {
    /// Terminal status.
    pub status: SessionStatus,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
    /// Total cost in USD.
    pub cost_usd: Option<f64>,
    /// Total tokens.
    pub total_tokens: Option<i64>,
    /// Duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Failure description, empty for successful runs.
    pub error_message: &'a str,
}

/// Session repository. Stateless; every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a session row as given.
    pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (id, run_id, claude_session_id, parent_session_id, status,
             query, model, working_dir, created_at, last_activity_at, completed_at,
             cost_usd, total_tokens, duration_ms, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                session.id,
                session.run_id,
                session.claude_session_id,
                session.parent_session_id,
                session.status,
                session.query,
                session.model,
                session.working_dir,
                Timestamp(session.created_at),
                Timestamp(session.last_activity_at),
                session.completed_at.map(Timestamp),
                session.cost_usd,
                session.total_tokens,
                session.duration_ms,
                session.error_message,
            ],
        )?;
        Ok(())
    }

    /// Get session by ID.
    pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
        let row = conn
            .query_row(
                "SELECT * FROM sessions WHERE id = ?1",
                params![session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Whether a session with this ID exists.
    pub fn exists(conn: &Connection, session_id: &str) -> Result<bool> {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Whether any session carries this claude session ID.
    pub fn exists_for_claude_session(conn: &Connection, claude_session_id: &str) -> Result<bool> {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE claude_session_id = ?1)",
            params![claude_session_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// All sessions, most recent activity first.
    pub fn list(conn: &Connection) -> Result<Vec<Session>> {
        let mut stmt =
            conn.prepare("SELECT * FROM sessions ORDER BY last_activity_at DESC, rowid DESC")?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Bump `last_activity_at`.
    pub fn touch(conn: &Connection, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sessions SET last_activity_at = ?1 WHERE id = ?2",
            params![Timestamp(at), session_id],
        )?;
        Ok(())
    }

    /// Set the claude session ID and bump activity.
    pub fn set_claude_session_id(
        conn: &Connection,
        session_id: &str,
        claude_session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sessions SET claude_session_id = ?1, last_activity_at = ?2 WHERE id = ?3",
            params![claude_session_id, Timestamp(at), session_id],
        )?;
        Ok(())
    }

    /// Write terminal status and completion fields.
    ///
    /// The `status = 'running'` guard keeps completion write-once even if a
    /// caller skipped the state check.
    pub fn finalize(conn: &Connection, session_id: &str, values: &Finalize<'_>) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, completed_at = ?2, cost_usd = ?3,
             total_tokens = ?4, duration_ms = ?5, error_message = ?6, last_activity_at = ?7
             WHERE id = ?8 AND status = 'running'",
            params![
                values.status,
                Timestamp(values.completed_at),
                values.cost_usd,
                values.total_tokens,
                values.duration_ms,
                values.error_message,
                Timestamp(Utc::now()),
                session_id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
        Ok(Session {
            id: row.get("id")?,
            run_id: row.get("run_id")?,
            claude_session_id: row.get("claude_session_id")?,
            parent_session_id: row.get("parent_session_id")?,
            status: row.get("status")?,
            query: row.get("query")?,
            model: row.get("model")?,
            working_dir: row.get("working_dir")?,
            created_at: row.get::<_, Timestamp>("created_at")?.0,
            last_activity_at: row.get::<_, Timestamp>("last_activity_at")?.0,
            completed_at: row
                .get::<_, Option<Timestamp>>("completed_at")?
                .map(|ts| ts.0),
            cost_usd: row.get("cost_usd")?,
            total_tokens: row.get("total_tokens")?,
            duration_ms: row.get("duration_ms")?,
            error_message: row.get("error_message")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_and_get() {
        let conn = setup();
        let session = Session::new("sess-1", "run-1", "write a parser")
            .with_model("claude-3-opus")
            .with_working_dir("/home/user/project");
        SessionRepo::insert(&conn, &session).unwrap();

        let loaded = SessionRepo::get_by_id(&conn, "sess-1").unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = setup();
        assert!(SessionRepo::get_by_id(&conn, "nope").unwrap().is_none());
        assert!(!SessionRepo::exists(&conn, "nope").unwrap());
    }

    #[test]
    fn claude_session_lookup() {
        let conn = setup();
        let session = Session::new("sess-1", "run-1", "q").with_claude_session_id("claude-1");
        SessionRepo::insert(&conn, &session).unwrap();

        assert!(SessionRepo::exists_for_claude_session(&conn, "claude-1").unwrap());
        assert!(!SessionRepo::exists_for_claude_session(&conn, "claude-2").unwrap());
    }

    #[test]
    fn finalize_is_write_once() {
        let conn = setup();
        SessionRepo::insert(&conn, &Session::new("sess-1", "run-1", "q")).unwrap();

        let first = Finalize {
            status: SessionStatus::Completed,
            completed_at: Utc::now(),
            cost_usd: Some(0.05),
            total_tokens: Some(1500),
            duration_ms: Some(600_000),
            error_message: "",
        };
        assert!(SessionRepo::finalize(&conn, "sess-1", &first).unwrap());

        let second = Finalize {
            status: SessionStatus::Failed,
            error_message: "late",
            ..first
        };
        assert!(!SessionRepo::finalize(&conn, "sess-1", &second).unwrap());

        let loaded = SessionRepo::get_by_id(&conn, "sess-1").unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.total_tokens, Some(1500));
        assert!(loaded.error_message.is_empty());
    }

    #[test]
    fn list_orders_by_recent_activity() {
        let conn = setup();
        SessionRepo::insert(&conn, &Session::new("old", "r1", "q")).unwrap();
        SessionRepo::insert(&conn, &Session::new("new", "r2", "q")).unwrap();
        SessionRepo::touch(&conn, "old", Utc::now() + chrono::Duration::seconds(5)).unwrap();

        let ids: Vec<String> = SessionRepo::list(&conn)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["old", "new"]);
    }
}
