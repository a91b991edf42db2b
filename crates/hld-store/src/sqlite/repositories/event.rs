//! Event repository: insert and ordered reads over `conversation_events`.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Timestamp;
use crate::errors::Result;
use crate::types::{ConversationEvent, NewConversationEvent};

const EVENT_COLUMNS: &str = "e.id, e.session_id, e.claude_session_id, e.sequence, e.event_type,
     e.created_at, e.role, e.content, e.tool_id, e.tool_name, e.tool_input_json,
     e.tool_result_for_id, e.tool_result_content";

/// Event repository. Stateless; every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Insert an event at `sequence` and return the stored row.
    pub fn insert(
        conn: &Connection,
        event: &NewConversationEvent,
        sequence: i64,
        claude_session_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<ConversationEvent> {
        let _ = conn.execute(
            "INSERT INTO conversation_events (session_id, claude_session_id, sequence, event_type,
             created_at, role, content, tool_id, tool_name, tool_input_json,
             tool_result_for_id, tool_result_content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                event.session_id,
                claude_session_id,
                sequence,
                event.event_type,
                Timestamp(created_at),
                event.role,
                event.content,
                event.tool_id,
                event.tool_name,
                event.tool_input_json,
                event.tool_result_for_id,
                event.tool_result_content,
            ],
        )?;

        Ok(ConversationEvent {
            id: conn.last_insert_rowid(),
            session_id: event.session_id.clone(),
            claude_session_id,
            sequence,
            event_type: event.event_type,
            created_at,
            role: event.role.clone(),
            content: event.content.clone(),
            tool_id: event.tool_id.clone(),
            tool_name: event.tool_name.clone(),
            tool_input_json: event.tool_input_json.clone(),
            tool_result_for_id: event.tool_result_for_id.clone(),
            tool_result_content: event.tool_result_content.clone(),
        })
    }

    /// Next sequence number for a session (1 for an empty session).
    pub fn get_next_sequence(conn: &Connection, session_id: &str) -> Result<i64> {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(sequence) FROM conversation_events WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max.unwrap_or(0) + 1)
    }

    /// Events of one session in ascending sequence order.
    pub fn list_by_session(conn: &Connection, session_id: &str) -> Result<Vec<ConversationEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM conversation_events e
             WHERE e.session_id = ?1
             ORDER BY e.sequence ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Events reachable through a claude session ID.
    ///
    /// Covers events of every session carrying the ID plus events explicitly
    /// tagged with it, ordered by owning session creation time, session
    /// insertion order, then sequence.
    pub fn list_by_claude_session(
        conn: &Connection,
        claude_session_id: &str,
    ) -> Result<Vec<ConversationEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM conversation_events e
             JOIN sessions s ON s.id = e.session_id
             WHERE s.claude_session_id = ?1 OR e.claude_session_id = ?1
             ORDER BY s.created_at ASC, s.rowid ASC, e.sequence ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![claude_session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether any event is tagged with this claude session ID.
    pub fn exists_for_claude_session(conn: &Connection, claude_session_id: &str) -> Result<bool> {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversation_events WHERE claude_session_id = ?1)",
            params![claude_session_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationEvent> {
        Ok(ConversationEvent {
            id: row.get(0)?,
            session_id: row.get(1)?,
            claude_session_id: row.get(2)?,
            sequence: row.get(3)?,
            event_type: row.get(4)?,
            created_at: row.get::<_, Timestamp>(5)?.0,
            role: row.get(6)?,
            content: row.get(7)?,
            tool_id: row.get(8)?,
            tool_name: row.get(9)?,
            tool_input_json: row.get(10)?,
            tool_result_for_id: row.get(11)?,
            tool_result_content: row.get(12)?,
        })
    }
}
