//! Domain types shared by the store, the session manager and the RPC layer.
//!
//! Wire field names are `snake_case`. Optional fields are omitted from JSON
//! when absent rather than serialized as `null`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a session. Terminal once non-running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The agent run is in progress and accepts new events.
    Running,
    /// The run finished successfully.
    Completed,
    /// The run ended with an error.
    Failed,
}

impl SessionStatus {
    /// String form used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further events or transitions are accepted.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// One tracked run of an AI agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID.
    pub id: String,
    /// Correlates to the external invocation.
    pub run_id: String,
    /// Secondary lookup key assigned by the agent runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_session_id: Option<String>,
    /// Session this one continues, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Prompt that started the run.
    pub query: String,
    /// Model requested for the run.
    #[serde(default)]
    pub model: String,
    /// Working directory of the run.
    #[serde(default)]
    pub working_dir: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Updated on every append and status change.
    pub last_activity_at: DateTime<Utc>,
    /// Set when the session reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Total cost of the run in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// Total tokens consumed by the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i64>,
    /// Wall-clock duration of the run in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Failure description; empty unless `status` is failed. Always on the wire.
    #[serde(default)]
    pub error_message: String,
}

impl Session {
    /// A new running session created now.
    pub fn new(id: impl Into<String>, run_id: impl Into<String>, query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            run_id: run_id.into(),
            claude_session_id: None,
            parent_session_id: None,
            status: SessionStatus::Running,
            query: query.into(),
            model: String::new(),
            working_dir: String::new(),
            created_at: now,
            last_activity_at: now,
            completed_at: None,
            cost_usd: None,
            total_tokens: None,
            duration_ms: None,
            error_message: String::new(),
        }
    }

    /// Set the requested model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    /// Set the claude session ID up front (continuations inherit it).
    #[must_use]
    pub fn with_claude_session_id(mut self, claude_session_id: impl Into<String>) -> Self {
        self.claude_session_id = Some(claude_session_id.into());
        self
    }

    /// Mark this session as continuing `parent_session_id`.
    #[must_use]
    pub fn with_parent(mut self, parent_session_id: impl Into<String>) -> Self {
        self.parent_session_id = Some(parent_session_id.into());
        self
    }
}

/// Values recorded exactly once when a session reaches a terminal status.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionFields {
    /// Completion time; the store uses the current time when absent.
    pub completed_at: Option<DateTime<Utc>>,
    /// Total cost in USD, if known.
    pub cost_usd: Option<f64>,
    /// Total tokens, if known.
    pub total_tokens: Option<i64>,
    /// Duration in milliseconds, if known.
    pub duration_ms: Option<i64>,
    /// Failure description. Only valid for a failed outcome.
    pub error_message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation events
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a conversation event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A user or assistant message.
    Message,
    /// A tool invocation requested by the assistant.
    ToolCall,
    /// The output of an earlier tool invocation.
    ToolResult,
    /// A runtime notice (init, compaction, etc).
    System,
}

impl EventType {
    /// String form used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::System => "system",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "system" => Ok(Self::System),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// One immutable, sequenced record within a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    /// Store-assigned, globally increasing ID.
    pub id: i64,
    /// Owning session.
    pub session_id: String,
    /// Claude session the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_session_id: Option<String>,
    /// Position within the session, starting at 1.
    pub sequence: i64,
    /// Event kind.
    pub event_type: EventType,
    /// Append time.
    pub created_at: DateTime<Utc>,
    /// Message author (`user`, `assistant`, `system`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool call ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    /// Tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Serialized tool input, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input_json: Option<String>,
    /// Tool call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_for_id: Option<String>,
    /// Tool output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_content: Option<String>,
}

/// Input to [`ConversationStore::append_event`](crate::ConversationStore::append_event).
///
/// The store assigns `id`, `sequence` and `created_at`. When
/// `claude_session_id` is `None` the session's current value is used.
#[derive(Clone, Debug, PartialEq)]
pub struct NewConversationEvent {
    /// Owning session.
    pub session_id: String,
    /// Explicit claude session tag.
    pub claude_session_id: Option<String>,
    /// Event kind.
    pub event_type: EventType,
    /// Message author.
    pub role: Option<String>,
    /// Message text.
    pub content: Option<String>,
    /// Tool call ID.
    pub tool_id: Option<String>,
    /// Tool name.
    pub tool_name: Option<String>,
    /// Serialized tool input.
    pub tool_input_json: Option<String>,
    /// Tool call this result answers.
    pub tool_result_for_id: Option<String>,
    /// Tool output.
    pub tool_result_content: Option<String>,
}

impl NewConversationEvent {
    fn empty(session_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            session_id: session_id.into(),
            claude_session_id: None,
            event_type,
            role: None,
            content: None,
            tool_id: None,
            tool_name: None,
            tool_input_json: None,
            tool_result_for_id: None,
            tool_result_content: None,
        }
    }

    /// A message from `role`.
    pub fn message(
        session_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Some(role.into()),
            content: Some(content.into()),
            ..Self::empty(session_id, EventType::Message)
        }
    }

    /// A tool invocation.
    pub fn tool_call(
        session_id: impl Into<String>,
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input_json: impl Into<String>,
    ) -> Self {
        Self {
            role: Some("assistant".into()),
            tool_id: Some(tool_id.into()),
            tool_name: Some(tool_name.into()),
            tool_input_json: Some(tool_input_json.into()),
            ..Self::empty(session_id, EventType::ToolCall)
        }
    }

    /// The result of tool call `tool_id`.
    pub fn tool_result(
        session_id: impl Into<String>,
        tool_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Some("user".into()),
            tool_result_for_id: Some(tool_id.into()),
            tool_result_content: Some(content.into()),
            ..Self::empty(session_id, EventType::ToolResult)
        }
    }

    /// A runtime notice.
    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Some("system".into()),
            content: Some(content.into()),
            ..Self::empty(session_id, EventType::System)
        }
    }

    /// Tag the event with an explicit claude session ID.
    #[must_use]
    pub fn with_claude_session_id(mut self, claude_session_id: impl Into<String>) -> Self {
        self.claude_session_id = Some(claude_session_id.into());
        self
    }

    /// Check that the fields required by `event_type` are present.
    pub fn validate(&self) -> Result<(), String> {
        if self.session_id.is_empty() {
            return Err("session_id is required".into());
        }
        let missing = match self.event_type {
            EventType::Message if self.role.is_none() => Some("role"),
            EventType::ToolCall if self.tool_name.is_none() => Some("tool_name"),
            EventType::ToolResult if self.tool_result_for_id.is_none() => {
                Some("tool_result_for_id")
            }
            _ => None,
        };
        match missing {
            Some(field) => Err(format!("{} event requires {field}", self.event_type)),
            None => Ok(()),
        }
    }
}
