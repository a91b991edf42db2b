//! Inputs accepted by the session manager.

use hld_store::{CompletionFields, NewConversationEvent};

/// Parameters for a brand-new session.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    /// Prompt that starts the run. Required.
    pub query: String,
    /// Requested model.
    pub model: String,
    /// Working directory of the run.
    pub working_dir: String,
    /// Caller-assigned session ID; generated when absent.
    pub session_id: Option<String>,
    /// External invocation ID; generated when absent.
    pub run_id: Option<String>,
}

/// Parameters for continuing a finished session.
#[derive(Clone, Debug, Default)]
pub struct ContinueConfig {
    /// Follow-up prompt. Required.
    pub query: String,
    /// Model override; inherits the parent's when absent.
    pub model: Option<String>,
    /// Working directory override; inherits the parent's when absent.
    pub working_dir: Option<String>,
    /// External invocation ID; generated when absent.
    pub run_id: Option<String>,
}

/// Outcome metrics reported when a run ends. Unknown values stay `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionSummary {
    /// Total cost in USD.
    pub cost_usd: Option<f64>,
    /// Total tokens consumed.
    pub total_tokens: Option<i64>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<i64>,
}

impl SessionSummary {
    pub(crate) fn into_completion(self, error_message: Option<String>) -> CompletionFields {
        CompletionFields {
            completed_at: None,
            cost_usd: self.cost_usd,
            total_tokens: self.total_tokens,
            duration_ms: self.duration_ms,
            error_message,
        }
    }
}

/// One observation from the agent runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum EventInput {
    /// A user or assistant message.
    Message {
        /// Author.
        role: String,
        /// Text.
        content: String,
    },
    /// A tool invocation.
    ToolCall {
        /// Tool call ID.
        tool_id: String,
        /// Tool name.
        tool_name: String,
        /// Serialized input, stored verbatim.
        input_json: String,
    },
    /// The output of a tool invocation.
    ToolResult {
        /// Tool call this answers.
        tool_id: String,
        /// Output.
        content: String,
    },
    /// A runtime notice.
    System {
        /// Text.
        content: String,
    },
}

impl EventInput {
    pub(crate) fn into_new_event(self, session_id: &str) -> NewConversationEvent {
        match self {
            Self::Message { role, content } => {
                NewConversationEvent::message(session_id, role, content)
            }
            Self::ToolCall {
                tool_id,
                tool_name,
                input_json,
            } => NewConversationEvent::tool_call(session_id, tool_id, tool_name, input_json),
            Self::ToolResult { tool_id, content } => {
                NewConversationEvent::tool_result(session_id, tool_id, content)
            }
            Self::System { content } => NewConversationEvent::system(session_id, content),
        }
    }
}
