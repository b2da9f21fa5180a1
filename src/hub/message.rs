//! Messages exchanged inside a collaboration session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Sender id reserved for the hub and the supervisor.
pub const SYSTEM_SENDER: &str = "system";

/// Who authored a message, derived once when the message is appended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    System,
    Agent,
}

/// One entry of a session's append-only log. Never mutated after append.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: SenderRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_framework: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// Build a message, deriving `sender_role` and `sender_framework`.
    ///
    /// The role is `System` when the sender id is [`SYSTEM_SENDER`] or the
    /// metadata carries `"type": "system"`; the framework comes from a string
    /// `"framework"` metadata entry. An empty sender name falls back to the id.
    pub fn new(
        session_id: &str,
        content: impl Into<String>,
        sender_id: &str,
        sender_name: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Self {
        let metadata = metadata.unwrap_or_default();
        let is_system = sender_id == SYSTEM_SENDER
            || metadata.get("type").and_then(Value::as_str) == Some("system");
        let sender_framework = metadata
            .get("framework")
            .and_then(Value::as_str)
            .map(str::to_string);
        let sender_name = if sender_name.is_empty() { sender_id } else { sender_name };

        Self {
            message_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content: content.into(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            sender_role: if is_system { SenderRole::System } else { SenderRole::Agent },
            sender_framework,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Framework label for transcripts: the derived tag, else raw metadata.
    pub fn framework(&self) -> Option<&str> {
        self.sender_framework
            .as_deref()
            .or_else(|| self.metadata.get("framework").and_then(Value::as_str))
    }

    /// Render as a `## Message from <name>` prompt block.
    ///
    /// `content` replaces the stored content so callers can render a
    /// truncated view without touching the log.
    pub(crate) fn render(&self, content: &str, include_framework: bool) -> String {
        let framework_info = match self.framework() {
            Some(fw) if include_framework => format!(" [Framework: {fw}]"),
            _ => String::new(),
        };
        format!("## Message from {}{framework_info}:\n{content}", self.sender_name)
    }
}
