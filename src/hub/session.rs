//! Collaboration sessions and transcript rendering.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::message::{Message, SYSTEM_SENDER};
use crate::registry::AgentId;

/// Header that opens every formatted transcript.
pub const TRANSCRIPT_HEADER: &str = "\n\n### CONVERSATION HISTORY ###\n\n";

/// Default per-message character cap in transcripts.
pub const DEFAULT_MAX_CHARS_PER_MESSAGE: usize = 5000;

/// Hub-side lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Executing,
    Terminated,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Executing => "executing",
            SessionStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// A bounded conversation among a fixed set of agents.
#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: String,
    pub task: String,
    pub participants: Vec<AgentId>,
    pub messages: Vec<Message>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Read-only summary returned by listing and lookup calls.
#[derive(Clone, Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub task: String,
    pub participants: Vec<AgentId>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    /// Distinct non-system senders seen so far.
    pub unique_participants: usize,
}

/// Controls how [`Session::format_transcript`] renders the log.
#[derive(Clone, Debug)]
pub struct TranscriptOptions {
    pub exclude_senders: HashSet<String>,
    pub include_framework: bool,
    /// Keep only the most recent N retained messages. `None` or `Some(0)`
    /// keeps everything.
    pub max_messages: Option<usize>,
    pub max_chars_per_message: usize,
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self {
            exclude_senders: HashSet::from([SYSTEM_SENDER.to_string()]),
            include_framework: false,
            max_messages: None,
            max_chars_per_message: DEFAULT_MAX_CHARS_PER_MESSAGE,
        }
    }
}

impl TranscriptOptions {
    pub fn with_framework(mut self, include: bool) -> Self {
        self.include_framework = include;
        self
    }

    pub fn with_max_messages(mut self, max: Option<usize>) -> Self {
        self.max_messages = max;
        self
    }

    pub fn with_max_chars(mut self, max: usize) -> Self {
        self.max_chars_per_message = max;
        self
    }

    pub fn excluding<I, S>(mut self, senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_senders = senders.into_iter().map(Into::into).collect();
        self
    }
}

impl Session {
    pub(crate) fn new(session_id: String, task: String, participants: Vec<AgentId>) -> Self {
        Self {
            session_id,
            task,
            participants,
            messages: Vec::new(),
            status: SessionStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != SessionStatus::Terminated
    }

    pub fn info(&self) -> SessionInfo {
        let unique: BTreeSet<&str> = self
            .messages
            .iter()
            .filter(|m| m.sender_id != SYSTEM_SENDER)
            .map(|m| m.sender_id.as_str())
            .collect();
        SessionInfo {
            session_id: self.session_id.clone(),
            task: self.task.clone(),
            participants: self.participants.clone(),
            status: self.status,
            created_at: self.created_at,
            message_count: self.messages.len(),
            unique_participants: unique.len(),
        }
    }

    /// Render the log as prompt context for the next agent.
    pub fn format_transcript(&self, options: &TranscriptOptions) -> String {
        let retained: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| !options.exclude_senders.contains(&m.sender_id))
            .collect();

        let start = match options.max_messages {
            Some(max) if max > 0 => retained.len().saturating_sub(max),
            _ => 0,
        };

        let mut out = String::from(TRANSCRIPT_HEADER);
        for msg in &retained[start..] {
            let content = truncate_content(&msg.content, options.max_chars_per_message);
            if content.len() != msg.content.len() {
                tracing::debug!(
                    session_id = %self.session_id,
                    sender = %msg.sender_name,
                    length = msg.content.chars().count(),
                    "Truncated message in transcript"
                );
            }
            out.push_str(&msg.render(&content, options.include_framework));
            out.push_str("\n\n");
        }
        out
    }
}

/// Cut `content` to `max_chars` characters, marking the cut with the original
/// length. Counts and cuts on `char` boundaries.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }
    let cut = content
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(content.len());
    format!("{}...[truncated, {total} chars total]", &content[..cut])
}
