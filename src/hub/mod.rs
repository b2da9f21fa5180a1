//! Communication hub: collaboration sessions and their message logs.
//!
//! [`CommunicationHub`] owns every session. The session table sits behind an
//! `RwLock` that is written only to create or delete a session; each session
//! has its own `Mutex`, so appends to one session never wait on another.
//! No lock is held beyond the bounded mutation it protects.

pub mod message;
pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value, json};
use uuid::Uuid;

pub use message::{Message, SYSTEM_SENDER, SenderRole};
pub use session::{Session, SessionInfo, SessionStatus, TranscriptOptions};

use crate::error::HubError;
use crate::registry::AgentId;

#[derive(Default)]
struct SessionTable {
    order: Vec<String>,
    sessions: HashMap<String, Arc<Mutex<Session>>>,
}

/// Owner of all collaboration sessions. Cheap to clone.
#[derive(Clone, Default)]
pub struct CommunicationHub {
    table: Arc<RwLock<SessionTable>>,
}

fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn system_metadata(action: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("type".into(), json!("system"));
    meta.insert("action".into(), json!(action));
    meta
}

impl CommunicationHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against one session while holding only that session's lock.
    fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> Result<T, HubError>,
    ) -> Result<T, HubError> {
        let table = self.read();
        let session = table
            .sessions
            .get(session_id)
            .ok_or_else(|| HubError::SessionNotFound(session_id.to_string()))?;
        let mut session = lock_session(session);
        f(&mut session)
    }

    /// Open a session and seed it with a system kickoff message.
    pub fn create_session(
        &self,
        task: &str,
        participants: Vec<AgentId>,
    ) -> Result<String, HubError> {
        if participants.is_empty() {
            tracing::error!("Cannot create session with empty agents list");
            return Err(HubError::EmptyParticipants);
        }

        let session_id = Uuid::new_v4().to_string();
        let participant_count = participants.len();
        let mut session = Session::new(session_id.clone(), task.to_string(), participants);
        session.messages.push(Message::new(
            &session_id,
            format!("Session started with task: {task}"),
            SYSTEM_SENDER,
            "System",
            Some(system_metadata("session_start")),
        ));

        let mut table = self.write();
        table.order.push(session_id.clone());
        table
            .sessions
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));

        tracing::info!(session_id = %session_id, agents = participant_count, "Created session");
        Ok(session_id)
    }

    /// Append a message and return the stored copy.
    pub fn send_message(
        &self,
        session_id: &str,
        content: &str,
        sender_id: &str,
        sender_name: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Message, HubError> {
        self.with_session(session_id, |session| {
            if session.status == SessionStatus::Terminated {
                return Err(HubError::SessionClosed(session_id.to_string()));
            }
            let message = Message::new(session_id, content, sender_id, sender_name, metadata);
            session.messages.push(message.clone());
            tracing::debug!(
                session_id = %session_id,
                sender_id = %sender_id,
                role = ?message.sender_role,
                "Message appended"
            );
            Ok(message)
        })
    }

    /// All messages in append order.
    pub fn get_history(&self, session_id: &str) -> Result<Vec<Message>, HubError> {
        self.with_session(session_id, |session| Ok(session.messages.clone()))
    }

    /// Messages from one sender, in append order.
    pub fn messages_by_sender(
        &self,
        session_id: &str,
        sender_id: &str,
    ) -> Result<Vec<Message>, HubError> {
        self.with_session(session_id, |session| {
            Ok(session
                .messages
                .iter()
                .filter(|m| m.sender_id == sender_id)
                .cloned()
                .collect())
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionInfo, HubError> {
        self.with_session(session_id, |session| Ok(session.info()))
    }

    /// Render the session log as prompt context. See [`TranscriptOptions`].
    pub fn get_formatted_transcript(
        &self,
        session_id: &str,
        options: &TranscriptOptions,
    ) -> Result<String, HubError> {
        self.with_session(session_id, |session| Ok(session.format_transcript(options)))
    }

    /// Move an active session into `Executing`.
    pub fn mark_executing(&self, session_id: &str) -> Result<(), HubError> {
        self.with_session(session_id, |session| match session.status {
            SessionStatus::Terminated => Err(HubError::SessionClosed(session_id.to_string())),
            _ => {
                session.status = SessionStatus::Executing;
                Ok(())
            }
        })
    }

    /// Return an executing session to `Active`. No-op once terminated.
    pub fn mark_active(&self, session_id: &str) -> Result<(), HubError> {
        self.with_session(session_id, |session| {
            if session.status == SessionStatus::Executing {
                session.status = SessionStatus::Active;
            }
            Ok(())
        })
    }

    /// Close a session. Terminating twice succeeds without side effects.
    pub fn terminate_session(&self, session_id: &str) -> Result<(), HubError> {
        self.with_session(session_id, |session| {
            if session.status == SessionStatus::Terminated {
                return Ok(());
            }
            session.messages.push(Message::new(
                session_id,
                "Session terminated",
                SYSTEM_SENDER,
                "System",
                Some(system_metadata("session_terminate")),
            ));
            session.status = SessionStatus::Terminated;
            tracing::info!(session_id = %session_id, "Terminated session");
            Ok(())
        })
    }

    /// Sessions in creation order; terminated ones only when asked for.
    pub fn list_sessions(&self, include_inactive: bool) -> Vec<SessionInfo> {
        let table = self.read();
        table
            .order
            .iter()
            .filter_map(|id| table.sessions.get(id))
            .map(|s| lock_session(s))
            .filter(|s| include_inactive || s.is_active())
            .map(|s| s.info())
            .collect()
    }

    /// Remove a session from memory entirely. Returns `false` if unknown.
    pub fn delete_session(&self, session_id: &str) -> bool {
        let mut table = self.write();
        if table.sessions.remove(session_id).is_none() {
            tracing::warn!(session_id = %session_id, "Attempted to delete non-existent session");
            return false;
        }
        table.order.retain(|id| id != session_id);
        tracing::info!(session_id = %session_id, "Deleted session from memory");
        true
    }
}
