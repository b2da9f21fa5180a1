use std::path::PathBuf;

/// Coarse error taxonomy shared by every core subsystem.
///
/// The API layer maps these onto HTTP status codes; the driver uses them to
/// decide whether a failure is recoverable (recorded in the transcript) or
/// must be surfaced to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown agent or session id. Never retried internally.
    NotFound,
    /// Caller supplied something unusable. Never retried internally.
    InvalidInput,
    /// A collaborator (task analyzer, executor) failed.
    ExternalFailure,
    /// Anything else.
    Internal,
}

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors raised by the agent registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Agent with ID '{0}' not found")]
    AgentNotFound(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::AgentNotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Errors raised by the communication hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Session with ID '{0}' not found")]
    SessionNotFound(String),

    #[error("Cannot create session with empty agents list")]
    EmptyParticipants,

    #[error("Session '{0}' is closed and cannot receive messages")]
    SessionClosed(String),
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::SessionNotFound(_) => ErrorKind::NotFound,
            HubError::EmptyParticipants | HubError::SessionClosed(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Errors surfaced by a task analyzer collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Task analysis failed: {0}")]
    Failed(String),

    #[error("Task analyzer returned an unusable response: {0}")]
    MalformedResponse(String),
}

/// Errors surfaced by an executor (framework adapter).
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Framework '{0}' is not supported")]
    UnsupportedFramework(String),

    #[error("Failed to initialize agent '{agent_id}': {reason}")]
    InitializationFailure { agent_id: String, reason: String },

    #[error("Execution failed for agent '{agent_id}': {reason}")]
    ExecutionFailure { agent_id: String, reason: String },
}

/// Errors raised by the supervisor and the collaboration driver.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Session with ID '{0}' not found")]
    SessionNotFound(String),

    #[error("No suitable agents found for task: {0}")]
    NoSuitableAgents(String),

    #[error("Cyclic dependency between agents: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Collaboration '{session_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        session_id: String,
        from: String,
        to: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::SessionNotFound(_) => ErrorKind::NotFound,
            SupervisorError::NoSuitableAgents(_)
            | SupervisorError::CyclicDependency { .. }
            | SupervisorError::InvalidInput(_)
            | SupervisorError::InvalidTransition { .. } => ErrorKind::InvalidInput,
            SupervisorError::Internal(_) => ErrorKind::Internal,
            SupervisorError::Registry(e) => e.kind(),
            SupervisorError::Hub(e) => e.kind(),
            SupervisorError::Executor(_) => ErrorKind::ExternalFailure,
        }
    }
}
