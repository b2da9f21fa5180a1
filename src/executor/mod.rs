//! Executors run agents inside their backing framework.
//!
//! Each supported framework provides one [`Executor`]. The driver looks the
//! executor up in an [`ExecutorRegistry`] by the agent's `framework` tag and
//! never sees framework-specific types.

pub mod llm;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use llm::LlmExecutor;

use crate::error::ExecutorError;
use crate::registry::{AgentRecord, AgentStatus};

/// Opaque token for an initialized agent.
#[derive(Clone, Debug)]
pub struct AgentHandle {
    pub handle_id: String,
    pub agent: AgentRecord,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => f.write_str("completed"),
            ExecutionStatus::Error => f.write_str("error"),
        }
    }
}

/// What an agent produced for one turn.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionOutcome {
    pub content: String,
    pub status: ExecutionStatus,
    /// Framework-specific payload, passed through untouched.
    pub raw: Value,
}

impl ExecutionOutcome {
    pub fn completed(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: ExecutionStatus::Completed,
            raw: Value::Null,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: ExecutionStatus::Error,
            raw: Value::Null,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}

/// Adapter for one agent-execution framework.
///
/// Calls may block for as long as the framework takes; timeouts are the
/// implementation's business.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Tag matched against [`AgentRecord::framework`].
    fn framework(&self) -> &str;

    async fn initialize(&self, agent: &AgentRecord) -> Result<AgentHandle, ExecutorError>;

    async fn execute(
        &self,
        handle: &AgentHandle,
        task: &str,
        transcript: &str,
    ) -> Result<ExecutionOutcome, ExecutorError>;

    async fn status(&self, handle: &AgentHandle) -> AgentStatus;

    /// Release the handle. Returns `false` if it was unknown.
    async fn terminate(&self, handle: &AgentHandle) -> bool;
}

/// Lookup table from framework tag to executor.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an executor under its own framework tag, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let tag = executor.framework().to_string();
        if self.executors.insert(tag.clone(), executor).is_some() {
            tracing::warn!(framework = %tag, "Replaced executor");
        }
    }

    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    pub fn resolve(&self, framework: &str) -> Result<Arc<dyn Executor>, ExecutorError> {
        self.executors
            .get(framework)
            .cloned()
            .ok_or_else(|| ExecutorError::UnsupportedFramework(framework.to_string()))
    }

    pub fn frameworks(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        fn framework(&self) -> &str {
            "echo"
        }

        async fn initialize(&self, agent: &AgentRecord) -> Result<AgentHandle, ExecutorError> {
            Ok(AgentHandle {
                handle_id: "h".into(),
                agent: agent.clone(),
            })
        }

        async fn execute(
            &self,
            _handle: &AgentHandle,
            task: &str,
            _transcript: &str,
        ) -> Result<ExecutionOutcome, ExecutorError> {
            Ok(ExecutionOutcome::completed(task))
        }

        async fn status(&self, _handle: &AgentHandle) -> AgentStatus {
            AgentStatus::Ready
        }

        async fn terminate(&self, _handle: &AgentHandle) -> bool {
            true
        }
    }

    #[test]
    fn resolve_known_and_unknown_frameworks() {
        let registry = ExecutorRegistry::new().with(Arc::new(Echo));
        assert!(registry.resolve("echo").is_ok());
        assert!(matches!(
            registry.resolve("crewai"),
            Err(ExecutorError::UnsupportedFramework(tag)) if tag == "crewai"
        ));
        assert_eq!(registry.frameworks(), vec!["echo"]);
    }

    #[test]
    fn outcome_constructors() {
        let outcome = ExecutionOutcome::error("bad").with_raw(serde_json::json!({"code": 1}));
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.raw["code"], 1);
    }
}
