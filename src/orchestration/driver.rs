//! The driving loop: runs a collaboration's agents one at a time.
//!
//! Agents in one session run strictly in sequence because each agent's prompt
//! is built from the transcript the earlier agents produced. Separate sessions
//! can be driven concurrently from clones of the same driver.
//!
//! No registry, hub or supervisor lock is held across an executor call: the
//! transcript is rendered into an owned `String` first and the result is
//! appended after the call returns.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{ExecutorError, HubError, SupervisorError};
use crate::executor::{ExecutionOutcome, ExecutionStatus, ExecutorRegistry};
use crate::hub::TranscriptOptions;
use crate::registry::{AgentId, AgentRecord};
use crate::supervisor::{CollaborationStatus, Supervisor, TaskAnalysis};

/// What one agent contributed to a run.
#[derive(Clone, Debug, Serialize)]
pub struct AgentRunResult {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub framework: String,
    pub status: ExecutionStatus,
    pub content: String,
    pub raw: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecutionReport {
    pub session_id: String,
    pub task: String,
    pub status: CollaborationStatus,
    /// Agent ids in the order they were scheduled.
    pub order: Vec<AgentId>,
    /// One entry per agent that actually ran.
    pub results: Vec<AgentRunResult>,
}

/// A freshly opened collaboration.
#[derive(Clone, Debug, Serialize)]
pub struct CreatedTask {
    pub session_id: String,
    pub analysis: TaskAnalysis,
    pub agents: Vec<AgentRecord>,
}

#[derive(Clone)]
pub struct CollaborationDriver {
    supervisor: Supervisor,
    executors: Arc<ExecutorRegistry>,
    transcript: TranscriptOptions,
}

fn message_metadata(kind: &str, framework: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("type".into(), json!(kind));
    meta.insert("framework".into(), json!(framework));
    meta
}

impl CollaborationDriver {
    pub fn new(supervisor: Supervisor, executors: ExecutorRegistry) -> Self {
        Self {
            supervisor,
            executors: Arc::new(executors),
            transcript: TranscriptOptions::default().with_framework(true),
        }
    }

    /// Transcript rendering used for agent prompts.
    pub fn with_transcript_options(mut self, options: TranscriptOptions) -> Self {
        self.transcript = options;
        self
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Analyze `task`, select agents and open a collaboration for them.
    pub async fn create_task(&self, task: &str) -> Result<CreatedTask, SupervisorError> {
        if task.trim().is_empty() {
            return Err(SupervisorError::InvalidInput("task must not be empty".to_string()));
        }
        let analysis = self.supervisor.analyze_task(task).await;
        let agents = self.supervisor.select_agents(&analysis)?;
        let session_id = self.supervisor.create_collaboration(&agents, task)?;
        Ok(CreatedTask {
            session_id,
            analysis,
            agents,
        })
    }

    /// [`Self::create_task`] followed by [`Self::run`].
    pub async fn create_and_execute(&self, task: &str) -> Result<ExecutionReport, SupervisorError> {
        let created = self.create_task(task).await?;
        self.run(&created.session_id).await
    }

    /// Run every participant of a collaboration in execution order.
    ///
    /// Executor failures are recorded in the session as error messages and
    /// do not stop the run. Termination takes effect before the next agent
    /// starts.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionReport, SupervisorError> {
        let ticket = self.supervisor.begin_execution(session_id)?;
        let order: Vec<AgentId> = ticket.agents.iter().map(|a| a.id.clone()).collect();
        tracing::info!(session_id = %session_id, ?order, "Starting collaboration run");

        let mut results = Vec::with_capacity(ticket.agents.len());
        for agent in &ticket.agents {
            if ticket.cancel_token.is_cancelled() {
                tracing::info!(session_id = %session_id, "Collaboration terminated; stopping run");
                break;
            }
            match self.step(session_id, &ticket.task, agent).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Collaboration run aborted");
                    self.supervisor.terminate_collaboration(session_id)?;
                    return Err(e);
                }
            }
        }

        let status = self.supervisor.finish_execution(session_id)?;
        tracing::info!(session_id = %session_id, status = %status, agents = results.len(), "Collaboration run finished");
        Ok(ExecutionReport {
            session_id: session_id.to_string(),
            task: ticket.task,
            status,
            order,
            results,
        })
    }

    /// Run one agent and append its contribution. `None` means the session
    /// was closed while the agent was running.
    async fn step(
        &self,
        session_id: &str,
        task: &str,
        agent: &AgentRecord,
    ) -> Result<Option<AgentRunResult>, SupervisorError> {
        let hub = self.supervisor.hub();
        let registry = self.supervisor.registry();
        let transcript = hub.get_formatted_transcript(session_id, &self.transcript)?;

        let leased = match registry.begin_run(&agent.id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(agent_id = %agent.id, error = %e, "Could not mark agent busy");
                false
            }
        };
        let outcome = self.invoke(agent, task, &transcript).await;
        if leased {
            if let Err(e) = registry.end_run(&agent.id) {
                tracing::warn!(agent_id = %agent.id, error = %e, "Could not release agent");
            }
        }

        let (content, status, raw, metadata) = match outcome {
            Ok(outcome) if outcome.status == ExecutionStatus::Completed => {
                let mut meta = message_metadata("agent_response", &agent.framework);
                meta.insert("status".into(), json!(outcome.status));
                (outcome.content, outcome.status, outcome.raw, meta)
            }
            Ok(outcome) => {
                tracing::warn!(agent_id = %agent.id, "Agent reported an error");
                let mut meta = message_metadata("error", &agent.framework);
                meta.insert("error".into(), json!(outcome.content));
                (
                    format!("Error executing agent: {}", outcome.content),
                    ExecutionStatus::Error,
                    outcome.raw,
                    meta,
                )
            }
            Err(e) => {
                tracing::error!(agent_id = %agent.id, error = %e, "Error executing agent");
                let mut meta = message_metadata("error", &agent.framework);
                meta.insert("error".into(), json!(e.to_string()));
                (
                    format!("Error executing agent: {e}"),
                    ExecutionStatus::Error,
                    Value::Null,
                    meta,
                )
            }
        };

        match hub.send_message(session_id, &content, &agent.id, &agent.name, Some(metadata)) {
            Ok(_) => {}
            Err(HubError::SessionClosed(_)) => {
                tracing::info!(session_id = %session_id, agent_id = %agent.id, "Session closed during agent run; result dropped");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Some(AgentRunResult {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            framework: agent.framework.clone(),
            status,
            content,
            raw,
        }))
    }

    async fn invoke(
        &self,
        agent: &AgentRecord,
        task: &str,
        transcript: &str,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let executor = self.executors.resolve(&agent.framework)?;
        let handle = executor.initialize(agent).await?;
        let outcome = executor.execute(&handle, task, transcript).await;
        if !executor.terminate(&handle).await {
            tracing::debug!(agent_id = %agent.id, "Executor had already released the handle");
        }
        outcome
    }
}
