//! Executor that runs agents as single chat completions against the
//! configured model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use genai::Client;
use genai::chat::{ChatMessage, ChatRequest};
use serde_json::json;
use uuid::Uuid;

use super::{AgentHandle, ExecutionOutcome, Executor};
use crate::error::ExecutorError;
use crate::llm::{LlmSettings, complete, probe_endpoint};
use crate::registry::{AgentRecord, AgentStatus, DEFAULT_FRAMEWORK};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant collaborating with other agents on a shared task.";

pub struct LlmExecutor {
    client: Client,
    settings: LlmSettings,
    /// Live handles and whether each is mid-call.
    handles: Arc<Mutex<HashMap<String, bool>>>,
}

impl LlmExecutor {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            client: Client::default(),
            settings,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn set_busy(&self, handle_id: &str, busy: bool) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flag) = handles.get_mut(handle_id) {
            *flag = busy;
        }
    }

    /// Model to use for one agent: `config.model` overrides the default.
    fn model_for(&self, agent: &AgentRecord) -> LlmSettings {
        let mut settings = self.settings.clone();
        if let Some(model) = agent.config.get("model").and_then(|v| v.as_str()) {
            settings.model = model.to_string();
        }
        if let Some(temperature) = agent.config.get("temperature").and_then(|v| v.as_f64()) {
            settings.temperature = temperature;
        }
        settings
    }
}

/// Task text with earlier contributions appended, if there are any.
pub fn compose_prompt(task: &str, transcript: &str) -> String {
    if !transcript.contains("## Message from") {
        return task.to_string();
    }
    format!(
        "{task}\n\n### PREVIOUS CONTRIBUTIONS FROM OTHER AGENTS ###\n\n{}\n\n\
         IMPORTANT: Consider the above previous contributions when responding to this task. \
         Your response should build upon the work already done by other agents.",
        transcript.trim()
    )
}

#[async_trait]
impl Executor for LlmExecutor {
    fn framework(&self) -> &str {
        DEFAULT_FRAMEWORK
    }

    async fn initialize(&self, agent: &AgentRecord) -> Result<AgentHandle, ExecutorError> {
        if agent.name.trim().is_empty() {
            return Err(ExecutorError::InitializationFailure {
                agent_id: agent.id.clone(),
                reason: "agent has no name".to_string(),
            });
        }
        let handle_id = Uuid::new_v4().to_string();
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle_id.clone(), false);
        tracing::debug!(agent_id = %agent.id, handle_id = %handle_id, "Initialized LLM agent");
        Ok(AgentHandle {
            handle_id,
            agent: agent.clone(),
        })
    }

    async fn execute(
        &self,
        handle: &AgentHandle,
        task: &str,
        transcript: &str,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let agent = &handle.agent;
        let settings = self.model_for(agent);
        let system_prompt = if agent.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            agent.system_prompt.as_str()
        };

        let request = ChatRequest::from_system(system_prompt)
            .append_message(ChatMessage::user(compose_prompt(task, transcript)));

        tracing::info!(agent_id = %agent.id, model = %settings.model, "Executing LLM agent");
        self.set_busy(&handle.handle_id, true);
        let reply = complete(&self.client, &settings, request).await;
        self.set_busy(&handle.handle_id, false);

        let content = reply.map_err(|reason| ExecutorError::ExecutionFailure {
            agent_id: agent.id.clone(),
            reason,
        })?;
        Ok(ExecutionOutcome::completed(content.clone()).with_raw(json!({
            "agent_name": agent.name,
            "model": settings.model,
            "response": content,
        })))
    }

    async fn status(&self, handle: &AgentHandle) -> AgentStatus {
        let busy = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle.handle_id)
            .copied();
        match busy {
            None => AgentStatus::Offline,
            Some(true) => AgentStatus::Busy,
            Some(false) if probe_endpoint(&self.settings.base_url).await => AgentStatus::Ready,
            Some(false) => AgentStatus::Offline,
        }
    }

    async fn terminate(&self, handle: &AgentHandle) -> bool {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.handle_id)
            .is_some()
    }
}
