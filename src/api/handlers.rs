use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::extract::ApiJson;
use super::{ApiError, ApiResult, AppState, api_error, error_response};
use crate::error::{RegistryError, SupervisorError};
use crate::hub::Message;
use crate::orchestration::ExecutionReport;
use crate::registry::{AgentId, AgentRecord};
use crate::supervisor::{CollaborationInfo, MonitorReport, TaskAnalysis};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agents: usize,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct AgentRegistered {
    pub agent_id: AgentId,
    pub agent: AgentRecord,
}

#[derive(Debug, Deserialize)]
pub struct AgentQuery {
    pub capability: Option<String>,
    pub framework: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task: String,
}

#[derive(Debug, Serialize)]
pub struct TaskCreated {
    pub session_id: String,
    pub task: String,
    pub analysis: TaskAnalysis,
    pub agents: Vec<AgentId>,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// Run a collaboration on its own task so a panicking executor surfaces as
/// an internal error instead of dropping the connection.
async fn drive(state: &AppState, session_id: String) -> Result<ExecutionReport, SupervisorError> {
    let driver = state.driver.clone();
    tokio::spawn(async move { driver.run(&session_id).await })
        .await
        .map_err(|e| SupervisorError::Internal(format!("collaboration run failed: {e}")))?
}

pub async fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", "no such route")
}

pub async fn welcome() -> Json<Value> {
    Json(json!({
        "name": "ams",
        "version": env!("CARGO_PKG_VERSION"),
        "message": "Multi-agent collaboration supervisor",
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agents: state.supervisor.registry().len(),
        active_sessions: state.supervisor.hub().list_sessions(false).len(),
    })
}

pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    ApiJson(agent): ApiJson<AgentRecord>,
) -> ApiResult<AgentRegistered> {
    if agent.name.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            "agent name cannot be empty",
        ));
    }
    let registry = state.supervisor.registry();
    let agent_id = registry.register(agent);
    let agent = registry.get(&agent_id).ok_or_else(|| {
        error_response(RegistryError::AgentNotFound(agent_id.clone()).into(), state.production)
    })?;
    Ok(Json(AgentRegistered { agent_id, agent }))
}

pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AgentQuery>,
) -> Json<Vec<AgentRecord>> {
    let registry = state.supervisor.registry();
    let agents = match (query.capability, query.framework) {
        (Some(capability), _) => registry.find_by_capability(&capability),
        (None, Some(framework)) => registry.find_by_framework(&framework),
        (None, None) => registry.list(),
    };
    Json(agents)
}

pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<AgentRecord> {
    state
        .supervisor
        .registry()
        .get(&agent_id)
        .map(Json)
        .ok_or_else(|| error_response(RegistryError::AgentNotFound(agent_id).into(), state.production))
}

pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Value> {
    if !state.supervisor.registry().delete(&agent_id) {
        return Err(error_response(
            RegistryError::AgentNotFound(agent_id).into(),
            state.production,
        ));
    }
    Ok(Json(json!({ "agent_id": agent_id, "deleted": true })))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TaskRequest>,
) -> ApiResult<TaskCreated> {
    let created = state
        .driver
        .create_task(&request.task)
        .await
        .map_err(|e| error_response(e, state.production))?;
    Ok(Json(TaskCreated {
        session_id: created.session_id,
        task: request.task,
        analysis: created.analysis,
        agents: created.agents.into_iter().map(|a| a.id).collect(),
        status: "created",
    }))
}

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<CollaborationInfo>> {
    Json(state.supervisor.list_collaborations())
}

pub async fn run_task(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TaskRequest>,
) -> ApiResult<ExecutionReport> {
    let created = state
        .driver
        .create_task(&request.task)
        .await
        .map_err(|e| error_response(e, state.production))?;
    drive(&state, created.session_id)
        .await
        .map(Json)
        .map_err(|e| error_response(e, state.production))
}

pub async fn execute_task(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<ExecutionReport> {
    drive(&state, session_id)
        .await
        .map(Json)
        .map_err(|e| error_response(e, state.production))
}

pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<MonitorReport> {
    state
        .supervisor
        .monitor_collaboration(&session_id)
        .map(Json)
        .map_err(|e| error_response(e, state.production))
}

pub async fn terminate_task(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    state
        .supervisor
        .terminate_collaboration(&session_id)
        .map_err(|e| error_response(e, state.production))?;
    Ok(Json(json!({ "session_id": session_id, "status": "terminated" })))
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    ApiJson(request): ApiJson<MessageRequest>,
) -> ApiResult<Message> {
    let sender_name = request
        .sender_name
        .unwrap_or_else(|| request.sender_id.clone());
    state
        .supervisor
        .hub()
        .send_message(
            &session_id,
            &request.content,
            &request.sender_id,
            &sender_name,
            request.metadata,
        )
        .map(Json)
        .map_err(|e| error_response(e.into(), state.production))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Vec<Message>> {
    state
        .supervisor
        .hub()
        .get_history(&session_id)
        .map(Json)
        .map_err(|e| error_response(e.into(), state.production))
}
