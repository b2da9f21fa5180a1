//! HTTP surface over the registry, hub and supervisor.

pub mod extract;
pub mod handlers;
pub mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use serde_json::{Value, json};

use crate::error::{ErrorKind, SupervisorError};
use crate::orchestration::CollaborationDriver;
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    pub driver: CollaborationDriver,
    /// Replace internal error messages with a generic one.
    pub production: bool,
}

impl AppState {
    pub fn new(driver: CollaborationDriver, production: bool) -> Self {
        Self {
            supervisor: driver.supervisor().clone(),
            driver,
            production,
        }
    }
}

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message.into() } })),
    )
}

/// Map a core error onto a status code and error body.
pub fn error_response(err: SupervisorError, production: bool) -> ApiError {
    if let SupervisorError::NoSuitableAgents(_) = err {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "no_suitable_agents", err.to_string());
    }
    match err.kind() {
        ErrorKind::NotFound => api_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ErrorKind::InvalidInput => {
            api_error(StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        ErrorKind::ExternalFailure => {
            api_error(StatusCode::BAD_GATEWAY, "external_failure", err.to_string())
        }
        ErrorKind::Internal => {
            tracing::error!(error = %err, "Internal error while handling request");
            let message = if production {
                "internal server error".to_string()
            } else {
                err.to_string()
            };
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::welcome))
        .route("/health", get(handlers::health))
        .route("/agents", post(handlers::register_agent).get(handlers::list_agents))
        .route(
            "/agents/{agent_id}",
            get(handlers::get_agent).delete(handlers::delete_agent),
        )
        .route("/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route("/tasks/run", post(handlers::run_task))
        .route("/tasks/{session_id}", get(handlers::task_status))
        .route("/tasks/{session_id}/execute", post(handlers::execute_task))
        .route("/tasks/{session_id}/terminate", post(handlers::terminate_task))
        .route(
            "/tasks/{session_id}/messages",
            post(handlers::send_message).get(handlers::list_messages),
        )
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind server listener")?;
    tracing::info!(%addr, production = state.production, "API listening");
    axum::serve(listener, build_router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failed")
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
