//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use agent_core::{AgentError, SessionId};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
    pub llm_connected: bool,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub tools_used: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn id(&self) -> SessionId {
        SessionId::from_string(self.session_id.as_deref().unwrap_or(DEFAULT_SESSION))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub remote: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsResponse {
    pub session_id: String,
    pub tools: Vec<ToolInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub session_id: String,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Session used by tool endpoints when the caller names none
const DEFAULT_SESSION: &str = "default";

fn api_error(err: &AgentError) -> ApiError {
    let (status, code) = match err {
        AgentError::ToolNotFound(_) => (StatusCode::NOT_FOUND, "TOOL_NOT_FOUND"),
        AgentError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        AgentError::Transport(_) => (StatusCode::BAD_GATEWAY, "LLM_UNAVAILABLE"),
        AgentError::MaxIterations(_) => (StatusCode::UNPROCESSABLE_ENTITY, "TOO_MANY_TOOL_ROUNDS"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR"),
    };
    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_connected = state.client.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: state.client.model().to_string(),
        llm_connected,
        sessions: state.agents.len().await,
    })
}

/// Run one turn for the session, minting a session id when none is given
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Message must not be empty".into(),
                code: "EMPTY_MESSAGE".into(),
            }),
        ));
    }

    let session_id = payload
        .session_id
        .map_or_else(SessionId::new, SessionId::from_string);
    let agent = state.agent(&session_id).await.map_err(|e| api_error(&e))?;

    let outcome = agent
        .lock()
        .await
        .run_query(&payload.message)
        .await
        .map_err(|e| {
            tracing::error!(session = %session_id, error = %e, "Agent error");
            api_error(&e)
        })?;

    Ok(Json(ChatResponse {
        message: outcome.content,
        session_id: session_id.to_string(),
        tools_used: outcome.tools_used,
    }))
}

/// Tools of the session's agent, in registration order
pub async fn list_tools(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ToolsResponse>, ApiError> {
    let session_id = query.id();
    let agent = state.agent(&session_id).await.map_err(|e| api_error(&e))?;
    let agent = agent.lock().await;

    let tools = agent
        .tools()
        .iter()
        .map(|tool| ToolInfo {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            enabled: tool.is_enabled(),
            remote: tool.is_remote(),
        })
        .collect();

    Ok(Json(ToolsResponse {
        session_id: session_id.to_string(),
        tools,
    }))
}

pub async fn enable_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ToggleResponse>, ApiError> {
    toggle_tool(&state, &query.id(), &name, true).await
}

pub async fn disable_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ToggleResponse>, ApiError> {
    toggle_tool(&state, &query.id(), &name, false).await
}

async fn toggle_tool(
    state: &AppState,
    session_id: &SessionId,
    name: &str,
    enabled: bool,
) -> Result<Json<ToggleResponse>, ApiError> {
    let agent = state.agent(session_id).await.map_err(|e| api_error(&e))?;
    let mut agent = agent.lock().await;

    let result = if enabled {
        agent.enable_tool(name)
    } else {
        agent.disable_tool(name)
    };
    result.map_err(|e| api_error(&e))?;
    tracing::info!(session = %session_id, tool = %name, enabled, "Tool toggled");

    Ok(Json(ToggleResponse {
        session_id: session_id.to_string(),
        name: name.to_string(),
        enabled,
    }))
}
