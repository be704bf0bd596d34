//! Non-streaming control-plane handlers (spec §4.3, §6).

use crate::auth::{authorize_headers, effective_api_key, resolve_api_key, resolve_session_by_either};
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::*;
use agentdeck_core::config::merge_config_id;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    crate::proxy::stream_query(&state, &headers, req).await
}

pub async fn query_by_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(mut req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if req.session_id.is_none() {
        let session = resolve_session_by_either(&state, None, Some(&agent_id))?;
        req.session_id = Some(session.session_id);
    }
    crate::proxy::stream_query(&state, &headers, req).await
}

pub async fn interrupt_by_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = resolve_session_by_either(&state, None, Some(&agent_id))?;
    crate::proxy::interrupt(&state, &session.session_id).await?;
    Ok(Json(serde_json::json!({ "interrupted": agent_id })))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn spawn_agent(
    State(state): State<AppState>,
    Json(req): Json<SpawnRequest>,
) -> Result<Json<agentdeck_core::AgentRecord>, ApiError> {
    let api_key = resolve_api_key(&state, req.api_key.as_deref())?;
    let cm = state.sessions.container_manager();
    let record = cm.spawn_agent(&api_key, req.config, req.mcp_env.as_ref(), None).await?;
    Ok(Json(record))
}

pub async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<ListAgentsQuery>,
) -> Json<Vec<agentdeck_core::AgentRecord>> {
    let cm = state.sessions.container_manager();
    let agents = cm.list_agents(query.refresh).await;
    Json(agents.into_values().collect())
}

pub async fn delete_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = resolve_session_by_either(&state, None, Some(&agent_id))?;
    authorize_headers(&state, &headers, &session)?;
    state.sessions.delete_session(&session.session_id).await?;
    Ok(Json(serde_json::json!({ "deleted": agent_id })))
}

pub async fn launch(
    State(state): State<AppState>,
    Json(req): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>, ApiError> {
    if req.config_id.is_none() && req.config.is_none() {
        return Err(ApiError::BadRequest(
            "either config_id or config is required".to_string(),
        ));
    }
    let api_key = resolve_api_key(&state, req.api_key.as_deref())?;
    let config = merge_config_id(req.config, req.config_id.as_deref());

    let (session, agent) = state
        .sessions
        .launch_session(&api_key, config, req.mcp_env.as_ref())
        .await?;
    Ok(Json(LaunchResponse::from_records(&session, &agent)))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<agentdeck_core::SessionRecord>> {
    Json(state.sessions.list_sessions())
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<agentdeck_core::SessionRecord>, ApiError> {
    Ok(Json(state.sessions.get_session(&session_id)?))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.sessions.delete_session(&session_id).await?;
    Ok(Json(serde_json::json!({ "deleted": session_id })))
}

pub async fn stop_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.sessions.stop_session(&session_id).await?;
    Ok(Json(serde_json::json!({ "stopped": session_id })))
}

pub async fn start_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<LifecycleRequest>,
) -> Result<Json<agentdeck_core::AgentRecord>, ApiError> {
    let api_key = effective_api_key(&state, req.api_key.as_deref());
    let agent = state
        .sessions
        .start_session(&session_id, api_key.as_deref(), req.mcp_env.as_ref())
        .await?;
    Ok(Json(agent))
}

pub async fn rotate_token_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<RotateTokenResponse>, ApiError> {
    let session_token = state.sessions.rotate_token(&session_id)?;
    Ok(Json(RotateTokenResponse { session_token }))
}

pub async fn interrupt_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::proxy::interrupt(&state, &session_id).await?;
    Ok(Json(serde_json::json!({ "interrupted": session_id })))
}

pub async fn stop_by_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = resolve_session_by_either(&state, None, Some(&agent_id))?;
    state.sessions.stop_session(&session.session_id).await?;
    Ok(Json(serde_json::json!({ "stopped": agent_id })))
}

pub async fn start_by_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<LifecycleRequest>,
) -> Result<Json<agentdeck_core::AgentRecord>, ApiError> {
    let session = resolve_session_by_either(&state, None, Some(&agent_id))?;
    let api_key = effective_api_key(&state, req.api_key.as_deref());
    let agent = state
        .sessions
        .start_session(&session.session_id, api_key.as_deref(), req.mcp_env.as_ref())
        .await?;
    Ok(Json(agent))
}

pub async fn rotate_token_by_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<RotateTokenResponse>, ApiError> {
    let session = resolve_session_by_either(&state, None, Some(&agent_id))?;
    let session_token = state.sessions.rotate_token(&session.session_id)?;
    Ok(Json(RotateTokenResponse { session_token }))
}

/// `PATCH /api/agents/{agent_id}/config` — stop, rewrite, restart, rotate
/// token; best-effort restore of the prior config on a normalization failure
/// (spec §4.3 "Config reload").
pub async fn reload_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ConfigReloadRequest>,
) -> Result<Json<ConfigReloadResponse>, ApiError> {
    let session = resolve_session_by_either(&state, None, Some(&agent_id))?;
    authorize_headers(&state, &headers, &session)?;

    let cm = state.sessions.container_manager();
    let prior_record = cm
        .get_record(&agent_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown agent: {agent_id}")))?;
    let prior_config = std::fs::read_to_string(&prior_record.config_path).ok();

    state.sessions.stop_session(&session.session_id).await?;
    let api_key = effective_api_key(&state, None);

    let update_result = cm.update_agent_config(&agent_id, req.config);
    let agent = match update_result {
        Ok(_) => {
            let restarted = state
                .sessions
                .start_session(&session.session_id, api_key.as_deref(), req.mcp_env.as_ref())
                .await?;
            restarted
        }
        Err(e) => {
            if let Some(prior) = prior_config {
                if let Ok(prior_value) = serde_json::from_str::<serde_json::Value>(&prior) {
                    let _ = cm.update_agent_config(&agent_id, prior_value);
                }
            }
            let _ = state
                .sessions
                .start_session(&session.session_id, api_key.as_deref(), req.mcp_env.as_ref())
                .await;
            return Err(e.into());
        }
    };

    let session_token = state.sessions.rotate_token(&session.session_id)?;
    Ok(Json(ConfigReloadResponse {
        agent,
        session_id: session.session_id,
        session_token,
    }))
}
