//! Request Router & Stream Proxy (spec §4.3): resolves a session, forwards a
//! chat turn to the worker's `/query` endpoint, and relays the response
//! verbatim as Server-Sent Events.

use crate::auth::resolve_authorized_session;
use crate::error::ApiError;
use crate::state::{AppState, INTERRUPT_TIMEOUT};
use crate::types::{ChatMessage, ChatRequest};
use agentdeck_container::ContainerManager;
use agentdeck_core::AgentStatus;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Resolve a running agent's endpoint, distinguishing "stopped, nothing to
/// talk to" (NotFound) from "host lost the container, needs recreation"
/// (Conflict) — spec §7's split between UnknownAgent-adjacent states and
/// MissingContainer.
async fn running_endpoint(cm: &ContainerManager, agent_id: &str) -> Result<url::Url, ApiError> {
    if let Some(endpoint) = cm.get_agent_endpoint(agent_id).await? {
        return Ok(endpoint);
    }
    let status = cm.get_record(agent_id).map(|r| r.status);
    match status {
        Some(AgentStatus::Missing) => Err(ApiError::Conflict(format!("agent {agent_id} is missing; start with an api_key to recreate it"))),
        _ => Err(ApiError::NotFound(format!("agent {agent_id} is not running"))),
    }
}

fn sse_error_body(message: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({ "type": "error", "message": message })
    )
}

fn sse_error_response(message: &str) -> Response {
    (
        StatusCode::OK,
        [
            ("content-type", "text/event-stream"),
            ("cache-control", "no-cache"),
        ],
        sse_error_body(message),
    )
        .into_response()
}

fn last_user_message(messages: &[ChatMessage], history: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .chain(history.iter().rev())
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
}

/// Shared implementation for `POST /api/agents/chat` (session resolved from
/// the body/header) and `POST /api/agents/{agent_id}/query` (session resolved
/// via the agent). Either caller has already produced a `ChatRequest`.
pub async fn stream_query(state: &AppState, headers: &HeaderMap, req: ChatRequest) -> Result<Response, ApiError> {
    let session = resolve_authorized_session(state, headers, req.session_id.as_deref())?;

    let query = last_user_message(&req.messages, &req.history)
        .ok_or_else(|| ApiError::BadRequest("no user message provided".to_string()))?;

    state.sessions.touch(&session.session_id)?;

    let cm = state.sessions.container_manager();
    let endpoint = running_endpoint(&cm, &session.agent_id).await?;

    let history: Vec<serde_json::Value> = req
        .history
        .iter()
        .chain(req.messages.iter())
        .map(|m| json!({ "role": m.role, "content": m.content }))
        .collect();

    let worker_response = state
        .worker_client
        .post(format!("{endpoint}query"))
        .header("accept", "text/event-stream")
        .json(&json!({ "query": query, "history": history }))
        .send()
        .await;

    let worker_response = match worker_response {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(agent_id = %session.agent_id, error = %e, "worker request failed");
            return Ok(sse_error_response("agent query failed"));
        }
    };

    if !worker_response.status().is_success() {
        let body = worker_response.text().await.unwrap_or_default();
        let message = if body.is_empty() { "agent query failed".to_string() } else { body };
        return Ok(sse_error_response(&message));
    }

    let stream = worker_response.bytes_stream();
    let response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .expect("static headers are always valid");

    Ok(response)
}

/// `POST <endpoint>/interrupt`, 5-second timeout, touching the session
/// regardless of the worker's response (spec §4.3 "Lifecycle endpoints").
pub async fn interrupt(state: &AppState, session_id: &str) -> Result<(), ApiError> {
    let session = state.sessions.get_session(session_id)?;
    let cm = state.sessions.container_manager();
    let endpoint = running_endpoint(&cm, &session.agent_id).await?;

    let result = state
        .worker_client
        .post(format!("{endpoint}interrupt"))
        .timeout(INTERRUPT_TIMEOUT)
        .send()
        .await;

    state.sessions.touch(session_id)?;

    match result {
        Ok(resp) if resp.status().is_success() => Ok(()),
        Ok(resp) => Err(ApiError::WorkerError(format!("interrupt returned {}", resp.status()))),
        Err(e) => Err(ApiError::WorkerError(e.to_string())),
    }
}
