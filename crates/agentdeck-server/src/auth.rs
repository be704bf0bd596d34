//! Session resolution and authorization shared by the lifecycle and proxy
//! handlers (spec §4.3, §6 "Auth headers").

use crate::error::ApiError;
use crate::state::AppState;
use agentdeck_core::SessionRecord;
use axum::http::HeaderMap;

pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Resolve a session by an explicit `session_id` (from the request body) or
/// the `X-Session-ID` header, then authorize it against `X-Session-Token` or
/// `Authorization: Bearer …`.
pub fn resolve_authorized_session(
    state: &AppState,
    headers: &HeaderMap,
    body_session_id: Option<&str>,
) -> Result<SessionRecord, ApiError> {
    let session_id = body_session_id
        .map(str::to_string)
        .or_else(|| header_str(headers, SESSION_ID_HEADER).map(str::to_string))
        .ok_or_else(|| ApiError::BadRequest("session_id is required".to_string()))?;

    let session_token = header_str(headers, SESSION_TOKEN_HEADER);
    let authorization = header_str(headers, "authorization");

    if !state.sessions.authorize(&session_id, session_token, authorization) {
        return Err(ApiError::Unauthorized);
    }

    Ok(state.sessions.get_session(&session_id)?)
}

/// Resolve a session either directly or via its owning agent, for the
/// lifecycle endpoints that accept either identifier (spec §4.3).
pub fn resolve_session_by_either(
    state: &AppState,
    session_id: Option<&str>,
    agent_id: Option<&str>,
) -> Result<SessionRecord, ApiError> {
    if let Some(session_id) = session_id {
        return Ok(state.sessions.get_session(session_id)?);
    }
    if let Some(agent_id) = agent_id {
        return state
            .sessions
            .get_session_for_agent(agent_id)
            .ok_or_else(|| ApiError::NotFound(format!("no session for agent: {agent_id}")));
    }
    Err(ApiError::BadRequest(
        "either session_id or agent_id is required".to_string(),
    ))
}

/// Authorize an already-resolved session against `X-Session-Token` or
/// `Authorization: Bearer …`, without re-resolving by id.
pub fn authorize_headers(state: &AppState, headers: &HeaderMap, session: &SessionRecord) -> Result<(), ApiError> {
    let session_token = header_str(headers, SESSION_TOKEN_HEADER);
    let authorization = header_str(headers, "authorization");
    if state.sessions.authorize(&session.session_id, session_token, authorization) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// The API key a launch/start call should use: the request body's key if
/// present, otherwise the ambient server-wide key (spec §4.3 "Requires an
/// ambient API key").
pub fn resolve_api_key<'a>(state: &'a AppState, supplied: Option<&'a str>) -> Result<String, ApiError> {
    effective_api_key(state, supplied)
        .ok_or_else(|| ApiError::BadRequest("no api key supplied and none configured".to_string()))
}

/// Best-effort API key for a `start` call: the per-call key if supplied,
/// otherwise the ambient key if one is configured, otherwise `None`. Used so
/// recreation after external removal retries with the ambient key before
/// surfacing *MissingContainer* (spec §7 "Recovery").
pub fn effective_api_key(state: &AppState, supplied: Option<&str>) -> Option<String> {
    match supplied {
        Some(key) if !key.is_empty() => Some(key.to_string()),
        _ => state.ambient_api_key.as_deref().map(str::to_string),
    }
}
