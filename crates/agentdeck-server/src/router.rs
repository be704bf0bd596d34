use crate::handlers;
use crate::state::AppState;
use crate::ws;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;

pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .route("/agents", post(handlers::spawn_agent).get(handlers::list_agents))
        .route("/agents/{agent_id}", delete(handlers::delete_agent))
        .route("/agents/launch", post(handlers::launch))
        .route("/agents/sessions", get(handlers::list_sessions))
        .route(
            "/agents/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/agents/sessions/{session_id}/stop", post(handlers::stop_by_session))
        .route("/agents/sessions/{session_id}/start", post(handlers::start_by_session))
        .route(
            "/agents/sessions/{session_id}/rotate-token",
            post(handlers::rotate_token_by_session),
        )
        .route(
            "/agents/sessions/{session_id}/interrupt",
            post(handlers::interrupt_by_session),
        )
        .route("/agents/{agent_id}/stop", post(handlers::stop_by_agent))
        .route("/agents/{agent_id}/start", post(handlers::start_by_agent))
        .route("/agents/{agent_id}/rotate-token", post(handlers::rotate_token_by_agent))
        .route("/agents/{agent_id}/interrupt", post(handlers::interrupt_by_agent))
        .route("/agents/{agent_id}/config", patch(handlers::reload_config))
        .route("/agents/chat", post(handlers::chat))
        .route("/agents/{agent_id}/query", post(handlers::query_by_agent));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .route("/ws/agents/{agent_id}/logs", get(ws::agent_logs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
