//! Seed end-to-end scenarios (spec §8), driven directly against the axum
//! `Router` with a fake container host and a tiny in-process fake worker.

use crate::router;
use crate::state::AppState;
use agentdeck_container::{ContainerManager, FakeContainerHost};
use agentdeck_session::SessionManager;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn fake_worker(ok: bool) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    async fn query_ok() -> &'static str {
        "data: {\"text\":\"ok\"}\n\n"
    }
    async fn query_fail() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom")
    }
    async fn interrupt_ok() -> StatusCode {
        StatusCode::NO_CONTENT
    }

    let app = if ok {
        Router::new()
            .route("/query", post(query_ok))
            .route("/interrupt", post(interrupt_ok))
    } else {
        Router::new()
            .route("/query", post(query_fail))
            .route("/interrupt", post(interrupt_ok))
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

fn test_app() -> (Router, AppState, Arc<FakeContainerHost>, tempfile::TempDir) {
    test_app_with_ambient_key(Some("sk-ambient"))
}

fn test_app_with_ambient_key(ambient_key: Option<&str>) -> (Router, AppState, Arc<FakeContainerHost>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(FakeContainerHost::new());
    let cm = Arc::new(ContainerManager::new(host.clone(), "agentdeck-worker:latest", dir.path()));
    let sessions = Arc::new(SessionManager::new(cm, dir.path(), 60));
    let state = AppState::new(sessions, ambient_key.map(str::to_string)).unwrap();
    (router::build(state.clone()), state, host, dir)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn launch_chat_stop() {
    let (app, state, host, _dir) = test_app();
    let (worker_addr, _worker) = fake_worker(true).await;

    let launch_res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/agents/launch",
            json!({"config": {"id": "demo", "name": "Demo"}}),
        ))
        .await
        .unwrap();
    assert_eq!(launch_res.status(), StatusCode::OK);
    let launch: Value = json_body(launch_res).await;

    let agent_id = launch["agent_id"].as_str().unwrap();
    assert!(regex_agent_id(agent_id));
    assert_eq!(launch["config_id"], "demo");

    let container_id = state
        .sessions
        .container_manager()
        .get_container_id(agent_id)
        .expect("container created for agent");
    host.set_host_port(&container_id, worker_addr.port());

    let session_id = launch["session_id"].as_str().unwrap().to_string();
    let session_token = launch["session_token"].as_str().unwrap().to_string();

    let chat_req = Request::builder()
        .method("POST")
        .uri("/api/agents/chat")
        .header("content-type", "application/json")
        .header("x-session-token", &session_token)
        .body(Body::from(
            json!({"session_id": session_id, "messages": [{"role": "user", "content": "hi"}]}).to_string(),
        ))
        .unwrap();
    let chat_res = app.clone().oneshot(chat_req).await.unwrap();
    assert_eq!(chat_res.status(), StatusCode::OK);
    let bytes = chat_res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"data: {\"text\":\"ok\"}\n\n");

    let stop_req = Request::builder()
        .method("POST")
        .uri(format!("/api/agents/sessions/{session_id}/stop"))
        .body(Body::empty())
        .unwrap();
    let stop_res = app.clone().oneshot(stop_req).await.unwrap();
    assert_eq!(stop_res.status(), StatusCode::OK);

    let chat_again = Request::builder()
        .method("POST")
        .uri("/api/agents/chat")
        .header("content-type", "application/json")
        .header("x-session-token", &session_token)
        .body(Body::from(
            json!({"session_id": session_id, "messages": [{"role": "user", "content": "hi"}]}).to_string(),
        ))
        .unwrap();
    let chat_again_res = app.clone().oneshot(chat_again).await.unwrap();
    assert_eq!(chat_again_res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn token_rotation_invalidates_old_token() {
    let (app, _state, _host, _dir) = test_app();
    let launch_res = app
        .clone()
        .oneshot(json_request("POST", "/api/agents/launch", json!({"config": {"id": "demo"}})))
        .await
        .unwrap();
    let launch: Value = json_body(launch_res).await;
    let session_id = launch["session_id"].as_str().unwrap().to_string();
    let old_token = launch["session_token"].as_str().unwrap().to_string();

    let rotate_res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/agents/sessions/{session_id}/rotate-token"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rotate_res.status(), StatusCode::OK);
    let rotated: Value = json_body(rotate_res).await;
    let new_token = rotated["session_token"].as_str().unwrap().to_string();
    assert_ne!(old_token, new_token);

    // Old token now fails auth on chat.
    let fail_req = Request::builder()
        .method("POST")
        .uri("/api/agents/chat")
        .header("content-type", "application/json")
        .header("x-session-token", &old_token)
        .body(Body::from(
            json!({"session_id": session_id, "messages": [{"role": "user", "content": "hi"}]}).to_string(),
        ))
        .unwrap();
    let fail_res = app.clone().oneshot(fail_req).await.unwrap();
    assert_eq!(fail_res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn config_reload_rollback_on_invalid_allowed_tools() {
    let (app, _state, _host, _dir) = test_app();
    let launch_res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/agents/launch",
            json!({"config": {"id": "demo", "name": "A"}}),
        ))
        .await
        .unwrap();
    let launch: Value = json_body(launch_res).await;
    let agent_id = launch["agent_id"].as_str().unwrap().to_string();
    let session_token = launch["session_token"].as_str().unwrap().to_string();

    let patch_req = Request::builder()
        .method("PATCH")
        .uri(format!("/api/agents/{agent_id}/config"))
        .header("content-type", "application/json")
        .header("x-session-token", &session_token)
        .body(Body::from(json!({"config": {"allowed_tools": "not-a-list"}}).to_string()))
        .unwrap();
    let patch_res = app.clone().oneshot(patch_req).await.unwrap();
    assert_eq!(patch_res.status(), StatusCode::BAD_REQUEST);

    let list_res = app
        .clone()
        .oneshot(Request::builder().uri("/api/agents").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let agents: Value = json_body(list_res).await;
    let agent = agents.as_array().unwrap().iter().find(|a| a["agent_id"] == agent_id).unwrap();
    assert_eq!(agent["status"], "running");

    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(agent["config_path"].as_str().unwrap()).unwrap()).unwrap();
    assert_eq!(on_disk["name"], "A");
}

#[tokio::test]
async fn recreation_after_external_removal_requires_api_key() {
    let (app, state, host, _dir) = test_app_with_ambient_key(None);
    let launch_res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/agents/launch",
            json!({"api_key": "sk-original", "config": {"id": "demo"}}),
        ))
        .await
        .unwrap();
    let launch: Value = json_body(launch_res).await;
    let agent_id = launch["agent_id"].as_str().unwrap().to_string();

    let container_id = state
        .sessions
        .container_manager()
        .get_container_id(&agent_id)
        .unwrap();
    host.vanish(&container_id);

    let start_no_key = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/agents/{agent_id}/start"))
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(start_no_key.status(), StatusCode::CONFLICT);

    let start_with_key = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/agents/{agent_id}/start"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"api_key": "sk-new"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(start_with_key.status(), StatusCode::OK);
    let restarted: Value = json_body(start_with_key).await;
    assert_eq!(restarted["agent_id"], agent_id);
    assert_ne!(restarted["container_id"].as_str().unwrap(), container_id);
}

#[tokio::test]
async fn health_check() {
    let (app, _state, _host, _dir) = test_app();
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

fn regex_agent_id(id: &str) -> bool {
    id.strip_prefix("agent-").map(|hex| hex.len() == 12 && hex.chars().all(|c| c.is_ascii_hexdigit())).unwrap_or(false)
}
