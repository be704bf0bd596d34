//! Request and response bodies for the control-plane HTTP surface (spec §6).

use agentdeck_core::{AgentRecord, AgentStatus, SessionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type McpEnv = HashMap<String, HashMap<String, String>>;

#[derive(Deserialize, Default)]
pub struct SpawnRequest {
    pub api_key: Option<String>,
    pub config: Option<serde_json::Value>,
    pub mcp_env: Option<McpEnv>,
}

#[derive(Deserialize, Default)]
pub struct LaunchRequest {
    pub api_key: Option<String>,
    pub config_id: Option<String>,
    pub config: Option<serde_json::Value>,
    pub mcp_env: Option<McpEnv>,
}

#[derive(Serialize)]
pub struct LaunchResponse {
    pub session_id: String,
    pub session_token: String,
    pub agent_id: String,
    pub config_id: String,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
}

impl LaunchResponse {
    pub fn from_records(session: &SessionRecord, agent: &AgentRecord) -> Self {
        Self {
            session_id: session.session_id.clone(),
            session_token: session.session_token.clone(),
            agent_id: agent.agent_id.clone(),
            config_id: agent.config_id.clone(),
            status: agent.status.clone(),
            created_at: session.created_at,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct ListAgentsQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize, Default)]
pub struct LifecycleRequest {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub api_key: Option<String>,
    pub mcp_env: Option<McpEnv>,
}

#[derive(Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize, Default)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Deserialize)]
pub struct ConfigReloadRequest {
    pub config: serde_json::Value,
    pub mcp_env: Option<McpEnv>,
}

#[derive(Serialize)]
pub struct ConfigReloadResponse {
    pub agent: AgentRecord,
    pub session_id: String,
    pub session_token: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct RotateTokenResponse {
    pub session_token: String,
}
