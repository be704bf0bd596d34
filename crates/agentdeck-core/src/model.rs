//! Core data model: `AgentRecord` and `SessionRecord`.
//!
//! Both types are plain, serde-serializable records — the control plane owns
//! all mutation, so there is no behavior attached beyond small helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Observed lifecycle state of a worker container.
///
/// `Other` carries through any host status string this implementation does
/// not otherwise normalize (e.g. a future Docker state), so callers never see
/// a deserialization failure for a status they don't special-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Created,
    Running,
    Stopped,
    Missing,
    #[serde(untagged)]
    Other(String),
}

impl AgentStatus {
    /// Normalize a raw container-host status string per §4.1's state refresh rule:
    /// `exited`/`created`/`dead` collapse to `Stopped`; anything else passes through.
    pub fn from_host_state(state: &str) -> Self {
        match state {
            "running" => AgentStatus::Running,
            "exited" | "created" | "dead" => AgentStatus::Stopped,
            other => AgentStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Created => write!(f, "created"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Missing => write!(f, "missing"),
            AgentStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One record per worker container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub config_id: String,
    pub container_id: Option<String>,
    pub container_name: String,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub config_path: PathBuf,
    pub workspace_volume: String,
    pub session_id: Option<String>,
    pub host_port: Option<u16>,
}

impl AgentRecord {
    pub fn container_name_for(agent_id: &str) -> String {
        format!("agentdeck-{agent_id}")
    }

    pub fn workspace_volume_for(agent_id: &str) -> String {
        format!("agentdeck-workspace-{agent_id}")
    }

    pub fn endpoint(&self) -> Option<url::Url> {
        let port = self.host_port?;
        if self.status != AgentStatus::Running {
            return None;
        }
        url::Url::parse(&format!("http://localhost:{port}")).ok()
    }
}

/// One record per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub session_token: String,
    pub agent_id: String,
    pub config_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub api_key_hash: String,
}

impl SessionRecord {
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.last_active > timeout
    }
}
