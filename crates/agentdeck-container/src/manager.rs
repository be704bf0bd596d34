//! Container Manager (spec §4.1): config normalization, the agent record
//! store, and the spawn/list/start/stop/delete/update lifecycle.

use crate::error::ContainerError;
use crate::host::{ContainerHost, ContainerSpec, HostError};
use agentdeck_core::config::{build_env, normalize_config};
use agentdeck_core::model::{AgentRecord, AgentStatus};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const STOP_GRACE: Duration = Duration::from_secs(10);

pub struct ContainerManager {
    host: Arc<dyn ContainerHost>,
    image: String,
    state_dir: PathBuf,
    agents: Mutex<HashMap<String, AgentRecord>>,
}

fn new_agent_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("agent-{}", &hex[..12])
}

fn agent_dir(state_dir: &Path, agent_id: &str) -> PathBuf {
    state_dir.join(agent_id)
}

fn config_path(state_dir: &Path, agent_id: &str) -> PathBuf {
    agent_dir(state_dir, agent_id).join("agent-config.json")
}

/// Write `value` pretty-printed to `path` via a sibling temp file + rename,
/// giving crash-atomicity on POSIX (spec §4.2/§9).
fn write_config_atomic(path: &Path, value: &Value) -> Result<(), ContainerError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let pretty = serde_json::to_string_pretty(value)?;
    use std::io::Write;
    tmp.write_all(pretty.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| ContainerError::Io(e.error))?;
    Ok(())
}

impl ContainerManager {
    pub fn new(host: Arc<dyn ContainerHost>, image: impl Into<String>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            image: image.into(),
            state_dir: state_dir.into(),
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> Arc<dyn ContainerHost> {
        self.host.clone()
    }

    /// A full, point-in-time copy of the record store (no host refresh).
    pub fn snapshot(&self) -> HashMap<String, AgentRecord> {
        self.agents.lock().unwrap().clone()
    }

    /// Reinstate a record loaded from the durable registry (spec §4.2 boot sequence).
    pub fn restore_agent(&self, record: AgentRecord) {
        self.agents.lock().unwrap().insert(record.agent_id.clone(), record);
    }

    pub fn get_record(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.lock().unwrap().get(agent_id).cloned()
    }

    pub fn get_container_id(&self, agent_id: &str) -> Option<String> {
        self.agents.lock().unwrap().get(agent_id)?.container_id.clone()
    }

    pub async fn spawn_agent(
        &self,
        api_key: &str,
        config: Option<Value>,
        mcp_env: Option<&HashMap<String, HashMap<String, String>>>,
        session_id: Option<&str>,
    ) -> Result<AgentRecord, ContainerError> {
        let agent_id = new_agent_id();
        let raw_config = config.unwrap_or_else(|| Value::Object(Default::default()));
        let normalized = normalize_config(raw_config, &agent_id)?;
        let config_id = normalized
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(&agent_id)
            .to_string();

        let path = config_path(&self.state_dir, &agent_id);
        write_config_atomic(&path, &normalized)?;

        let workspace_volume = AgentRecord::workspace_volume_for(&agent_id);
        let container_name = AgentRecord::container_name_for(&agent_id);
        let env = build_env(&agent_id, api_key, session_id, mcp_env)?;

        let mut labels = HashMap::new();
        labels.insert("agentdeck".to_string(), "true".to_string());
        labels.insert("agentdeck.agent_id".to_string(), agent_id.clone());
        labels.insert("agentdeck.config_id".to_string(), config_id.clone());

        self.host.create_volume(&workspace_volume).await.map_err(host_err)?;

        let spec = ContainerSpec {
            image: self.image.clone(),
            name: container_name.clone(),
            env,
            binds: vec![(
                path.canonicalize().unwrap_or(path.clone()).to_string_lossy().into_owned(),
                "/config/agent-config.json".to_string(),
                true,
            )],
            volume: (workspace_volume.clone(), "/workspace".to_string()),
            labels,
        };

        let info = self.host.run(spec).await.map_err(host_err)?;

        let record = AgentRecord {
            agent_id: agent_id.clone(),
            config_id,
            container_id: Some(info.container_id),
            container_name: info.container_name,
            status: AgentStatus::from_host_state(&info.status),
            created_at: Utc::now(),
            config_path: path,
            workspace_volume,
            session_id: session_id.map(str::to_string),
            host_port: info.host_port,
        };

        self.agents.lock().unwrap().insert(agent_id, record.clone());
        tracing::info!(agent_id = %record.agent_id, "agent spawned");
        Ok(record)
    }

    pub async fn list_agents(&self, refresh: bool) -> HashMap<String, AgentRecord> {
        if !refresh {
            return self.snapshot();
        }

        let snapshot = self.snapshot();
        let mut updates = Vec::new();
        for (agent_id, record) in snapshot {
            let Some(container_id) = record.container_id.clone() else {
                updates.push((agent_id, AgentStatus::Missing, None));
                continue;
            };
            match self.host.inspect(&container_id).await {
                Ok(inspection) => {
                    let status = AgentStatus::from_host_state(&inspection.status);
                    updates.push((agent_id, status, inspection.host_port));
                }
                Err(HostError::NotFound(_)) => updates.push((agent_id, AgentStatus::Missing, None)),
                Err(e) => {
                    tracing::warn!(agent_id = %agent_id, error = %e, "failed to refresh agent status");
                }
            }
        }

        let mut agents = self.agents.lock().unwrap();
        for (agent_id, status, host_port) in updates {
            if let Some(record) = agents.get_mut(&agent_id) {
                record.status = status;
                if host_port.is_some() {
                    record.host_port = host_port;
                }
            }
        }
        agents.clone()
    }

    pub async fn start_agent(
        &self,
        agent_id: &str,
        api_key: Option<&str>,
        mcp_env: Option<&HashMap<String, HashMap<String, String>>>,
        session_id: Option<&str>,
    ) -> Result<(AgentRecord, bool), ContainerError> {
        let record = self
            .get_record(agent_id)
            .ok_or_else(|| ContainerError::UnknownAgent(agent_id.to_string()))?;

        let existing = match &record.container_id {
            Some(id) => match self.host.inspect(id).await {
                Ok(inspection) => Some(inspection),
                Err(HostError::NotFound(_)) => None,
                Err(e) => return Err(host_err(e)),
            },
            None => None,
        };

        if let (Some(container_id), Some(inspection)) = (record.container_id.clone(), existing) {
            if inspection.status != "running" {
                self.host.start(&container_id).await.map_err(host_err)?;
            }
            let refreshed = self.host.inspect(&container_id).await.map_err(host_err)?;
            let updated = self.update_record(agent_id, |r| {
                r.status = AgentStatus::from_host_state(&refreshed.status);
                if refreshed.host_port.is_some() {
                    r.host_port = refreshed.host_port;
                }
                if let Some(sid) = session_id {
                    r.session_id = Some(sid.to_string());
                }
            })?;
            return Ok((updated, false));
        }

        // Container is gone: recreation requires a fresh API key and a surviving config file.
        let api_key = api_key.ok_or_else(|| ContainerError::MissingContainer(agent_id.to_string()))?;
        if !record.config_path.exists() {
            return Err(ContainerError::MissingConfig(agent_id.to_string()));
        }

        let env = build_env(agent_id, api_key, session_id, mcp_env)?;
        let mut labels = HashMap::new();
        labels.insert("agentdeck".to_string(), "true".to_string());
        labels.insert("agentdeck.agent_id".to_string(), agent_id.to_string());
        labels.insert("agentdeck.config_id".to_string(), record.config_id.clone());

        let spec = ContainerSpec {
            image: self.image.clone(),
            name: record.container_name.clone(),
            env,
            binds: vec![(
                record
                    .config_path
                    .canonicalize()
                    .unwrap_or_else(|_| record.config_path.clone())
                    .to_string_lossy()
                    .into_owned(),
                "/config/agent-config.json".to_string(),
                true,
            )],
            volume: (record.workspace_volume.clone(), "/workspace".to_string()),
            labels,
        };

        let info = self.host.run(spec).await.map_err(host_err)?;
        let updated = self.update_record(agent_id, |r| {
            r.container_id = Some(info.container_id.clone());
            r.status = AgentStatus::from_host_state(&info.status);
            r.host_port = info.host_port;
            if let Some(sid) = session_id {
                r.session_id = Some(sid.to_string());
            }
        })?;
        tracing::info!(agent_id = %agent_id, "agent recreated");
        Ok((updated, true))
    }

    pub async fn stop_agent(&self, agent_id: &str) -> Result<AgentRecord, ContainerError> {
        let record = self
            .get_record(agent_id)
            .ok_or_else(|| ContainerError::UnknownAgent(agent_id.to_string()))?;

        let new_status = match &record.container_id {
            Some(container_id) => match self.host.stop(container_id, STOP_GRACE).await {
                Ok(()) => AgentStatus::Stopped,
                Err(HostError::NotFound(_)) => AgentStatus::Missing,
                Err(e) => return Err(host_err(e)),
            },
            None => AgentStatus::Missing,
        };

        self.update_record(agent_id, |r| r.status = new_status.clone())
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), ContainerError> {
        let record = self
            .get_record(agent_id)
            .ok_or_else(|| ContainerError::UnknownAgent(agent_id.to_string()))?;

        if let Some(container_id) = &record.container_id {
            ignore_not_found(self.host.stop(container_id, STOP_GRACE).await)?;
            ignore_not_found(self.host.remove(container_id, true).await)?;
        }
        ignore_not_found(self.host.remove_volume(&record.workspace_volume, true).await)?;

        if record.config_path.exists() {
            std::fs::remove_file(&record.config_path)?;
        }
        if let Some(parent) = record.config_path.parent() {
            let _ = std::fs::remove_dir(parent);
        }

        self.agents.lock().unwrap().remove(agent_id);
        tracing::info!(agent_id = %agent_id, "agent deleted");
        Ok(())
    }

    pub fn update_agent_config(&self, agent_id: &str, new_config: Value) -> Result<AgentRecord, ContainerError> {
        let record = self
            .get_record(agent_id)
            .ok_or_else(|| ContainerError::UnknownAgent(agent_id.to_string()))?;

        let normalized = normalize_config(new_config, agent_id)?;
        let config_id = normalized
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(agent_id)
            .to_string();

        write_config_atomic(&record.config_path, &normalized)?;
        self.update_record(agent_id, |r| r.config_id = config_id.clone())
    }

    pub async fn get_agent_endpoint(&self, agent_id: &str) -> Result<Option<url::Url>, ContainerError> {
        let mut record = self
            .get_record(agent_id)
            .ok_or_else(|| ContainerError::UnknownAgent(agent_id.to_string()))?;

        if record.status != AgentStatus::Running {
            if let Some(container_id) = &record.container_id {
                match self.host.inspect(container_id).await {
                    Ok(inspection) => {
                        record = self.update_record(agent_id, |r| {
                            r.status = AgentStatus::from_host_state(&inspection.status);
                            if inspection.host_port.is_some() {
                                r.host_port = inspection.host_port;
                            }
                        })?;
                    }
                    Err(HostError::NotFound(_)) => {
                        record = self.update_record(agent_id, |r| r.status = AgentStatus::Missing)?;
                    }
                    Err(e) => return Err(host_err(e)),
                }
            }
        }

        if record.status == AgentStatus::Running && record.host_port.is_none() {
            if let Some(container_id) = &record.container_id {
                if let Ok(inspection) = self.host.inspect(container_id).await {
                    record = self.update_record(agent_id, |r| r.host_port = inspection.host_port)?;
                }
            }
        }

        Ok(record.endpoint())
    }

    fn update_record(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut AgentRecord),
    ) -> Result<AgentRecord, ContainerError> {
        let mut agents = self.agents.lock().unwrap();
        let record = agents
            .get_mut(agent_id)
            .ok_or_else(|| ContainerError::UnknownAgent(agent_id.to_string()))?;
        f(record);
        Ok(record.clone())
    }
}

fn host_err(e: HostError) -> ContainerError {
    ContainerError::Host(e.to_string())
}

fn ignore_not_found(result: Result<(), HostError>) -> Result<(), ContainerError> {
    match result {
        Ok(()) | Err(HostError::NotFound(_)) => Ok(()),
        Err(e) => Err(host_err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeContainerHost;
    use serde_json::json;

    fn manager() -> (ContainerManager, Arc<FakeContainerHost>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeContainerHost::new());
        let cm = ContainerManager::new(host.clone(), "agent-deck-worker:latest", dir.path());
        (cm, host, dir)
    }

    #[tokio::test]
    async fn spawn_assigns_agent_id_as_config_id_when_absent() {
        let (cm, _host, _dir) = manager();
        let record = cm.spawn_agent("sk-test", None, None, None).await.unwrap();
        assert!(record.agent_id.starts_with("agent-"));
        assert_eq!(record.agent_id.len(), "agent-".len() + 12);
        assert_eq!(record.config_id, record.agent_id);
        assert!(record.host_port.is_some());
    }

    #[tokio::test]
    async fn spawn_rejects_reserved_mcp_env_key() {
        let (cm, _host, _dir) = manager();
        let mut mcp_env = HashMap::new();
        let mut server_env = HashMap::new();
        server_env.insert("SESSION_ID".to_string(), "nope".to_string());
        mcp_env.insert("search".to_string(), server_env);

        let err = cm
            .spawn_agent("sk-test", None, Some(&mcp_env), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::Config(_)));
    }

    #[tokio::test]
    async fn stop_then_start_round_trips() {
        let (cm, _host, _dir) = manager();
        let record = cm
            .spawn_agent("sk-test", Some(json!({"id": "demo", "name": "Demo"})), None, None)
            .await
            .unwrap();

        let stopped = cm.stop_agent(&record.agent_id).await.unwrap();
        assert_eq!(stopped.status, AgentStatus::Stopped);

        let (started, recreated) = cm.start_agent(&record.agent_id, None, None, None).await.unwrap();
        assert_eq!(started.status, AgentStatus::Running);
        assert!(!recreated);
    }

    #[tokio::test]
    async fn start_without_api_key_after_external_removal_is_missing_container() {
        let (cm, host, _dir) = manager();
        let record = cm
            .spawn_agent("sk-test", Some(json!({"id": "demo"})), None, None)
            .await
            .unwrap();
        host.vanish(record.container_id.as_deref().unwrap());

        let err = cm
            .start_agent(&record.agent_id, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::MissingContainer(_)));

        let (restarted, recreated) = cm
            .start_agent(&record.agent_id, Some("sk-test-2"), None, None)
            .await
            .unwrap();
        assert!(recreated);
        assert_eq!(restarted.agent_id, record.agent_id);
        assert_ne!(restarted.container_id, record.container_id);
    }

    #[tokio::test]
    async fn start_recreation_fails_with_missing_config_when_config_file_deleted() {
        let (cm, host, _dir) = manager();
        let record = cm
            .spawn_agent("sk-test", Some(json!({"id": "demo"})), None, None)
            .await
            .unwrap();
        host.vanish(record.container_id.as_deref().unwrap());
        std::fs::remove_file(&record.config_path).unwrap();

        let err = cm
            .start_agent(&record.agent_id, Some("sk-test-2"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::MissingConfig(_)));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let (cm, _host, _dir) = manager();
        let record = cm.spawn_agent("sk-test", None, None, None).await.unwrap();
        cm.delete_agent(&record.agent_id).await.unwrap();
        assert!(cm.get_record(&record.agent_id).is_none());
    }

    #[tokio::test]
    async fn update_agent_config_rewrites_file_and_config_id() {
        let (cm, _host, _dir) = manager();
        let record = cm
            .spawn_agent("sk-test", Some(json!({"id": "demo", "name": "A"})), None, None)
            .await
            .unwrap();

        let updated = cm
            .update_agent_config(&record.agent_id, json!({"id": "demo2", "name": "B"}))
            .unwrap();
        assert_eq!(updated.config_id, "demo2");

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&updated.config_path).unwrap()).unwrap();
        assert_eq!(on_disk["name"], "B");
    }

    #[tokio::test]
    async fn update_agent_config_rejects_invalid_allowed_tools() {
        let (cm, _host, _dir) = manager();
        let record = cm
            .spawn_agent("sk-test", Some(json!({"id": "demo", "name": "A"})), None, None)
            .await
            .unwrap();

        let err = cm
            .update_agent_config(&record.agent_id, json!({"allowed_tools": "nope"}))
            .unwrap_err();
        assert!(matches!(err, ContainerError::Config(_)));

        // Original file must be untouched.
        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&record.config_path).unwrap()).unwrap();
        assert_eq!(on_disk["name"], "A");
    }
}
