//! Session Manager (spec §4.2): session lifecycle, token issuance and
//! authorization, idle tracking, and the durable agent/session registry.

use crate::error::SessionError;
use crate::registry::{self, RegistrySnapshot};
use agentdeck_container::ContainerManager;
use agentdeck_core::crypto::{constant_time_eq, generate_session_id, generate_session_token, hash_api_key};
use agentdeck_core::model::{AgentRecord, SessionRecord};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

struct SessionState {
    sessions: HashMap<String, SessionRecord>,
    agent_index: HashMap<String, String>,
}

pub struct SessionManager {
    cm: Arc<ContainerManager>,
    registry_path: PathBuf,
    idle_timeout: Option<ChronoDuration>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Construct a session manager, loading any existing registry from
    /// `<state_dir>/registry.json` and repopulating `cm`'s record store
    /// (spec §4.2 boot sequence).
    pub fn new(cm: Arc<ContainerManager>, state_dir: impl Into<PathBuf>, idle_minutes: i64) -> Self {
        let state_dir = state_dir.into();
        let registry_path = state_dir.join("registry.json");
        let snapshot = registry::load(&registry_path);

        let mut agent_index = HashMap::new();
        for (agent_id, session_id) in snapshot
            .sessions
            .values()
            .map(|s| (s.agent_id.clone(), s.session_id.clone()))
        {
            agent_index.insert(agent_id, session_id);
        }
        for record in snapshot.agents.into_values() {
            cm.restore_agent(record);
        }

        let idle_timeout = if idle_minutes > 0 {
            Some(ChronoDuration::minutes(idle_minutes))
        } else {
            None
        };

        Self {
            cm,
            registry_path,
            idle_timeout,
            state: Mutex::new(SessionState {
                sessions: snapshot.sessions,
                agent_index,
            }),
        }
    }

    pub async fn launch_session(
        &self,
        api_key: &str,
        config: Option<Value>,
        mcp_env: Option<&HashMap<String, HashMap<String, String>>>,
    ) -> Result<(SessionRecord, AgentRecord), SessionError> {
        let session_id = generate_session_id();
        let session_token = generate_session_token();

        let agent_record = self
            .cm
            .spawn_agent(api_key, config, mcp_env, Some(&session_id))
            .await?;

        let now = Utc::now();
        let session_record = SessionRecord {
            session_id: session_id.clone(),
            session_token,
            agent_id: agent_record.agent_id.clone(),
            config_id: agent_record.config_id.clone(),
            created_at: now,
            last_active: now,
            api_key_hash: hash_api_key(api_key),
        };

        {
            let mut state = self.state.lock().unwrap();
            state.agent_index.insert(agent_record.agent_id.clone(), session_id.clone());
            state.sessions.insert(session_id, session_record.clone());
        }
        self.persist()?;

        tracing::info!(session_id = %session_record.session_id, agent_id = %agent_record.agent_id, "session launched");
        Ok((session_record, agent_record))
    }

    pub fn list_sessions(&self) -> Vec<SessionRecord> {
        self.state.lock().unwrap().sessions.values().cloned().collect()
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    pub fn get_session_for_agent(&self, agent_id: &str) -> Option<SessionRecord> {
        let state = self.state.lock().unwrap();
        let session_id = state.agent_index.get(agent_id)?;
        state.sessions.get(session_id).cloned()
    }

    pub fn touch(&self, session_id: &str) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().unwrap();
            let record = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
            record.last_active = Utc::now();
        }
        self.persist()
    }

    /// Constant-time authorization against either the session's bearer token
    /// or its API key hash (spec §4.2, §8 invariant 4). Never raises for an
    /// unknown session — simply returns `false`, so presence is not leaked.
    pub fn authorize(&self, session_id: &str, session_token: Option<&str>, authorization: Option<&str>) -> bool {
        let Some(record) = self.state.lock().unwrap().sessions.get(session_id).cloned() else {
            return false;
        };

        if let Some(token) = session_token {
            if constant_time_eq(token.as_bytes(), record.session_token.as_bytes()) {
                return true;
            }
        }

        if let Some(header) = authorization {
            if let Some(credential) = header.strip_prefix("Bearer ") {
                let candidate_hash = hash_api_key(credential.trim());
                if constant_time_eq(candidate_hash.as_bytes(), record.api_key_hash.as_bytes()) {
                    return true;
                }
            }
        }

        false
    }

    /// Idempotent: stopping an already-stopped or unknown session is a no-op.
    pub async fn stop_session(&self, session_id: &str) -> Result<(), SessionError> {
        let Some(record) = self.state.lock().unwrap().sessions.get(session_id).cloned() else {
            return Ok(());
        };
        self.cm.stop_agent(&record.agent_id).await?;
        self.persist()?;
        Ok(())
    }

    pub async fn start_session(
        &self,
        session_id: &str,
        api_key: Option<&str>,
        mcp_env: Option<&HashMap<String, HashMap<String, String>>>,
    ) -> Result<AgentRecord, SessionError> {
        let record = self.get_session(session_id)?;
        let (agent_record, recreated) = self
            .cm
            .start_agent(&record.agent_id, api_key, mcp_env, Some(session_id))
            .await?;

        if recreated {
            if let Some(api_key) = api_key {
                let mut state = self.state.lock().unwrap();
                if let Some(record) = state.sessions.get_mut(session_id) {
                    record.api_key_hash = hash_api_key(api_key);
                }
            }
        }

        self.touch(session_id)?;
        Ok(agent_record)
    }

    /// Idempotent: deleting an already-deleted or unknown session is a no-op.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SessionError> {
        let record = {
            let mut state = self.state.lock().unwrap();
            state.sessions.remove(session_id)
        };
        let Some(record) = record else {
            return Ok(());
        };
        {
            let mut state = self.state.lock().unwrap();
            state.agent_index.remove(&record.agent_id);
        }
        self.cm.delete_agent(&record.agent_id).await?;
        self.persist()?;
        Ok(())
    }

    pub fn rotate_token(&self, session_id: &str) -> Result<String, SessionError> {
        let new_token = generate_session_token();
        {
            let mut state = self.state.lock().unwrap();
            let record = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
            record.session_token = new_token.clone();
        }
        self.persist()?;
        Ok(new_token)
    }

    /// Sessions whose `last_active` predates the configured idle timeout.
    /// Always empty when the timeout is disabled (`idle_minutes <= 0`).
    pub fn get_idle_sessions(&self) -> Vec<String> {
        let Some(timeout) = self.idle_timeout else {
            return Vec::new();
        };
        let now = Utc::now();
        self.state
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.is_idle(now, timeout))
            .map(|s| s.session_id.clone())
            .collect()
    }

    pub fn container_manager(&self) -> Arc<ContainerManager> {
        self.cm.clone()
    }

    fn persist(&self) -> Result<(), SessionError> {
        let sessions = self.state.lock().unwrap().sessions.clone();
        let agents = self.cm.snapshot();
        let snapshot = RegistrySnapshot { agents, sessions };
        registry::save(&self.registry_path, &snapshot)?;
        Ok(())
    }
}

/// All `agent_id`s currently indexed by a session, used by the invariant
/// check in §8 (exposed for tests in the server crate's seed scenarios).
pub fn indexed_agent_ids(sessions: &[SessionRecord]) -> HashSet<String> {
    sessions.iter().map(|s| s.agent_id.clone()).collect()
}

#[cfg(test)]
impl SessionManager {
    /// Backdate a session's `last_active` for idle-eviction tests, without
    /// needing a real clock seam.
    fn backdate_for_test(&self, session_id: &str, minutes: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.sessions.get_mut(session_id) {
            record.last_active = Utc::now() - ChronoDuration::minutes(minutes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdeck_container::FakeContainerHost;
    use serde_json::json;

    fn session_manager() -> (SessionManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeContainerHost::new());
        let cm = Arc::new(ContainerManager::new(host, "agent-deck-worker:latest", dir.path()));
        let sm = SessionManager::new(cm, dir.path(), 60);
        (sm, dir)
    }

    #[tokio::test]
    async fn launch_then_authorize_with_token() {
        let (sm, _dir) = session_manager();
        let (session, _agent) = sm
            .launch_session("sk-test", Some(json!({"id": "demo"})), None)
            .await
            .unwrap();

        assert!(sm.authorize(&session.session_id, Some(&session.session_token), None));
        assert!(!sm.authorize(&session.session_id, Some("wrong-token"), None));
    }

    #[tokio::test]
    async fn authorize_with_bearer_api_key() {
        let (sm, _dir) = session_manager();
        let (session, _agent) = sm.launch_session("sk-test", None, None).await.unwrap();

        assert!(sm.authorize(&session.session_id, None, Some("Bearer sk-test")));
        assert!(!sm.authorize(&session.session_id, None, Some("Bearer sk-wrong")));
    }

    #[tokio::test]
    async fn authorize_unknown_session_is_false() {
        let (sm, _dir) = session_manager();
        assert!(!sm.authorize("no-such-session", Some("anything"), None));
    }

    #[tokio::test]
    async fn rotate_token_invalidates_old_token() {
        let (sm, _dir) = session_manager();
        let (session, _agent) = sm.launch_session("sk-test", None, None).await.unwrap();
        let new_token = sm.rotate_token(&session.session_id).unwrap();

        assert!(!sm.authorize(&session.session_id, Some(&session.session_token), None));
        assert!(sm.authorize(&session.session_id, Some(&new_token), None));
    }

    #[tokio::test]
    async fn idle_timeout_zero_never_returns_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeContainerHost::new());
        let cm = Arc::new(ContainerManager::new(host, "agent-deck-worker:latest", dir.path()));
        let sm = SessionManager::new(cm, dir.path(), 0);
        sm.launch_session("sk-test", None, None).await.unwrap();
        assert!(sm.get_idle_sessions().is_empty());
    }

    #[tokio::test]
    async fn get_idle_sessions_returns_sessions_past_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeContainerHost::new());
        let cm = Arc::new(ContainerManager::new(host, "agent-deck-worker:latest", dir.path()));
        let sm = SessionManager::new(cm, dir.path(), 1);
        let (session, _agent) = sm.launch_session("sk-test", None, None).await.unwrap();

        assert!(sm.get_idle_sessions().is_empty());

        sm.backdate_for_test(&session.session_id, 2);
        assert_eq!(sm.get_idle_sessions(), vec![session.session_id.clone()]);
    }

    #[tokio::test]
    async fn delete_session_is_idempotent() {
        let (sm, _dir) = session_manager();
        let (session, _agent) = sm.launch_session("sk-test", None, None).await.unwrap();
        sm.delete_session(&session.session_id).await.unwrap();
        sm.delete_session(&session.session_id).await.unwrap();
        assert!(sm.get_session(&session.session_id).is_err());
    }

    #[tokio::test]
    async fn registry_survives_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FakeContainerHost::new());
        let cm = Arc::new(ContainerManager::new(host.clone(), "agent-deck-worker:latest", dir.path()));
        let sm = SessionManager::new(cm, dir.path(), 60);
        let (session, agent) = sm
            .launch_session("sk-test", Some(json!({"id": "demo"})), None)
            .await
            .unwrap();

        let cm2 = Arc::new(ContainerManager::new(host, "agent-deck-worker:latest", dir.path()));
        let sm2 = SessionManager::new(cm2, dir.path(), 60);

        let restored = sm2.get_session(&session.session_id).unwrap();
        assert_eq!(restored.session_id, session.session_id);
        assert_eq!(restored.created_at, session.created_at);
        assert!(sm2.container_manager().get_record(&agent.agent_id).is_some());
    }
}
