//! Durable registry persistence (spec §4.2, §9): a single atomic JSON
//! snapshot of every agent and session, written via temp-file + rename.

use agentdeck_core::model::{AgentRecord, SessionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub agents: HashMap<String, AgentRecord>,
    pub sessions: HashMap<String, SessionRecord>,
}

/// Load the registry from `path`. Missing or corrupt files are *not* fatal
/// (spec §7): a warning is logged and an empty snapshot is returned.
pub fn load(path: &Path) -> RegistrySnapshot {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no existing registry, starting empty");
            return RegistrySnapshot::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read registry, starting empty");
            return RegistrySnapshot::default();
        }
    };

    match serde_json::from_str(&data) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse registry, starting empty");
            RegistrySnapshot::default()
        }
    }
}

/// Persist `snapshot` to `path` via a sibling temp file + rename, which is
/// crash-atomic on POSIX. The registry contains bearer secrets
/// (`session_token`), so the file is written with owner-only permissions on
/// Unix.
pub fn save(path: &Path, snapshot: &RegistrySnapshot) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let data = serde_json::to_string_pretty(snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tmp.write_all(data.as_bytes())?;
    tmp.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file().set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_session() -> SessionRecord {
        SessionRecord {
            session_id: "sess-1".to_string(),
            session_token: "token-1".to_string(),
            agent_id: "agent-1".to_string(),
            config_id: "demo".to_string(),
            created_at: Utc::now(),
            last_active: Utc::now(),
            api_key_hash: "deadbeef".to_string(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = load(&dir.path().join("registry.json"));
        assert!(snapshot.agents.is_empty());
        assert!(snapshot.sessions.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "not json").unwrap();
        let snapshot = load(&path);
        assert!(snapshot.sessions.is_empty());
    }

    #[test]
    fn round_trip_preserves_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let mut snapshot = RegistrySnapshot::default();
        snapshot.sessions.insert("sess-1".to_string(), sample_session());
        save(&path, &snapshot).unwrap();

        let loaded = load(&path);
        assert_eq!(loaded.sessions["sess-1"].session_token, "token-1");
    }
}
