//! Agent config normalization and worker environment assembly (spec §4.1).

use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Environment keys a per-MCP-server env map may never override.
pub const RESERVED_ENV_KEYS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "AGENT_CONFIG_JSON",
    "AGENT_ID",
    "SESSION_ID",
    "CONVERSATION_ID",
    "CONFIG_PATH",
];

/// Host environment variables passed through verbatim to the worker when set,
/// unless already occupied by a higher-priority key.
pub const PASSTHROUGH_ENV_KEYS: &[&str] = &[
    "ANTHROPIC_AUTH_TOKEN",
    "ANTHROPIC_BASE_URL",
    "ANTHROPIC_DEFAULT_HAIKU_MODEL",
    "ANTHROPIC_DEFAULT_OPUS_MODEL",
    "ANTHROPIC_DEFAULT_SONNET_MODEL",
    "ANTHROPIC_MODEL",
];

const BASE_MCP_TOOLS: &[&str] = &["ListMcpResources", "ReadMcpResource"];

/// Normalize a client-supplied config document in place, assigning `id`,
/// `name`, `permission_mode` defaults and augmenting `allowed_tools` for any
/// declared MCP servers. `agent_id` supplies the default `id`/`name`.
///
/// Idempotent: running this twice on its own output produces the same
/// document (§8 invariant 2) — every mutation is itself a "set if absent" or
/// "append if missing" operation.
pub fn normalize_config(mut config: Value, agent_id: &str) -> Result<Value, ConfigError> {
    let obj = config
        .as_object_mut()
        .ok_or_else(|| ConfigError::InvalidConfig("config must be a JSON object".to_string()))?;

    if !obj.contains_key("id") || obj.get("id").map(Value::is_null).unwrap_or(false) {
        obj.insert("id".to_string(), Value::String(agent_id.to_string()));
    }
    obj.entry("name".to_string())
        .or_insert_with(|| Value::String(format!("Agent {agent_id}")));
    obj.entry("permission_mode".to_string())
        .or_insert_with(|| Value::String("bypassPermissions".to_string()));

    normalize_allowed_tools(obj)?;

    Ok(config)
}

fn normalize_allowed_tools(obj: &mut Map<String, Value>) -> Result<(), ConfigError> {
    let allowed_tools = match obj.get("allowed_tools") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ConfigError::InvalidConfig("allowed_tools entries must be strings".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ConfigError::InvalidConfig(
                "allowed_tools must be a list when provided".to_string(),
            ));
        }
    };

    let mcp_servers = match obj.get("mcp_servers") {
        Some(Value::Object(m)) if !m.is_empty() => m.clone(),
        _ => Map::new(),
    };

    if mcp_servers.is_empty() {
        if !allowed_tools.is_empty() {
            obj.insert(
                "allowed_tools".to_string(),
                Value::Array(allowed_tools.into_iter().map(Value::String).collect()),
            );
        }
        return Ok(());
    }

    let mut seen: HashSet<String> = allowed_tools.iter().cloned().collect();
    let mut augmented = allowed_tools;

    for tool in BASE_MCP_TOOLS {
        if seen.insert(tool.to_string()) {
            augmented.push(tool.to_string());
        }
    }
    for server_name in mcp_servers.keys() {
        let wildcard = format!("mcp__{server_name}__*");
        if seen.insert(wildcard.clone()) {
            augmented.push(wildcard);
        }
    }

    obj.insert(
        "allowed_tools".to_string(),
        Value::Array(augmented.into_iter().map(Value::String).collect()),
    );
    Ok(())
}

/// Build the environment map a worker container is launched with (§4.1).
pub fn build_env(
    agent_id: &str,
    api_key: &str,
    session_id: Option<&str>,
    mcp_env: Option<&HashMap<String, HashMap<String, String>>>,
) -> Result<HashMap<String, String>, ConfigError> {
    let mut env = HashMap::new();
    env.insert("AGENT_ID".to_string(), agent_id.to_string());
    env.insert("ANTHROPIC_API_KEY".to_string(), api_key.to_string());
    env.insert(
        "CONFIG_PATH".to_string(),
        "/config/agent-config.json".to_string(),
    );
    if let Some(sid) = session_id {
        env.insert("SESSION_ID".to_string(), sid.to_string());
    }

    for key in PASSTHROUGH_ENV_KEYS {
        if env.contains_key(*key) {
            continue;
        }
        if let Ok(value) = std::env::var(key) {
            if !value.is_empty() {
                env.insert((*key).to_string(), value);
            }
        }
    }

    if let Some(mcp_env) = mcp_env {
        for server_env in mcp_env.values() {
            for (key, value) in server_env {
                if RESERVED_ENV_KEYS.contains(&key.as_str()) {
                    return Err(ConfigError::ReservedEnvKey(key.clone()));
                }
                env.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(env)
}

/// Merge a `config_id` query/body parameter into `config.id` per the launch
/// endpoint's contract (§4.3): a bare `config_id` with no inline config
/// becomes `{"id": config_id}`.
pub fn merge_config_id(config: Option<Value>, config_id: Option<&str>) -> Option<Value> {
    match (config, config_id) {
        (Some(Value::Object(mut obj)), Some(id)) => {
            obj.entry("id".to_string())
                .or_insert_with(|| Value::String(id.to_string()));
            Some(Value::Object(obj))
        }
        (Some(v), _) => Some(v),
        (None, Some(id)) => {
            let mut obj = Map::new();
            obj.insert("id".to_string(), Value::String(id.to_string()));
            Some(Value::Object(obj))
        }
        (None, None) => None,
    }
}
