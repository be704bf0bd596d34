use thiserror::Error;

/// Errors raised by the Container Manager and its host adapter (spec §7).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContainerError {
    #[error(transparent)]
    Config(#[from] agentdeck_core::ConfigError),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// The agent record exists but the host has no matching container
    /// (distinct from `UnknownAgent`: the record itself is still present).
    #[error("container missing for agent: {0}")]
    MissingContainer(String),

    #[error("config file missing for agent: {0}")]
    MissingConfig(String),

    #[error("container host error: {0}")]
    Host(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
