use thiserror::Error;

/// Errors raised by the Session Manager (spec §7).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error(transparent)]
    Container(#[from] agentdeck_container::ContainerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
