//! Shared error types. Subsystem-specific errors (container, session, API)
//! live in their own crates and convert from these via `#[from]`.

use thiserror::Error;

/// Errors raised while normalizing or validating a client-supplied agent config.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("reserved environment key: {0}")]
    ReservedEnvKey(String),
}

/// Umbrella alias kept for crates that only need to propagate a config error
/// without defining their own enum.
pub type CoreError = ConfigError;
