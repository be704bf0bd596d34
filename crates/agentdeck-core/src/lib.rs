pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod model;

pub use error::{ConfigError, CoreError};
pub use model::{AgentRecord, AgentStatus, SessionRecord};
