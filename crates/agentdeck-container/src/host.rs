//! The `ContainerHost` seam (spec §4.1.1): the only layer that speaks to a
//! real container runtime. CM depends on this trait, never on `bollard`
//! directly, so its lifecycle logic can be tested against an in-memory fake.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub const WORKER_PORT: &str = "3000/tcp";

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub env: HashMap<String, String>,
    /// host path -> (container path, read_only)
    pub binds: Vec<(String, String, bool)>,
    pub volume: (String, String),
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ContainerHandleInfo {
    pub container_id: String,
    pub container_name: String,
    pub status: String,
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct ContainerInspection {
    pub status: String,
    pub host_port: Option<u16>,
}

/// Thin async abstraction over a local container runtime.
///
/// `logs` is the one intentionally **blocking** method: it returns a boxed
/// iterator meant to be driven from a dedicated OS thread (spec §4.3/§9), not
/// awaited on the async runtime.
#[async_trait]
pub trait ContainerHost: Send + Sync {
    async fn run(&self, spec: ContainerSpec) -> Result<ContainerHandleInfo, HostError>;
    async fn inspect(&self, container_id: &str) -> Result<ContainerInspection, HostError>;
    async fn start(&self, container_id: &str) -> Result<(), HostError>;
    async fn stop(&self, container_id: &str, grace: Duration) -> Result<(), HostError>;
    async fn remove(&self, container_id: &str, force: bool) -> Result<(), HostError>;
    async fn create_volume(&self, name: &str) -> Result<(), HostError>;
    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), HostError>;

    /// Blocking iterator over log lines; intended to be driven on a dedicated
    /// OS thread, never `.await`ed. `rt` is the caller's Tokio runtime
    /// handle, captured from async context, used to drive the (necessarily
    /// async) underlying client from that dedicated thread.
    fn logs(
        &self,
        container_id: &str,
        rt: tokio::runtime::Handle,
    ) -> Result<Box<dyn Iterator<Item = std::io::Result<String>> + Send>, HostError>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum HostError {
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("container host error: {0}")]
    Other(String),
}
