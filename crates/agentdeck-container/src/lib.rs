pub mod docker_host;
pub mod error;
pub mod fake;
pub mod host;
pub mod manager;

pub use docker_host::DockerHost;
pub use error::ContainerError;
pub use fake::FakeContainerHost;
pub use host::{ContainerHandleInfo, ContainerHost, ContainerInspection, ContainerSpec, HostError};
pub use manager::ContainerManager;
