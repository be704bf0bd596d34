//! In-memory `ContainerHost` fake (spec §8.1) so CM's lifecycle logic, and the
//! seed end-to-end scenarios in the server crate, run without a live Docker
//! daemon.

use crate::host::{ContainerHandleInfo, ContainerHost, ContainerInspection, ContainerSpec, HostError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

struct FakeContainer {
    name: String,
    status: String,
    host_port: Option<u16>,
    removed: bool,
}

pub struct FakeContainerHost {
    containers: Mutex<HashMap<String, FakeContainer>>,
    volumes: Mutex<HashMap<String, ()>>,
    next_port: AtomicU16,
    next_id: AtomicU16,
    /// Agents that should appear "vanished" (as if removed out-of-band) the
    /// next time they're inspected, to exercise the `missing` state machine.
    vanished: Mutex<std::collections::HashSet<String>>,
}

impl Default for FakeContainerHost {
    fn default() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
            next_port: AtomicU16::new(40000),
            next_id: AtomicU16::new(1),
            vanished: Mutex::new(std::collections::HashSet::new()),
        }
    }
}

impl FakeContainerHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a container disappearing out-of-band (spec §8 scenario 4).
    pub fn vanish(&self, container_id: &str) {
        self.vanished.lock().unwrap().insert(container_id.to_string());
        self.containers.lock().unwrap().remove(container_id);
    }

    /// Pin a container's reported host port, so end-to-end tests can point it
    /// at a real listener bound to that port.
    pub fn set_host_port(&self, container_id: &str, port: u16) {
        if let Some(c) = self.containers.lock().unwrap().get_mut(container_id) {
            c.host_port = Some(port);
        }
    }
}

#[async_trait]
impl ContainerHost for FakeContainerHost {
    async fn run(&self, spec: ContainerSpec) -> Result<ContainerHandleInfo, HostError> {
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        self.containers.lock().unwrap().insert(
            id.clone(),
            FakeContainer {
                name: spec.name.clone(),
                status: "running".to_string(),
                host_port: Some(port),
                removed: false,
            },
        );
        self.volumes.lock().unwrap().insert(spec.volume.0.clone(), ());
        Ok(ContainerHandleInfo {
            container_id: id,
            container_name: spec.name,
            status: "running".to_string(),
            host_port: Some(port),
        })
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInspection, HostError> {
        if self.vanished.lock().unwrap().contains(container_id) {
            return Err(HostError::NotFound(container_id.to_string()));
        }
        let containers = self.containers.lock().unwrap();
        let c = containers
            .get(container_id)
            .filter(|c| !c.removed)
            .ok_or_else(|| HostError::NotFound(container_id.to_string()))?;
        Ok(ContainerInspection {
            status: c.status.clone(),
            host_port: c.host_port,
        })
    }

    async fn start(&self, container_id: &str) -> Result<(), HostError> {
        let mut containers = self.containers.lock().unwrap();
        let c = containers
            .get_mut(container_id)
            .ok_or_else(|| HostError::NotFound(container_id.to_string()))?;
        c.status = "running".to_string();
        if c.host_port.is_none() {
            c.host_port = Some(self.next_port.fetch_add(1, Ordering::SeqCst));
        }
        Ok(())
    }

    async fn stop(&self, container_id: &str, _grace: Duration) -> Result<(), HostError> {
        let mut containers = self.containers.lock().unwrap();
        let c = containers
            .get_mut(container_id)
            .ok_or_else(|| HostError::NotFound(container_id.to_string()))?;
        c.status = "exited".to_string();
        Ok(())
    }

    async fn remove(&self, container_id: &str, _force: bool) -> Result<(), HostError> {
        let mut containers = self.containers.lock().unwrap();
        if let Some(c) = containers.get_mut(container_id) {
            c.removed = true;
        }
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<(), HostError> {
        self.volumes.lock().unwrap().insert(name.to_string(), ());
        Ok(())
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<(), HostError> {
        self.volumes.lock().unwrap().remove(name);
        Ok(())
    }

    fn logs(
        &self,
        _container_id: &str,
        _rt: tokio::runtime::Handle,
    ) -> Result<Box<dyn Iterator<Item = std::io::Result<String>> + Send>, HostError> {
        Ok(Box::new(
            vec![Ok("fake log line".to_string())].into_iter(),
        ))
    }
}
