//! `ContainerHost` implementation backed by the Docker Engine API (`bollard`).

use crate::host::{ContainerHandleInfo, ContainerHost, ContainerInspection, ContainerSpec, HostError, WORKER_PORT};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{HostConfig, PortBinding};
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

pub struct DockerHost {
    client: Docker,
}

impl DockerHost {
    /// Connect using the same defaults `bollard` uses for the `docker` CLI:
    /// `DOCKER_HOST` when set, otherwise the platform-default local socket.
    pub fn connect() -> Result<Self, HostError> {
        let client = Docker::connect_with_local_defaults().map_err(map_err)?;
        Ok(Self { client })
    }
}

fn map_err(err: BollardError) -> HostError {
    if let BollardError::DockerResponseServerError { status_code, .. } = &err {
        if *status_code == 404 {
            return HostError::NotFound(err.to_string());
        }
    }
    HostError::Other(err.to_string())
}

fn resolve_host_port(inspect: &bollard::models::ContainerInspectResponse) -> Option<u16> {
    let bindings = inspect
        .network_settings
        .as_ref()?
        .ports
        .as_ref()?
        .get(WORKER_PORT)?
        .as_ref()?;
    bindings
        .first()
        .and_then(|b| b.host_port.as_ref())
        .and_then(|p| p.parse().ok())
}

#[async_trait]
impl ContainerHost for DockerHost {
    async fn run(&self, spec: ContainerSpec) -> Result<ContainerHandleInfo, HostError> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mut binds = Vec::new();
        for (host_path, container_path, read_only) in &spec.binds {
            let mode = if *read_only { "ro" } else { "rw" };
            binds.push(format!("{host_path}:{container_path}:{mode}"));
        }
        let (volume_name, volume_target) = &spec.volume;
        binds.push(format!("{volume_name}:{volume_target}:rw"));

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            WORKER_PORT.to_string(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: None,
            }]),
        );

        let host_config = HostConfig {
            binds: Some(binds),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(WORKER_PORT.to_string(), HashMap::new());

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(map_err)?;

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_err)?;

        let inspect = self.client.inspect_container(&created.id, None).await.map_err(map_err)?;
        let status = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "running".to_string());
        let host_port = resolve_host_port(&inspect);

        Ok(ContainerHandleInfo {
            container_id: created.id,
            container_name: spec.name,
            status,
            host_port,
        })
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInspection, HostError> {
        let inspect = self.client.inspect_container(container_id, None).await.map_err(map_err)?;
        let status = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ContainerInspection {
            status,
            host_port: resolve_host_port(&inspect),
        })
    }

    async fn start(&self, container_id: &str) -> Result<(), HostError> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_err)
    }

    async fn stop(&self, container_id: &str, grace: Duration) -> Result<(), HostError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.client.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn remove(&self, container_id: &str, force: bool) -> Result<(), HostError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            link: false,
        };
        match self.client.remove_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn create_volume(&self, name: &str) -> Result<(), HostError> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            ..Default::default()
        };
        self.client.create_volume(options).await.map_err(map_err)?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), HostError> {
        let options = RemoveVolumeOptions { force };
        match self.client.remove_volume(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(map_err(e)),
        }
    }

    fn logs(
        &self,
        container_id: &str,
        rt: tokio::runtime::Handle,
    ) -> Result<Box<dyn Iterator<Item = std::io::Result<String>> + Send>, HostError> {
        let client = self.client.clone();
        let container_id = container_id.to_string();
        let (tx, rx) = std::sync::mpsc::channel::<std::io::Result<String>>();

        rt.spawn(async move {
            let options = LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                tail: "0".to_string(),
                ..Default::default()
            };
            let mut stream = client.logs(&container_id, Some(options));
            while let Some(chunk) = stream.next().await {
                let line = match chunk {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                        String::from_utf8_lossy(&message).into_owned()
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(std::io::Error::other(e.to_string())));
                        break;
                    }
                };
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(rx.into_iter()))
    }
}
