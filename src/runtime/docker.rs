use super::{ContainerInspector, ContainerRuntime};
use crate::error::InspectError;
use crate::types::{short_id, ContainerEvent, ContainerSnapshot, PortBinding};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::ContainerInspectResponse;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    resync: bool,
}

impl DockerRuntime {
    /// Creates a client for the local Docker daemon. No connection is made
    /// until the first request.
    pub fn connect(resync: bool) -> Result<Self> {
        // Handles the unix socket on Linux and DOCKER_HOST when set.
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, resync })
    }

    async fn running_containers(&self) -> Result<Vec<String>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn send(event_tx: &mpsc::Sender<ContainerEvent>, event: ContainerEvent) -> Result<()> {
        event_tx
            .send(event)
            .await
            .map_err(|_| anyhow!("Channel closed"))
    }
}

#[async_trait]
impl ContainerInspector for DockerRuntime {
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, InspectError> {
        let detail = self.docker.inspect_container(container_id, None).await?;
        snapshot_from(detail).ok_or_else(|| InspectError::NotFound(container_id.to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn monitor(&self, event_tx: mpsc::Sender<ContainerEvent>) -> Result<()> {
        loop {
            if let Err(e) = self.docker.ping().await {
                error!("Failed to connect to Docker: {}. Retrying in 5s...", e);
                sleep(Duration::from_secs(5)).await;
                continue;
            }

            if self.resync {
                match self.running_containers().await {
                    Ok(ids) => {
                        info!("Initial scan found {} running containers", ids.len());
                        Self::send(&event_tx, ContainerEvent::Resync(ids)).await?;
                    }
                    Err(e) => {
                        error!("Failed initial scan: {}. Retrying in 5s...", e);
                        sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                }
            }

            // Event stream
            let opts = EventsOptions::<String> {
                filters: [
                    ("type", ["container"].as_slice()),
                    ("event", ["start", "die"].as_slice()),
                ]
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect(),
                ..Default::default()
            };

            let mut stream = self.docker.events(Some(opts));

            info!("Listening for Docker events...");
            while let Some(msg) = stream.next().await {
                let event = match msg {
                    Ok(event) => event,
                    Err(e) => {
                        error!("Error in Docker event stream: {}", e);
                        break; // Break inner loop to reconnect
                    }
                };
                let Some(id) = event.actor.and_then(|a| a.id).filter(|id| !id.is_empty()) else {
                    continue;
                };

                let action = event.action.unwrap_or_default();
                debug!("Container event: {} for {}", action, short_id(&id));

                match action.as_str() {
                    "start" => Self::send(&event_tx, ContainerEvent::Started(id)).await?,
                    "die" => Self::send(&event_tx, ContainerEvent::Stopped(id)).await?,
                    _ => {}
                }
            }

            warn!("Docker event stream ended. Reconnecting in 2s...");
            sleep(Duration::from_secs(2)).await;
        }
    }
}

/// Flattens Docker's inspect response. `None` when the response carries no
/// container id.
fn snapshot_from(detail: ContainerInspectResponse) -> Option<ContainerSnapshot> {
    let id = detail.id.filter(|id| !id.is_empty())?;
    let config = detail.config.unwrap_or_default();
    let settings = detail.network_settings.unwrap_or_default();

    let ports: HashMap<String, Vec<PortBinding>> = settings
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| PortBinding {
                    host_ip: b.host_ip.unwrap_or_default(),
                    host_port: b.host_port.unwrap_or_default(),
                })
                .collect();
            (port, bindings)
        })
        .collect();

    Some(ContainerSnapshot {
        id,
        name: detail.name.unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        ip_address: settings.ip_address.unwrap_or_default(),
        ports,
    })
}
