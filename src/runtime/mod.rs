use crate::error::InspectError;
use crate::types::{ContainerEvent, ContainerSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod docker;
pub use docker::DockerRuntime;

#[async_trait]
pub trait ContainerRuntime {
    /// Start monitoring the runtime for container lifecycle changes.
    /// Events should be sent to the provided channel in the order observed.
    async fn monitor(&self, event_tx: mpsc::Sender<ContainerEvent>) -> Result<()>;
}

#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Current snapshot of a container.
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, InspectError>;
}
