//! Registry backend that hands updates to a publisher task.
//!
//! [`ChannelRegistry`] only enqueues; [`run_publisher`] applies each update
//! to the shared catalog and emits it as a JSON line.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, RwLock};

use super::ServiceRegistry;
use crate::error::RegistryError;
use crate::types::{Service, Update};

/// Service id to the service currently published under it.
pub type Catalog = Arc<RwLock<HashMap<String, Service>>>;

#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    update_tx: mpsc::Sender<Update>,
}

impl ChannelRegistry {
    pub fn new(update_tx: mpsc::Sender<Update>) -> Self {
        Self { update_tx }
    }

    async fn send(&self, update: Update) -> Result<(), RegistryError> {
        self.update_tx
            .send(update)
            .await
            .map_err(|_| RegistryError::Closed)
    }
}

#[async_trait]
impl ServiceRegistry for ChannelRegistry {
    async fn register(&self, service: &Service) -> Result<(), RegistryError> {
        // Unparseable host ports come through as zero.
        if service.port == 0 {
            return Err(RegistryError::Rejected(format!("{} has no usable port", service.id)));
        }
        self.send(Update::Register(service.clone())).await
    }

    async fn deregister(&self, service: &Service) -> Result<(), RegistryError> {
        self.send(Update::Deregister(service.clone())).await
    }
}

/// Consumes updates until every sender is gone.
pub async fn run_publisher<W>(
    mut update_rx: mpsc::Receiver<Update>,
    catalog: Catalog,
    mut out: W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(update) = update_rx.recv().await {
        let mut line = match serde_json::to_vec(&update) {
            Ok(b) => b,
            Err(e) => {
                error!("Failed to serialize update: {}", e);
                continue;
            }
        };
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;

        apply_update(update, &catalog).await;
    }
    info!("Update channel closed, publisher shutting down");
    Ok(())
}

async fn apply_update(update: Update, catalog: &Catalog) {
    let mut map = catalog.write().await;
    match update {
        Update::Register(service) => {
            info!("Published {}", service);
            map.insert(service.id.clone(), service);
        }
        Update::Deregister(service) => {
            map.remove(&service.id);
            info!("Withdrew {}", service.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn service(id: &str) -> Service {
        Service {
            id: id.into(),
            name: "nginx".into(),
            port: 8080,
            ip: "10.0.0.5".into(),
            tags: vec!["prod".into()],
            attrs: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn publisher_tracks_catalog_and_writes_json_lines() {
        let (tx, rx) = mpsc::channel(8);
        let registry = ChannelRegistry::new(tx);
        let catalog = Catalog::default();

        registry.register(&service("a")).await.unwrap();
        registry.register(&service("b")).await.unwrap();
        registry.deregister(&service("a")).await.unwrap();
        drop(registry);

        let mut out = Vec::new();
        run_publisher(rx, catalog.clone(), &mut out).await.unwrap();

        let map = catalog.read().await;
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("b"));

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2]["op"], "deregister");
        assert_eq!(lines[2]["service"]["id"], "a");
    }

    #[tokio::test]
    async fn zero_port_is_rejected_but_can_be_withdrawn() {
        let (tx, mut rx) = mpsc::channel(4);
        let registry = ChannelRegistry::new(tx);
        let broken = Service {
            port: 0,
            ..service("a")
        };

        assert!(matches!(
            registry.register(&broken).await,
            Err(RegistryError::Rejected(_))
        ));
        registry.deregister(&broken).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Update::Deregister(s)) if s.id == "a"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let registry = ChannelRegistry::new(tx);
        assert_eq!(registry.register(&service("a")).await, Err(RegistryError::Closed));
    }
}
