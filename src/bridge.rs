//! Translation of container lifecycle events into registry updates.
//!
//! The bridge remembers which services it registered for each container so
//! that a stop event withdraws exactly those. Every `add`, `remove` and
//! `resync` runs under one lock, registry calls and retries included, so
//! calls for any two containers never interleave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::error::{BridgeError, RegistryError};
use crate::ports::{resolve_ports, PortPolicy};
use crate::registry::ServiceRegistry;
use crate::retry::RetryPolicy;
use crate::runtime::ContainerInspector;
use crate::service::{Derivation, ServiceFactory};
use crate::types::{short_id, ContainerEvent, ContainerSnapshot, PublishedPort, Service};

type ServiceMap = HashMap<String, Vec<Arc<Service>>>;

/// What happened to one candidate port during `add`.
#[derive(Debug, Clone)]
pub enum PortOutcome {
    Registered(Arc<Service>),
    Suppressed { exposed_port: String },
    Failed { service: Service, error: RegistryError },
}

#[derive(Debug, Clone, Default)]
pub struct AddReport {
    pub container_id: String,
    /// One entry per candidate port. Empty when the container had none.
    pub outcomes: Vec<PortOutcome>,
}

impl AddReport {
    pub fn registered(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.outcomes.iter().filter_map(|o| match o {
            PortOutcome::Registered(service) => Some(service),
            _ => None,
        })
    }

    pub fn suppressed(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|o| match o {
            PortOutcome::Suppressed { exposed_port } => Some(exposed_port.as_str()),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Service, &RegistryError)> {
        self.outcomes.iter().filter_map(|o| match o {
            PortOutcome::Failed { service, error } => Some((service, error)),
            _ => None,
        })
    }
}

/// What happened to one tracked service during `remove`.
#[derive(Debug, Clone)]
pub enum RemoveOutcome {
    Deregistered(Arc<Service>),
    Failed { service: Arc<Service>, error: RegistryError },
}

#[derive(Debug, Clone, Default)]
pub struct RemoveReport {
    pub container_id: String,
    pub outcomes: Vec<RemoveOutcome>,
}

impl RemoveReport {
    pub fn deregistered(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.outcomes.iter().filter_map(|o| match o {
            RemoveOutcome::Deregistered(service) => Some(service),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Arc<Service>, &RegistryError)> {
        self.outcomes.iter().filter_map(|o| match o {
            RemoveOutcome::Failed { service, error } => Some((service, error)),
            _ => None,
        })
    }
}

/// Result of reconciling tracked containers with the running set.
///
/// A container whose services changed shows up in both `removed` and
/// `added`.
#[derive(Debug, Clone, Default)]
pub struct ResyncReport {
    pub unchanged: Vec<String>,
    pub removed: Vec<RemoveReport>,
    pub added: Vec<AddReport>,
}

pub struct RegistryBridge<I, R> {
    inspector: I,
    registry: R,
    factory: ServiceFactory,
    policy: PortPolicy,
    retry: RetryPolicy,
    services: Mutex<ServiceMap>,
}

impl<I, R> RegistryBridge<I, R>
where
    I: ContainerInspector,
    R: ServiceRegistry,
{
    pub fn new(
        inspector: I,
        registry: R,
        factory: ServiceFactory,
        policy: PortPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inspector,
            registry,
            factory,
            policy,
            retry,
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a service for every eligible port of the container.
    ///
    /// Ports are handled independently: a suppressed port or a failed
    /// registration does not affect its siblings. Only successfully
    /// registered services are tracked.
    pub async fn add(&self, container_id: &str) -> Result<AddReport, BridgeError> {
        let mut services = self.services.lock().await;
        let container = self.inspect(container_id).await?;
        Ok(self.register_container(&mut services, &container).await)
    }

    /// Deregisters every service tracked for the container and forgets the
    /// container, whether or not each deregistration succeeded.
    pub async fn remove(&self, container_id: &str) -> RemoveReport {
        let mut services = self.services.lock().await;
        self.deregister_container(&mut services, container_id).await
    }

    /// Reconciles tracked state with the containers currently running.
    ///
    /// Tracked containers missing from `running` are removed. Running
    /// containers are inspected again: untracked ones are added, and tracked
    /// ones whose derived services no longer match what was registered are
    /// removed and added again. A running container that cannot be inspected
    /// keeps whatever it had.
    pub async fn resync(&self, running: &[String]) -> ResyncReport {
        let mut services = self.services.lock().await;
        let mut report = ResyncReport::default();

        let alive: HashSet<&str> = running.iter().map(String::as_str).collect();
        let stale: Vec<String> = services
            .keys()
            .filter(|id| !alive.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            info!("{} is no longer running", short_id(&id));
            report.removed.push(self.deregister_container(&mut services, &id).await);
        }

        for id in running {
            let container = match self.inspect(id).await {
                Ok(container) => container,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };

            if let Some(tracked) = services.get(&container.id) {
                if self.matches(tracked, &container) {
                    report.unchanged.push(container.id.clone());
                    continue;
                }
                info!("{} changed since it was registered", short_id(&container.id));
                let removed = self.deregister_container(&mut services, &container.id).await;
                report.removed.push(removed);
            }
            report.added.push(self.register_container(&mut services, &container).await);
        }
        report
    }

    pub async fn is_tracked(&self, container_id: &str) -> bool {
        self.services.lock().await.contains_key(container_id)
    }

    pub async fn container_count(&self) -> usize {
        self.services.lock().await.len()
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, BridgeError> {
        self.inspector
            .inspect(container_id)
            .await
            .map_err(|source| BridgeError::Inspection {
                container: short_id(container_id).to_string(),
                source,
            })
    }

    fn derive<'a>(&self, container: &'a ContainerSnapshot) -> Vec<(PublishedPort<'a>, Derivation)> {
        let ports = resolve_ports(container, self.policy);
        let multi_port = ports.len() > 1;
        ports
            .into_iter()
            .map(|port| {
                let derivation = self.factory.new_service(&port, multi_port);
                (port, derivation)
            })
            .collect()
    }

    /// Whether `tracked` is exactly what the container derives to now.
    fn matches(&self, tracked: &[Arc<Service>], container: &ContainerSnapshot) -> bool {
        let mut current: Vec<Service> = self
            .derive(container)
            .into_iter()
            .filter_map(|(_, derivation)| match derivation {
                Derivation::Service(service) => Some(service),
                Derivation::Suppressed => None,
            })
            .collect();
        let mut tracked: Vec<Service> = tracked.iter().map(|s| Service::clone(s)).collect();
        current.sort_by(|a, b| a.id.cmp(&b.id));
        tracked.sort_by(|a, b| a.id.cmp(&b.id));
        current == tracked
    }

    async fn register_container(&self, services: &mut ServiceMap, container: &ContainerSnapshot) -> AddReport {
        let short = short_id(&container.id);
        let mut report = AddReport {
            container_id: container.id.clone(),
            outcomes: Vec::new(),
        };

        let derived = self.derive(container);
        if derived.is_empty() {
            info!("ignored: {} no published ports", short);
            return report;
        }

        for (port, derivation) in derived {
            let service = match derivation {
                Derivation::Service(service) => service,
                Derivation::Suppressed => {
                    info!("ignored: {} service on port {}/{}", short, port.exposed_port, port.protocol);
                    report.outcomes.push(PortOutcome::Suppressed {
                        exposed_port: port.exposed_port,
                    });
                    continue;
                }
            };

            match self.retry.run(|| self.registry.register(&service)).await {
                Ok(()) => {
                    info!("added: {} {}", short, service.id);
                    let service = Arc::new(service);
                    services
                        .entry(container.id.clone())
                        .or_default()
                        .push(Arc::clone(&service));
                    report.outcomes.push(PortOutcome::Registered(service));
                }
                Err(error) => {
                    warn!("unable to register service {}: {}", service, error);
                    report.outcomes.push(PortOutcome::Failed { service, error });
                }
            }
        }
        report
    }

    async fn deregister_container(&self, services: &mut ServiceMap, container_id: &str) -> RemoveReport {
        let mut report = RemoveReport {
            container_id: container_id.to_string(),
            outcomes: Vec::new(),
        };

        let Some(tracked) = services.remove(container_id) else {
            debug!("{} has no registered services", short_id(container_id));
            return report;
        };

        for service in tracked {
            match self.retry.run(|| self.registry.deregister(&service)).await {
                Ok(()) => {
                    info!("removed: {} {}", short_id(container_id), service.id);
                    report.outcomes.push(RemoveOutcome::Deregistered(service));
                }
                Err(error) => {
                    warn!("unable to deregister service {}: {}", service.id, error);
                    report.outcomes.push(RemoveOutcome::Failed { service, error });
                }
            }
        }
        report
    }
}

/// Feeds runtime events into the bridge in arrival order until the
/// runtime side of the channel closes.
pub async fn run_bridge<I, R>(
    mut event_rx: mpsc::Receiver<ContainerEvent>,
    bridge: Arc<RegistryBridge<I, R>>,
) -> anyhow::Result<()>
where
    I: ContainerInspector,
    R: ServiceRegistry,
{
    while let Some(event) = event_rx.recv().await {
        match event {
            ContainerEvent::Resync(running) => {
                let report = bridge.resync(&running).await;
                report.added.iter().for_each(log_add);
                report.removed.iter().for_each(log_remove);
                info!(
                    "Resync: {} unchanged, {} removed, {} added",
                    report.unchanged.len(),
                    report.removed.len(),
                    report.added.len()
                );
            }
            ContainerEvent::Started(id) => match bridge.add(&id).await {
                Ok(report) => log_add(&report),
                Err(e) => warn!("{}", e),
            },
            ContainerEvent::Stopped(id) => log_remove(&bridge.remove(&id).await),
        }
    }
    info!("Runtime event channel closed, bridge shutting down");
    Ok(())
}

fn log_add(report: &AddReport) {
    if report.outcomes.is_empty() {
        return;
    }
    let suppressed: Vec<&str> = report.suppressed().collect();
    debug!(
        "{}: {} registered, {} failed, ignored ports {:?}",
        short_id(&report.container_id),
        report.registered().count(),
        report.failed().count(),
        suppressed
    );
}

fn log_remove(report: &RemoveReport) {
    let deregistered = report.deregistered().count();
    for (service, error) in report.failed() {
        warn!(
            "{}: forgot {} after failed deregistration ({})",
            short_id(&report.container_id),
            service.id,
            error
        );
    }
    if deregistered > 0 {
        debug!("{}: {} services deregistered", short_id(&report.container_id), deregistered);
    }
}
