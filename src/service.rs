//! Derivation of [`Service`] records from selected container ports.

use crate::host::HostIdentity;
use crate::metadata::{parse_metadata, DEFAULT_PREFIX};
use crate::types::{Protocol, PublishedPort, Service};

/// Result of deriving a service from one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derivation {
    Service(Service),
    /// The port carries an `ignore` marker.
    Suppressed,
}

/// Builds service records for the ports of one host.
#[derive(Debug, Clone)]
pub struct ServiceFactory {
    host: HostIdentity,
    host_ip: Option<String>,
    prefix: String,
}

impl ServiceFactory {
    pub fn new(host: HostIdentity) -> Self {
        Self {
            host,
            host_ip: None,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Advertise `ip` for every service, whatever the port binding says.
    pub fn with_host_ip(mut self, ip: Option<String>) -> Self {
        self.host_ip = ip.filter(|ip| !ip.is_empty());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Derives the service for `port`. `multi_port` is set when the owning
    /// container has more than one candidate port, which makes default names
    /// carry the exposed port.
    pub fn new_service(&self, port: &PublishedPort<'_>, multi_port: bool) -> Derivation {
        let container = port.container;

        let mut default_name = image_name(&container.image).to_string();
        if multi_port {
            default_name = format!("{}-{}", default_name, port.exposed_port);
        }

        let mut ip = port.host_ip.clone();
        let id_host = match &self.host.hostname {
            Some(hostname) => {
                if ip == "0.0.0.0" {
                    if let Some(address) = &self.host.address {
                        ip = address.clone();
                    }
                }
                hostname.clone()
            }
            None => port.host_ip.clone(),
        };
        if let Some(override_ip) = &self.host_ip {
            ip = override_ip.clone();
        }

        let mut metadata = parse_metadata(&container.env, &self.prefix, &port.exposed_port);
        if metadata.get("ignore").is_some_and(|v| !v.is_empty()) {
            return Derivation::Suppressed;
        }

        let mut id = format!("{}:{}:{}", id_host, container.bare_name(), port.exposed_port);
        let mut tags: Vec<String> = match metadata.remove("tags") {
            Some(tags) if !tags.is_empty() => tags.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        if port.protocol == Protocol::Udp {
            id.push_str(":udp");
            tags.push("udp".to_string());
        }
        if let Some(explicit) = metadata.remove("id").filter(|v| !v.is_empty()) {
            id = explicit;
        }
        let name = metadata
            .remove("name")
            .filter(|v| !v.is_empty())
            .unwrap_or(default_name);

        Derivation::Service(Service {
            id,
            name,
            port: port.host_port.parse().unwrap_or(0),
            ip,
            tags,
            attrs: metadata,
        })
    }
}

/// Image reference reduced to its bare repository name: no registry or
/// namespace path, no tag, no digest.
fn image_name(image: &str) -> &str {
    let base = image.trim_end_matches('/').rsplit('/').next().unwrap_or(image);
    base.split([':', '@']).next().unwrap_or(base)
}
