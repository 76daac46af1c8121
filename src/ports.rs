//! Selection of the ports of a container that should become services.

use crate::types::{ContainerSnapshot, Protocol, PublishedPort};

/// Addressing policy for port selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortPolicy {
    /// Advertise the container address even when the port is published.
    pub register_internal_address: bool,
    /// Restrict registration to published ports: exposed ports without a
    /// host binding are skipped.
    pub register_exposed_ports: bool,
}

/// Returns the registration candidates of `container`, ordered by port key.
///
/// A published port is advertised on its first host binding, or on the
/// container address when `register_internal_address` is set. An unpublished
/// port is advertised on the container address unless
/// `register_exposed_ports` is set.
pub fn resolve_ports<'a>(container: &'a ContainerSnapshot, policy: PortPolicy) -> Vec<PublishedPort<'a>> {
    let mut keys: Vec<&String> = container.ports.keys().collect();
    keys.sort();

    let mut ports = Vec::new();
    for key in keys {
        let bindings = &container.ports[key];
        let (exposed, proto) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
        let protocol = Protocol::parse(proto);

        match bindings.first() {
            Some(binding) if !policy.register_internal_address => ports.push(PublishedPort {
                host_port: binding.host_port.clone(),
                host_ip: binding.host_ip.clone(),
                exposed_port: exposed.to_string(),
                protocol,
                container,
            }),
            Some(_) => ports.push(internal(container, exposed, protocol)),
            None if !policy.register_exposed_ports => {
                ports.push(internal(container, exposed, protocol))
            }
            None => {}
        }
    }
    ports
}

fn internal<'a>(container: &'a ContainerSnapshot, exposed: &str, protocol: Protocol) -> PublishedPort<'a> {
    PublishedPort {
        host_port: exposed.to_string(),
        host_ip: container.ip_address.clone(),
        exposed_port: exposed.to_string(),
        protocol,
        container,
    }
}
