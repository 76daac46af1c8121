//! Data structures shared across the bridge.
//!
//! A [`ContainerSnapshot`] is what the runtime reports about a running
//! container; a [`PublishedPort`] is one port of that snapshot chosen for
//! registration; a [`Service`] is the registry-facing record derived from it.
//! [`Update`] is what the registry backend forwards to its publisher, and
//! [`ContainerEvent`] is what the runtime monitor feeds the bridge.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport of an exposed port, taken from Docker's `port/proto` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Docker omits the protocol for tcp in a few places, so anything that
    /// is not `udp` is treated as tcp.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("udp") {
            Protocol::Udp
        } else {
            Protocol::Tcp
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// One host binding of an exposed port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// Point-in-time view of a container, as far as the bridge cares.
#[derive(Debug, Clone, Default)]
pub struct ContainerSnapshot {
    /// Full container id.
    pub id: String,
    /// Container name as reported by Docker, including the leading `/`.
    pub name: String,
    pub image: String,
    /// Environment in `KEY=VALUE` form, in declaration order.
    pub env: Vec<String>,
    /// Address on the default bridge network; empty when there is none.
    pub ip_address: String,
    /// `"port/proto"` to its host bindings. Exposed but unpublished ports
    /// map to an empty list.
    pub ports: HashMap<String, Vec<PortBinding>>,
}

impl ContainerSnapshot {
    /// Name without Docker's leading slash.
    pub fn bare_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }
}

/// A port of a container selected for registration.
///
/// Borrows the snapshot it came from; it only lives for one `Add` call.
#[derive(Debug, Clone)]
pub struct PublishedPort<'a> {
    pub host_port: String,
    pub host_ip: String,
    pub exposed_port: String,
    pub protocol: Protocol,
    pub container: &'a ContainerSnapshot,
}

/// A registry-facing service record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub port: u16,
    pub ip: String,
    pub tags: Vec<String>,
    pub attrs: BTreeMap<String, String>,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} at {}:{})", self.id, self.name, self.ip, self.port)
    }
}

/// A change forwarded by the channel registry to the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "service", rename_all = "lowercase")]
pub enum Update {
    /// A service should become visible.
    Register(Service),
    /// A service should be withdrawn.
    Deregister(Service),
}

/// A container lifecycle change reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// Full set of running containers, listed after (re)connecting to the
    /// runtime.
    Resync(Vec<String>),
    /// The container just started.
    Started(String),
    /// The container exited.
    Stopped(String),
}

/// Docker ids are 64 hex chars; logs use the usual 12 char prefix.
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
