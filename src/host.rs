//! Identity of the machine the bridge runs on.
//!
//! The hostname prefixes every computed service id, and its resolved
//! address replaces wildcard (`0.0.0.0`) host bindings.

use std::env;
use std::fs;

use hickory_resolver::TokioAsyncResolver;
use log::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentity {
    /// Local hostname, if it could be determined.
    pub hostname: Option<String>,
    /// First address the hostname resolves to.
    pub address: Option<String>,
}

impl HostIdentity {
    pub fn new(hostname: Option<String>, address: Option<String>) -> Self {
        Self { hostname, address }
    }

    /// Determines the hostname (`HOSTNAME`, else `/etc/hostname`) and
    /// resolves it once through the system resolver. Both parts are best
    /// effort.
    pub async fn detect() -> Self {
        let Some(hostname) = local_hostname() else {
            warn!("Unable to determine local hostname; service ids will use host addresses");
            return Self::default();
        };

        let address = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => match resolver.lookup_ip(hostname.as_str()).await {
                Ok(lookup) => lookup.iter().next().map(|ip| ip.to_string()),
                Err(e) => {
                    debug!("Unable to resolve hostname {}: {}", hostname, e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to load system resolver configuration: {}", e);
                None
            }
        };

        info!("Host identity: {} ({})", hostname, address.as_deref().unwrap_or("unresolved"));
        Self::new(Some(hostname), address)
    }
}

/// `HOSTNAME` is only set when exported (containers, login shells); under
/// systemd or cron `/etc/hostname` is the real source. Linux only: there is
/// no uname fallback.
fn local_hostname() -> Option<String> {
    pick_hostname(env::var("HOSTNAME").ok(), || fs::read_to_string("/etc/hostname").ok())
}

fn pick_hostname(from_env: Option<String>, from_file: impl FnOnce() -> Option<String>) -> Option<String> {
    let trimmed = |raw: String| {
        let name = raw.trim();
        (!name.is_empty()).then(|| name.to_string())
    };
    from_env.and_then(trimmed).or_else(|| from_file().and_then(trimmed))
}
