use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use crate::metadata::DEFAULT_PREFIX;
use crate::ports::PortPolicy;
use crate::retry::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub register_internal_address: bool,
    pub register_exposed_ports: bool,
    /// Address advertised for every service instead of the port binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    pub retry_attempts: u32,
    pub retry_interval_ms: u64,
    pub retry_backoff: Backoff,
    pub retry_max_interval_ms: u64,
    /// Register containers that are already running on (re)connect.
    pub resync: bool,
    pub metadata_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            register_internal_address: false,
            register_exposed_ports: false,
            host_ip: None,
            retry_attempts: 3,
            retry_interval_ms: 1000,
            retry_backoff: Backoff::Exponential,
            retry_max_interval_ms: 10_000,
            resync: true,
            metadata_prefix: DEFAULT_PREFIX.into(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("registrar.toml"))
                .merge(Json::file("registrar.json"))
                .merge(Env::prefixed("REGISTRAR_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // An empty override is the same as none.
        config.host_ip = config.host_ip.filter(|ip| !ip.trim().is_empty());
        if let Some(ref ip) = config.host_ip {
            ip.parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid host_ip {:?}: {}", ip, e))?;
        }
        if config.metadata_prefix.is_empty() {
            anyhow::bail!("metadata_prefix must not be empty");
        }

        Ok(config)
    }

    pub fn port_policy(&self) -> PortPolicy {
        PortPolicy {
            register_internal_address: self.register_internal_address,
            register_exposed_ports: self.register_exposed_ports,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_interval_ms),
            Duration::from_millis(self.retry_max_interval_ms),
            self.retry_backoff,
        )
    }
}
