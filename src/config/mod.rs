//! # Bridge Configuration
//!
//! Typed configuration for the runtime, the cluster coordination layer and the
//! deployment table. Values are layered by [`ConfigManager`]: built-in defaults,
//! then `config.json` from the configuration directory, then an optional
//! per-project `config.<project_name>.json` in the working directory, then
//! `BRIDGE__SECTION__KEY` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lifecycle_bridge::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let pool_size = manager.config().runtime.event_loop_pool_size;
//! let clustered = manager.config().cluster.clustered;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::constants::{defaults, files};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{ConfigManager, ConfigSources};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Selects the external `config.<project_name>.json` override file
    pub project_name: Option<String>,

    /// Execution engine sizing
    pub runtime: RuntimeOptions,

    /// Cluster membership settings
    pub cluster: ClusterOptions,

    /// Deployment table limits
    pub deployment: DeploymentOptions,
}

/// Sizing of the owned execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Number of async worker threads driving deployed units
    pub event_loop_pool_size: usize,
    /// Upper bound on threads used for blocking work
    pub worker_pool_size: usize,
    /// Thread name prefix
    pub thread_name: String,
    /// Mailbox capacity of each event bus consumer
    pub event_bus_capacity: usize,
    /// Worker `start` calls slower than this are reported
    pub max_start_time_ms: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            event_loop_pool_size: defaults::EVENT_LOOP_POOL_SIZE,
            worker_pool_size: defaults::WORKER_POOL_SIZE,
            thread_name: defaults::THREAD_NAME.to_string(),
            event_bus_capacity: defaults::EVENT_BUS_CAPACITY,
            max_start_time_ms: defaults::MAX_START_TIME_MS,
        }
    }
}

impl RuntimeOptions {
    pub fn max_start_time(&self) -> Duration {
        Duration::from_millis(self.max_start_time_ms)
    }
}

/// Cluster membership settings
///
/// `clustered = true` demands that the coordination provider supplies a
/// manager. A provider that supplies one anyway clusters the runtime even when
/// this flag is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    pub clustered: bool,
    /// Bind host; detected from the network interfaces when unset
    pub host: Option<String>,
    pub port: u16,
    /// Host advertised to other members, if different from `host`
    pub public_host: Option<String>,
    pub public_port: Option<u16>,
    pub ha_enabled: bool,
    pub ha_group: String,
    /// Minimum members before HA deployments are accepted
    pub quorum_size: usize,
    pub join_timeout_ms: u64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            clustered: false,
            host: None,
            port: defaults::CLUSTER_PORT,
            public_host: None,
            public_port: None,
            ha_enabled: false,
            ha_group: "__DEFAULT__".to_string(),
            quorum_size: defaults::QUORUM_SIZE,
            join_timeout_ms: defaults::CLUSTER_JOIN_TIMEOUT_MS,
        }
    }
}

impl ClusterOptions {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Host other members should use to reach this node
    pub fn advertised_host(&self) -> String {
        self.public_host
            .clone()
            .or_else(|| self.host.clone())
            .unwrap_or_else(default_cluster_host)
    }

    pub fn advertised_port(&self) -> u16 {
        self.public_port.unwrap_or(self.port)
    }
}

/// Deployment table limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentOptions {
    /// Deploy requests beyond this many live deployments are rejected
    pub max_deployments: usize,
    /// Budget for stopping all workers on shutdown
    pub stop_timeout_ms: u64,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            max_deployments: defaults::MAX_DEPLOYMENTS,
            stop_timeout_ms: defaults::STOP_TIMEOUT_MS,
        }
    }
}

impl DeploymentOptions {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl BridgeConfig {
    /// Reject values the runtime cannot be built with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.runtime.event_loop_pool_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "runtime.event_loop_pool_size",
                "0",
                "event loop pool size must be greater than 0",
            ));
        }

        if self.runtime.worker_pool_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "runtime.worker_pool_size",
                "0",
                "worker pool size must be greater than 0",
            ));
        }

        if self.runtime.thread_name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "runtime.thread_name",
                "runtime configuration",
            ));
        }

        if self.runtime.event_bus_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "runtime.event_bus_capacity",
                "0",
                "event bus capacity must be greater than 0",
            ));
        }

        if self.cluster.quorum_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "cluster.quorum_size",
                "0",
                "quorum size must be at least 1",
            ));
        }

        if self.cluster.join_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "cluster.join_timeout_ms",
                "0",
                "join timeout must be greater than 0",
            ));
        }

        if let Some(host) = &self.cluster.host {
            if host.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "cluster.host",
                    host,
                    "host must not be blank",
                ));
            }
        }

        if self.deployment.max_deployments == 0 {
            return Err(ConfigurationError::invalid_value(
                "deployment.max_deployments",
                "0",
                "max deployments must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// First non-loopback, non-multicast IPv4 address across all interfaces, or `0.0.0.0`
pub fn default_cluster_host() -> String {
    let detected = match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => first_cluster_address(interfaces.iter().map(|iface| iface.ip())),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to enumerate network interfaces");
            None
        }
    };

    match detected {
        Some(ip) => ip.to_string(),
        None => {
            tracing::warn!(
                "Unable to determine network interfaces. Using \"{}\" as host address.",
                files::ANY_ADDRESS
            );
            files::ANY_ADDRESS.to_string()
        }
    }
}

fn first_cluster_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_multicast() && !ip.is_unspecified() => {
            Some(ip)
        }
        _ => None,
    })
}
