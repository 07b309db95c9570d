//! # Bridge Constants
//!
//! Environment variable names, configuration defaults and well-known event bus
//! addresses shared by the launcher, the runtime and the configuration loader.

/// Environment variables read during bootstrap
pub mod env {
    /// Deployment environment (`development`, `test`, `production`)
    pub const BRIDGE_ENV: &str = "BRIDGE_ENV";
    /// Fallback environment variable consulted when `BRIDGE_ENV` is unset
    pub const APP_ENV: &str = "APP_ENV";
    /// Directory holding `config.json`
    pub const BRIDGE_CONFIG_DIR: &str = "BRIDGE_CONFIG_DIR";
    /// `json` switches the console log layer to JSON output
    pub const BRIDGE_LOG_FORMAT: &str = "BRIDGE_LOG_FORMAT";
    /// Prefix for configuration overrides, e.g. `BRIDGE__CLUSTER__PORT=15701`
    pub const CONFIG_PREFIX: &str = "BRIDGE";
    /// Separator between nested configuration keys in override variables
    pub const CONFIG_SEPARATOR: &str = "__";
}

/// Configuration file layout
pub mod files {
    /// Base configuration file inside the configuration directory
    pub const BASE_CONFIG_FILE: &str = "config.json";
    /// Default configuration directory
    pub const DEFAULT_CONFIG_DIR: &str = "config";
    /// Fallback bind address when no usable network interface is found
    pub const ANY_ADDRESS: &str = "0.0.0.0";

    /// External override file for a named project, looked up in the working directory
    pub fn project_config_file(project_name: &str) -> String {
        format!("config.{project_name}.json")
    }
}

/// Runtime defaults
pub mod defaults {
    pub const EVENT_LOOP_POOL_SIZE: usize = 4;
    pub const WORKER_POOL_SIZE: usize = 20;
    pub const THREAD_NAME: &str = "bridge-runtime";
    pub const EVENT_BUS_CAPACITY: usize = 1024;
    pub const MAX_START_TIME_MS: u64 = 2_000;
    pub const CLUSTER_PORT: u16 = 0;
    pub const QUORUM_SIZE: usize = 1;
    pub const CLUSTER_JOIN_TIMEOUT_MS: u64 = 120_000;
    pub const MAX_DEPLOYMENTS: usize = 1024;
    pub const STOP_TIMEOUT_MS: u64 = 30_000;
}

/// Event bus addresses the runtime publishes to
pub mod addresses {
    /// Published once per accepted deployment with `{ "deployment_id", "identity" }`
    pub const DEPLOYMENT_ACCEPTED: &str = "bridge.deployment.accepted";
    /// Published when a deployment is stopped
    pub const DEPLOYMENT_STOPPED: &str = "bridge.deployment.stopped";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_config_file_name() {
        assert_eq!(files::project_config_file("orders"), "config.orders.json");
    }
}
