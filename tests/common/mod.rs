#![allow(dead_code)]

pub mod providers;
pub mod strategies;
pub mod workers;

pub use providers::*;
pub use strategies::*;
pub use workers::*;

use std::sync::Arc;
use std::time::{Duration, Instant};

use lifecycle_bridge::config::{BridgeConfig, ConfigManager};

/// Small runtime so many launches can run side by side in one test binary
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.runtime.event_loop_pool_size = 2;
    config.runtime.worker_pool_size = 2;
    config.cluster.join_timeout_ms = 2_000;
    config.deployment.stop_timeout_ms = 2_000;
    config
}

pub fn test_config_manager() -> Arc<ConfigManager> {
    config_manager_for(test_config())
}

pub fn config_manager_for(config: BridgeConfig) -> Arc<ConfigManager> {
    ConfigManager::from_config(config, "test").expect("test configuration is valid")
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
