//! Components and the context they are constructed from.

use std::sync::Arc;

use crate::config::{BridgeConfig, ConfigManager};
use crate::error::Result;
use crate::runtime::RuntimeHandle;

/// Everything a component may depend on during construction
///
/// Built once per launch, after the runtime exists and before any component
/// is constructed. Cloning shares the same runtime.
#[derive(Debug, Clone)]
pub struct BridgeContext {
    config_manager: Arc<ConfigManager>,
    runtime: Arc<RuntimeHandle>,
}

impl BridgeContext {
    pub fn new(config_manager: Arc<ConfigManager>, runtime: Arc<RuntimeHandle>) -> Self {
        Self {
            config_manager,
            runtime,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        self.config_manager.config()
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn runtime(&self) -> &Arc<RuntimeHandle> {
        &self.runtime
    }

    pub fn is_clustered(&self) -> bool {
        self.runtime.is_clustered()
    }
}

/// A type the container knows how to construct
///
/// Construction failures abort the launch before the readiness signal fires,
/// so no worker is ever deployed from a partially built container.
pub trait Component: Sized + Send + 'static {
    fn construct(ctx: &BridgeContext) -> Result<Self>;
}
