//! # Launcher
//!
//! Process entry point: register worker types, load configuration and drive
//! the container through its single initialization cycle.
//!
//! ```rust,no_run
//! use lifecycle_bridge::coordination::StandaloneProvider;
//! use lifecycle_bridge::launcher::launch_or_exit;
//! # use lifecycle_bridge::prelude::*;
//! # struct OrderWorker;
//! # impl Component for OrderWorker {
//! #     fn construct(_ctx: &BridgeContext) -> lifecycle_bridge::Result<Self> { Ok(OrderWorker) }
//! # }
//! # #[async_trait::async_trait]
//! # impl Deployable for OrderWorker {
//! #     async fn start(&mut self, _ctx: WorkerContext) -> anyhow::Result<()> { Ok(()) }
//! # }
//!
//! fn main() {
//!     let handle = launch_or_exit::<OrderWorker>(StandaloneProvider);
//!     handle.wait_for_shutdown_signal().ok();
//!     handle.shutdown(std::time::Duration::from_secs(30)).ok();
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{error, info};

use crate::config::ConfigManager;
use crate::container::{
    BridgeContext, Component, Container, LaunchState, LaunchStateManager, ReadyListener,
};
use crate::coordination::{CoordinationManagerProvider, StandaloneProvider};
use crate::error::{BridgeError, Result};
use crate::logging;
use crate::runtime::{Deployable, DeploymentId, DeploymentRecord, RuntimeHandle};

/// Builder for a launch with one or more worker types
pub struct Launcher {
    config_manager: Arc<ConfigManager>,
    provider: Box<dyn CoordinationManagerProvider>,
    container: Container,
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("config_manager", &self.config_manager)
            .field("container", &self.container)
            .finish()
    }
}

impl Launcher {
    /// Standalone launcher using the given configuration
    pub fn new(config_manager: Arc<ConfigManager>) -> Self {
        Self {
            config_manager,
            provider: Box::new(StandaloneProvider),
            container: Container::new(),
        }
    }

    /// Launcher using configuration loaded from files and environment
    pub fn from_environment() -> Result<Self> {
        Ok(Self::new(ConfigManager::load()?))
    }

    /// Supply the coordination manager provider the runtime is built with
    pub fn with_provider(mut self, provider: impl CoordinationManagerProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    /// Register a worker type to deploy once the container is ready
    pub fn register<W>(mut self) -> Self
    where
        W: Deployable + Component,
    {
        self.container.register_worker::<W>();
        self
    }

    /// Register a non-worker component that wants the readiness callback
    pub fn register_listener<L, F>(mut self, factory: F) -> Self
    where
        L: ReadyListener + 'static,
        F: FnOnce(&BridgeContext) -> Result<L> + Send + 'static,
    {
        self.container.register_listener(factory);
        self
    }

    /// Drive the container to readiness and deploy every registered worker
    ///
    /// Returns once every bridge has issued its deploy request. Must be called
    /// from a thread that is not driving an async runtime.
    pub fn launch(mut self) -> Result<LaunchHandle> {
        logging::init_structured_logging();

        info!(
            workers = self.container.worker_count(),
            components = self.container.registration_count(),
            environment = %self.config_manager.environment(),
            "🚀 LAUNCH: Starting"
        );

        let state = self.container.state();
        let context = self
            .container
            .refresh(Arc::clone(&self.config_manager), self.provider.as_ref())?;

        let handle = LaunchHandle { context, state };
        info!(
            deployments = handle.deployments().len(),
            clustered = handle.is_clustered(),
            "✅ LAUNCH: All workers deployed"
        );
        Ok(handle)
    }
}

/// Register `W`, load configuration from the environment and launch
pub fn launch<W>(provider: impl CoordinationManagerProvider + 'static) -> Result<LaunchHandle>
where
    W: Deployable + Component,
{
    Launcher::from_environment()?
        .with_provider(provider)
        .register::<W>()
        .launch()
}

/// [`launch`], exiting the process when any startup stage fails
pub fn launch_or_exit<W>(provider: impl CoordinationManagerProvider + 'static) -> LaunchHandle
where
    W: Deployable + Component,
{
    match launch::<W>(provider) {
        Ok(handle) => handle,
        Err(err) => {
            logging::init_structured_logging();
            error!(
                stage = err.stage(),
                exit_code = err.exit_code(),
                error = %err,
                "❌ LAUNCH: Startup failed"
            );
            std::process::exit(err.exit_code());
        }
    }
}

/// A completed launch
#[derive(Debug, Clone)]
pub struct LaunchHandle {
    context: BridgeContext,
    state: LaunchStateManager,
}

impl LaunchHandle {
    pub fn is_clustered(&self) -> bool {
        self.context.is_clustered()
    }

    pub fn state(&self) -> LaunchState {
        self.state.current_state()
    }

    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    pub fn runtime(&self) -> &Arc<RuntimeHandle> {
        self.context.runtime()
    }

    /// Every deployment in acceptance order
    pub fn deployments(&self) -> Vec<DeploymentRecord> {
        self.runtime().deployments()
    }

    pub fn undeploy(&self, id: &DeploymentId) -> Result<DeploymentRecord> {
        self.runtime().undeploy(id)
    }

    /// Stop every worker, leave the cluster and shut the runtime down
    pub fn shutdown(&self, timeout: Duration) -> Result<()> {
        info!(timeout_ms = timeout.as_millis() as u64, "🛑 LAUNCH: Shutting down");
        self.runtime().shutdown(timeout)?;

        if self.state.current_state() == LaunchState::Running {
            self.state.transition_to(LaunchState::Stopped)?;
        }
        Ok(())
    }

    /// Block until the process receives ctrl-c
    pub fn wait_for_shutdown_signal(&self) -> Result<()> {
        if Handle::try_current().is_ok() {
            return Err(BridgeError::InvalidState(
                "cannot block on shutdown signal from inside an async context".to_string(),
            ));
        }
        if self.runtime().is_closed() {
            return Ok(());
        }

        info!("Waiting for shutdown signal (ctrl-c)");
        self.runtime()
            .handle()
            .block_on(tokio::signal::ctrl_c())
            .map_err(|e| BridgeError::Runtime(format!("failed to listen for shutdown signal: {e}")))
    }
}
