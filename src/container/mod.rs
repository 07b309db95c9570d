//! # Container
//!
//! A minimal component container with one initialization cycle.
//!
//! `refresh` builds the [`RuntimeHandle`] first (asking the coordination
//! provider exactly once), then constructs every registered component in
//! registration order, then fires the one-shot [`ReadinessSignal`]. Workers are
//! wrapped in a [`LifecycleBridge`] at registration, so firing the signal is
//! what deploys them.
//!
//! ```text
//! refresh ─→ RuntimeHandle::new ─→ construct components ─→ fire readiness ─→ bridges deploy
//!   ContainerBuilding ───────────────────────────────────→ ReadyEventFired → Deploying → Running
//! ```

mod component;
mod readiness;
mod state;

pub use component::{BridgeContext, Component};
pub use readiness::{ReadinessSignal, ReadyEvent, ReadyListener};
pub use state::{LaunchState, LaunchStateManager};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::LifecycleBridge;
use crate::config::ConfigManager;
use crate::coordination::CoordinationManagerProvider;
use crate::error::{BridgeError, Result};
use crate::logging::log_error;
use crate::runtime::{Deployable, RuntimeHandle, WorkerIdentity};

type ComponentFactory = Box<dyn FnOnce(&BridgeContext) -> Result<Box<dyn ReadyListener>> + Send>;

struct Registration {
    label: String,
    worker_identity: Option<WorkerIdentity>,
    factory: ComponentFactory,
}

/// Registered components awaiting a single `refresh`
pub struct Container {
    registrations: Vec<Registration>,
    state: LaunchStateManager,
    refreshed: bool,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<_> = self.registrations.iter().map(|r| r.label.as_str()).collect();
        f.debug_struct("Container")
            .field("registrations", &labels)
            .field("state", &self.state.current_state())
            .field("refreshed", &self.refreshed)
            .finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            state: LaunchStateManager::new(),
            refreshed: false,
        }
    }

    /// Register a worker type; on readiness it is constructed and deployed
    ///
    /// Registering the same worker type twice is allowed and deploys it twice.
    pub fn register_worker<W>(&mut self) -> &mut Self
    where
        W: Deployable + Component,
    {
        let identity = WorkerIdentity::of::<W>();
        if self
            .registrations
            .iter()
            .any(|r| r.worker_identity.as_ref() == Some(&identity))
        {
            warn!(
                identity = %identity,
                "⚠️ CONTAINER: Worker type registered more than once, each registration deploys"
            );
        }

        self.registrations.push(Registration {
            label: identity.short_name().to_string(),
            worker_identity: Some(identity),
            factory: Box::new(|ctx: &BridgeContext| {
                let worker = W::construct(ctx)?;
                let bridge = LifecycleBridge::new(Arc::clone(ctx.runtime()), worker);
                Ok(Box::new(bridge) as Box<dyn ReadyListener>)
            }),
        });
        self
    }

    /// Register a non-worker component that wants the readiness callback
    pub fn register_listener<L, F>(&mut self, factory: F) -> &mut Self
    where
        L: ReadyListener + 'static,
        F: FnOnce(&BridgeContext) -> Result<L> + Send + 'static,
    {
        self.registrations.push(Registration {
            label: WorkerIdentity::of::<L>().short_name().to_string(),
            worker_identity: None,
            factory: Box::new(move |ctx: &BridgeContext| {
                Ok(Box::new(factory(ctx)?) as Box<dyn ReadyListener>)
            }),
        });
        self
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Number of worker registrations (each one deploys once)
    pub fn worker_count(&self) -> usize {
        self.registrations
            .iter()
            .filter(|r| r.worker_identity.is_some())
            .count()
    }

    /// Shared view of this container's launch state
    pub fn state(&self) -> LaunchStateManager {
        self.state.clone()
    }

    /// Run the single initialization cycle
    ///
    /// Returns the context every component was built with. A second call is
    /// rejected without touching the runtime.
    pub fn refresh(
        &mut self,
        config_manager: Arc<ConfigManager>,
        provider: &dyn CoordinationManagerProvider,
    ) -> Result<BridgeContext> {
        if self.refreshed {
            return Err(BridgeError::InvalidState(
                "container has already been refreshed".to_string(),
            ));
        }
        self.refreshed = true;

        self.state.transition_to(LaunchState::ContainerBuilding)?;
        info!(
            registrations = self.registrations.len(),
            "🏗️ CONTAINER: Building runtime and components"
        );

        let (ctx, signal) = match self.build(config_manager, provider) {
            Ok(built) => built,
            Err(error) => {
                self.state.fail(&error);
                return Err(error);
            }
        };

        let component_count = signal.listener_count();
        self.state.transition_to(LaunchState::ReadyEventFired)?;
        self.state.transition_to(LaunchState::Deploying)?;

        if let Err(error) = signal.fire(component_count) {
            log_error("container", "readiness", &error.to_string(), Some(error.stage()));
            self.state.fail(&error);
            abandon_runtime(&ctx);
            return Err(error);
        }

        self.state.transition_to(LaunchState::Running)?;
        info!(
            deployments = ctx.runtime().deployments().len(),
            clustered = ctx.is_clustered(),
            "✅ CONTAINER: Refresh complete"
        );
        Ok(ctx)
    }

    fn build(
        &mut self,
        config_manager: Arc<ConfigManager>,
        provider: &dyn CoordinationManagerProvider,
    ) -> Result<(BridgeContext, ReadinessSignal)> {
        let runtime = Arc::new(RuntimeHandle::new(config_manager.config(), provider)?);
        let ctx = BridgeContext::new(config_manager, runtime);

        let mut signal = ReadinessSignal::new();
        for registration in std::mem::take(&mut self.registrations) {
            debug!(component = %registration.label, "Constructing component");
            match (registration.factory)(&ctx) {
                Ok(listener) => signal.subscribe(registration.label, listener),
                Err(error) => {
                    let error = match error {
                        BridgeError::Configuration(_) => error,
                        other => BridgeError::Configuration(format!(
                            "failed to construct {}: {other}",
                            registration.label
                        )),
                    };
                    log_error("container", "construct", &error.to_string(), Some(&registration.label));
                    abandon_runtime(&ctx);
                    return Err(error);
                }
            }
        }

        Ok((ctx, signal))
    }
}

/// Tear down a runtime whose launch failed, leaving the cluster if joined
fn abandon_runtime(ctx: &BridgeContext) {
    let stop_timeout = ctx.config().deployment.stop_timeout();
    if let Err(error) = ctx.runtime().shutdown(stop_timeout) {
        warn!(error = %error, "Failed to shut down runtime after aborted launch");
    }
}
