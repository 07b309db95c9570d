//! # Deployable Workers
//!
//! A worker is any type implementing [`Deployable`]. The runtime calls
//! [`Deployable::start`] on its own executor once the deploy request is
//! accepted and [`Deployable::stop`] when the deployment is undeployed or the
//! runtime shuts down.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::deployment::DeploymentId;
use super::event_bus::EventBus;
use super::shared_data::SharedData;
use crate::coordination::NodeId;

/// Type tag naming a concrete deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerIdentity(Cow<'static, str>);

impl WorkerIdentity {
    /// Identity derived from the Rust type name
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Type name without its module path, e.g. `OrderWorker` for `app::workers::OrderWorker`
    pub fn short_name(&self) -> &str {
        let name = self.as_str();
        let path_end = name.find('<').unwrap_or(name.len());
        match name[..path_end].rfind("::") {
            Some(index) => &name[index + 2..],
            None => name,
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability of a unit that can be deployed onto the runtime
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use lifecycle_bridge::runtime::{Deployable, WorkerContext};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Deployable for Greeter {
///     async fn start(&mut self, ctx: WorkerContext) -> anyhow::Result<()> {
///         let mut consumer = ctx.event_bus().consumer("greetings");
///         tokio::spawn(async move {
///             while let Some(mut message) = consumer.recv().await {
///                 let greeting = serde_json::json!({ "hello": message.body.clone() });
///                 message.reply(greeting);
///             }
///         });
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Deployable: Send + 'static {
    fn identity(&self) -> WorkerIdentity
    where
        Self: Sized,
    {
        WorkerIdentity::of::<Self>()
    }

    /// Called once on the runtime after the deploy request is accepted
    async fn start(&mut self, ctx: WorkerContext) -> anyhow::Result<()>;

    /// Called once when the deployment is stopped
    async fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Resolves when the deployment is asked to stop
#[derive(Debug, Clone)]
pub struct StopSignal {
    receiver: watch::Receiver<bool>,
}

impl StopSignal {
    pub(crate) fn new(receiver: watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    pub fn is_stopping(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until stop is requested or the runtime drops the deployment
    pub async fn wait(mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Runtime facilities handed to a worker on start
#[derive(Debug, Clone)]
pub struct WorkerContext {
    deployment_id: DeploymentId,
    identity: WorkerIdentity,
    node_id: NodeId,
    clustered: bool,
    event_bus: EventBus,
    shared_data: SharedData,
    stop_signal: StopSignal,
}

impl WorkerContext {
    pub(crate) fn new(
        deployment_id: DeploymentId,
        identity: WorkerIdentity,
        node_id: NodeId,
        clustered: bool,
        event_bus: EventBus,
        shared_data: SharedData,
        stop_signal: StopSignal,
    ) -> Self {
        Self {
            deployment_id,
            identity,
            node_id,
            clustered,
            event_bus,
            shared_data,
            stop_signal,
        }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn shared_data(&self) -> &SharedData {
        &self.shared_data
    }

    /// Signal for background loops spawned from `start`
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }
}
