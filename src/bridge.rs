//! # Lifecycle Bridge
//!
//! Connects container readiness to worker deployment. One bridge wraps one
//! worker; when the readiness signal fires the bridge hands the worker to the
//! runtime. The event payload is not inspected.
//!
//! Deployment happens on the first delivery only. The worker is moved into
//! the runtime at that point, so a repeated readiness delivery has nothing
//! left to deploy; it is logged and treated as a no-op rather than a second
//! deployment.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::container::{ReadyEvent, ReadyListener};
use crate::error::Result;
use crate::runtime::{Deployable, DeploymentId, RuntimeHandle, WorkerIdentity};

/// Deploys its worker when the container becomes ready
#[derive(Debug)]
pub struct LifecycleBridge<W: Deployable> {
    runtime: Arc<RuntimeHandle>,
    identity: WorkerIdentity,
    worker: Option<W>,
    deployment_id: Option<DeploymentId>,
}

impl<W: Deployable> LifecycleBridge<W> {
    pub fn new(runtime: Arc<RuntimeHandle>, worker: W) -> Self {
        Self {
            runtime,
            identity: worker.identity(),
            worker: Some(worker),
            deployment_id: None,
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Set once the worker has been handed to the runtime
    pub fn deployment_id(&self) -> Option<&DeploymentId> {
        self.deployment_id.as_ref()
    }
}

impl<W: Deployable> ReadyListener for LifecycleBridge<W> {
    fn on_container_ready(&mut self, _event: &ReadyEvent) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            warn!(
                identity = %self.identity,
                "Readiness delivered again after worker was deployed, ignoring"
            );
            return Ok(());
        };

        let deployment_id = self.runtime.deploy(worker)?;
        debug!(
            identity = %self.identity,
            deployment_id = %deployment_id,
            "Bridge handed worker to runtime"
        );
        self.deployment_id = Some(deployment_id);
        Ok(())
    }
}
