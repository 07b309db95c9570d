//! # Runtime
//!
//! [`RuntimeHandle`] owns the execution engine that deployed workers run on: a
//! multi-thread tokio runtime plus the event bus, shared data and deployment
//! table built around it.
//!
//! Construction is the only place a coordination manager enters the system.
//! The provider is asked once; a supplied manager is joined before `new`
//! returns, so a handle that exists is always fully connected.
//!
//! `deploy` is fire-and-continue. The deploy request is recorded and the
//! worker's `start` is spawned onto the worker pool; a returned
//! [`DeploymentId`] means "accepted", not "started".

mod context_runner;
mod deployable;
mod deployment;
mod event_bus;
mod shared_data;

pub use context_runner::{ContextRunner, ContextRunnerError};
pub use deployable::{Deployable, StopSignal, WorkerContext, WorkerIdentity};
pub use deployment::{DeploymentId, DeploymentRecord, DeploymentStatus};
pub use event_bus::{Envelope, EventBus, EventBusError, MessageConsumer};
pub use shared_data::{Counter, LocalMap, SharedData};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::constants::{addresses, files};
use crate::coordination::{
    ClusterNode, CoordinationError, CoordinationManagerProvider, NodeId, SharedCoordinationManager,
};
use crate::error::{BridgeError, Result};
use crate::logging::{log_deployment_operation, log_error};

struct DeploymentEntry {
    record: DeploymentRecord,
    status: Arc<RwLock<DeploymentStatus>>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeploymentEntry {
    fn snapshot(&self) -> DeploymentRecord {
        DeploymentRecord {
            status: self.status.read().clone(),
            ..self.record.clone()
        }
    }
}

/// The single runtime instance of a launch
pub struct RuntimeHandle {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    config: BridgeConfig,
    node: ClusterNode,
    coordination: Option<SharedCoordinationManager>,
    deployments: DashMap<DeploymentId, DeploymentEntry>,
    // Serializes the admission checks in `deploy`
    admission: Mutex<()>,
    sequence: AtomicU64,
    closed: Arc<AtomicBool>,
    event_bus: EventBus,
    shared_data: SharedData,
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("node", &self.node)
            .field("clustered", &self.is_clustered())
            .field("deployments", &self.deployments.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl RuntimeHandle {
    /// Build the runtime, acquire the coordination manager and join the cluster
    ///
    /// Must be called from a thread that is not driving an async runtime.
    pub fn new(config: &BridgeConfig, provider: &dyn CoordinationManagerProvider) -> Result<Self> {
        if Handle::try_current().is_ok() {
            return Err(BridgeError::Runtime(
                "runtime must be constructed outside of an async context".to_string(),
            ));
        }

        info!(
            event_loop_pool_size = config.runtime.event_loop_pool_size,
            worker_pool_size = config.runtime.worker_pool_size,
            "🚀 RUNTIME: Building execution engine"
        );

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.runtime.event_loop_pool_size)
            .max_blocking_threads(config.runtime.worker_pool_size)
            .thread_name(config.runtime.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Runtime(format!("failed to build runtime: {e}")))?;

        let coordination = provider.coordination_manager()?;
        if config.cluster.clustered && coordination.is_none() {
            return Err(CoordinationError::ManagerRequired.into());
        }

        let host = if coordination.is_some() {
            config.cluster.advertised_host()
        } else {
            config
                .cluster
                .host
                .clone()
                .unwrap_or_else(|| files::ANY_ADDRESS.to_string())
        };
        let node = ClusterNode {
            node_id: NodeId::new(),
            host,
            port: config.cluster.advertised_port(),
            ha_group: config.cluster.ha_group.clone(),
        };

        if let Some(manager) = &coordination {
            let join_timeout = config.cluster.join_timeout();
            info!(
                backend = %manager.backend(),
                node = %node.address(),
                timeout_ms = config.cluster.join_timeout_ms,
                "🌐 RUNTIME: Joining cluster"
            );

            let joined = runtime
                .block_on(async { tokio::time::timeout(join_timeout, manager.join(&node)).await });
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => return Err(error.into()),
                Err(_) => {
                    return Err(CoordinationError::JoinTimeout {
                        backend: manager.backend().to_string(),
                        timeout_ms: config.cluster.join_timeout_ms,
                    }
                    .into())
                }
            }
        } else {
            debug!("No coordination manager supplied, running standalone");
        }

        let handle = runtime.handle().clone();
        info!(
            node_id = %node.node_id,
            clustered = coordination.is_some(),
            "✅ RUNTIME: Execution engine ready"
        );

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            config: config.clone(),
            node,
            coordination,
            deployments: DashMap::new(),
            admission: Mutex::new(()),
            sequence: AtomicU64::new(0),
            closed: Arc::new(AtomicBool::new(false)),
            event_bus: EventBus::new(config.runtime.event_bus_capacity),
            shared_data: SharedData::new(),
        })
    }

    /// True iff the provider supplied a coordination manager
    pub fn is_clustered(&self) -> bool {
        self.coordination.is_some()
    }

    pub fn coordination_manager(&self) -> Option<&SharedCoordinationManager> {
        self.coordination.as_ref()
    }

    pub fn node(&self) -> &ClusterNode {
        &self.node
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Tokio handle of the owned runtime
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn shared_data(&self) -> &SharedData {
        &self.shared_data
    }

    pub fn context_runner(&self) -> ContextRunner {
        ContextRunner::new(self.handle.clone(), Arc::clone(&self.closed))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Cluster membership; standalone runtimes report only themselves
    pub fn members(&self) -> Result<Vec<ClusterNode>> {
        match &self.coordination {
            Some(manager) => {
                if self.is_closed() {
                    return Err(BridgeError::InvalidState(
                        "cannot query cluster members after runtime shutdown".to_string(),
                    ));
                }
                Ok(self.block_on(manager.members())??)
            }
            None => Ok(vec![self.node.clone()]),
        }
    }

    /// Accept a worker for execution and spawn its `start` on the worker pool
    pub fn deploy<W: Deployable>(&self, worker: W) -> Result<DeploymentId> {
        let identity = worker.identity();
        let _admission = self.admission.lock();

        if self.is_closed() {
            return Err(BridgeError::deployment(
                identity.as_str(),
                "runtime is shut down",
            ));
        }

        let active = self
            .deployments
            .iter()
            .filter(|entry| entry.status.read().is_active())
            .count();
        if active >= self.config.deployment.max_deployments {
            return Err(BridgeError::deployment(
                identity.as_str(),
                format!(
                    "deployment capacity exhausted ({} active)",
                    self.config.deployment.max_deployments
                ),
            ));
        }

        if self.config.cluster.ha_enabled {
            self.check_quorum(&identity)?;
        }

        let id = DeploymentId::new();
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let status = Arc::new(RwLock::new(DeploymentStatus::Accepted));
        let (stop_tx, stop_rx) = watch::channel(false);

        let ctx = WorkerContext::new(
            id.clone(),
            identity.clone(),
            self.node.node_id.clone(),
            self.is_clustered(),
            self.event_bus.clone(),
            self.shared_data.clone(),
            StopSignal::new(stop_rx),
        );

        let record = DeploymentRecord {
            id: id.clone(),
            identity: identity.clone(),
            sequence,
            status: DeploymentStatus::Accepted,
            deployed_at: Utc::now(),
        };

        let task = self.handle.spawn(run_deployment(
            worker,
            ctx,
            status.clone(),
            self.config.runtime.max_start_time(),
        ));

        self.deployments.insert(
            id.clone(),
            DeploymentEntry {
                record,
                status,
                stop_tx,
                task: Mutex::new(Some(task)),
            },
        );

        log_deployment_operation(
            "deploy",
            identity.as_str(),
            Some(&id.to_string()),
            "accepted",
            None,
        );
        self.event_bus.publish(
            addresses::DEPLOYMENT_ACCEPTED,
            json!({
                "deployment_id": id.to_string(),
                "identity": identity.as_str(),
                "sequence": sequence,
            }),
        );

        Ok(id)
    }

    /// Stop one deployment and wait for its worker to finish stopping
    pub fn undeploy(&self, id: &DeploymentId) -> Result<DeploymentRecord> {
        if self.is_closed() {
            return Err(BridgeError::InvalidState(
                "cannot undeploy after runtime shutdown".to_string(),
            ));
        }

        Self::ensure_blocking_allowed()?;

        let (identity, status, task) = {
            let entry = self.deployments.get(id).ok_or_else(|| {
                BridgeError::deployment(id.to_string(), "unknown deployment")
            })?;
            // Receiver may already be gone if the worker failed to start
            let _ = entry.stop_tx.send(true);
            let task = entry.task.lock().take();
            (entry.record.identity.clone(), entry.status.clone(), task)
        };

        if let Some(task) = task {
            let stop_timeout = self.config.deployment.stop_timeout();
            let abort = task.abort_handle();
            let outcome =
                self.block_on(async { tokio::time::timeout(stop_timeout, task).await })?;
            settle_task_outcome(&status, outcome.ok(), &identity);
            if !abort.is_finished() {
                abort.abort();
            }
        }

        log_deployment_operation(
            "undeploy",
            identity.as_str(),
            Some(&id.to_string()),
            &status.read().to_string(),
            None,
        );
        self.event_bus.publish(
            addresses::DEPLOYMENT_STOPPED,
            json!({ "deployment_id": id.to_string(), "identity": identity.as_str() }),
        );

        self.deployment(id)
            .ok_or_else(|| BridgeError::deployment(id.to_string(), "unknown deployment"))
    }

    /// Snapshot of every deployment in acceptance order
    pub fn deployments(&self) -> Vec<DeploymentRecord> {
        let mut records: Vec<_> = self
            .deployments
            .iter()
            .map(|entry| entry.snapshot())
            .collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    pub fn deployment(&self, id: &DeploymentId) -> Option<DeploymentRecord> {
        self.deployments.get(id).map(|entry| entry.snapshot())
    }

    /// Stop every worker, leave the cluster and shut the runtime down
    ///
    /// Idempotent; later calls return immediately. Refused with
    /// `InvalidState` on a current-thread runtime, leaving the runtime open.
    pub fn shutdown(&self, timeout: Duration) -> Result<()> {
        Self::ensure_blocking_allowed()?;

        // Deploys admitted before this point are in the sweep; later ones see `closed`
        let pending = {
            let _admission = self.admission.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                debug!("Runtime already shut down");
                return Ok(());
            }

            info!(
                deployments = self.deployments.len(),
                timeout_ms = timeout.as_millis() as u64,
                "🛑 RUNTIME: Shutting down"
            );

            let mut pending = Vec::new();
            for entry in self.deployments.iter() {
                let _ = entry.stop_tx.send(true);
                if let Some(task) = entry.task.lock().take() {
                    pending.push((entry.record.identity.clone(), entry.status.clone(), task));
                }
            }
            pending
        };

        let aborts: Vec<_> = pending.iter().map(|(_, _, task)| task.abort_handle()).collect();
        let stop_all = futures::future::join_all(pending.into_iter().map(
            |(identity, status, task)| async move {
                let outcome = task.await;
                settle_task_outcome(&status, Some(outcome), &identity);
            },
        ));
        let stopped = self.block_on(async { tokio::time::timeout(timeout, stop_all).await })?;
        if stopped.is_err() {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Workers did not stop in time, aborting remaining deployments"
            );
            for abort in &aborts {
                abort.abort();
            }
            for entry in self.deployments.iter() {
                let mut status = entry.status.write();
                if status.is_active() {
                    *status = DeploymentStatus::Failed("stop timed out".to_string());
                }
            }
        }

        if let Some(manager) = &self.coordination {
            let node_id = &self.node.node_id;
            let left = self
                .block_on(async { tokio::time::timeout(timeout, manager.leave(node_id)).await })?;
            match left {
                Ok(Ok(())) => debug!(backend = %manager.backend(), "Left cluster"),
                Ok(Err(error)) => log_error(
                    "runtime",
                    "leave_cluster",
                    &error.to_string(),
                    Some(manager.backend()),
                ),
                Err(_) => log_error(
                    "runtime",
                    "leave_cluster",
                    "timed out leaving cluster",
                    Some(manager.backend()),
                ),
            }
        }

        if let Some(runtime) = self.runtime.lock().take() {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(timeout);
            }
        }

        info!("✅ RUNTIME: Shutdown complete");
        Ok(())
    }

    fn check_quorum(&self, identity: &WorkerIdentity) -> Result<()> {
        let members = self
            .members()?
            .into_iter()
            .filter(|member| member.ha_group == self.node.ha_group)
            .count();
        let quorum = self.config.cluster.quorum_size;

        if members < quorum {
            return Err(BridgeError::deployment(
                identity.as_str(),
                format!(
                    "HA quorum not met in group {}: {members} of {quorum} members",
                    self.node.ha_group
                ),
            ));
        }
        Ok(())
    }

    /// Blocking is impossible on a current-thread runtime's only thread
    fn ensure_blocking_allowed() -> Result<()> {
        match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                Err(BridgeError::InvalidState(
                    "blocking runtime operations cannot run on a current-thread runtime"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Drive a future on the owned runtime from a plain thread or a multi-thread runtime
    fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        Self::ensure_blocking_allowed()?;
        match Handle::try_current() {
            Ok(_) => Ok(tokio::task::block_in_place(|| self.handle.block_on(future))),
            Err(_) => Ok(self.handle.block_on(future)),
        }
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.get_mut().take() else {
            return;
        };

        if let Some(manager) = &self.coordination {
            let node_id = &self.node.node_id;
            warn!(
                node_id = %node_id,
                backend = %manager.backend(),
                "Runtime dropped without shutdown, leaving cluster"
            );

            if Handle::try_current().is_ok() {
                warn!(
                    node_id = %node_id,
                    "Dropped inside an async context, cluster membership may be stale"
                );
            } else {
                let leave_timeout = self.config.deployment.stop_timeout();
                let left = runtime.block_on(async {
                    tokio::time::timeout(leave_timeout, manager.leave(node_id)).await
                });
                if !matches!(left, Ok(Ok(()))) {
                    warn!(node_id = %node_id, "Best-effort cluster leave failed");
                }
            }
        }

        runtime.shutdown_background();
    }
}

async fn run_deployment<W: Deployable>(
    mut worker: W,
    ctx: WorkerContext,
    status: Arc<RwLock<DeploymentStatus>>,
    max_start_time: Duration,
) {
    let identity = ctx.identity().clone();
    let deployment_id = ctx.deployment_id().to_string();
    let stop_signal = ctx.stop_signal();

    let started_at = Instant::now();
    let start_result = AssertUnwindSafe(worker.start(ctx)).catch_unwind().await;
    let elapsed = started_at.elapsed();

    if elapsed > max_start_time {
        warn!(
            identity = %identity,
            elapsed_ms = elapsed.as_millis() as u64,
            max_start_time_ms = max_start_time.as_millis() as u64,
            "⚠️ DEPLOYMENT: Worker start blocked longer than allowed"
        );
    }

    match start_result {
        Ok(Ok(())) => {
            *status.write() = DeploymentStatus::Running;
            log_deployment_operation(
                "start",
                identity.as_str(),
                Some(&deployment_id),
                "running",
                None,
            );
        }
        Ok(Err(error)) => {
            *status.write() = DeploymentStatus::Failed(error.to_string());
            log_error("deployment", "start", &error.to_string(), Some(identity.as_str()));
            return;
        }
        Err(_) => {
            *status.write() = DeploymentStatus::Failed("start panicked".to_string());
            log_error("deployment", "start", "start panicked", Some(identity.as_str()));
            return;
        }
    }

    stop_signal.wait().await;
    *status.write() = DeploymentStatus::Stopping;

    let stopped = match worker.stop().await {
        Ok(()) => DeploymentStatus::Stopped,
        Err(error) => {
            log_error("deployment", "stop", &error.to_string(), Some(identity.as_str()));
            DeploymentStatus::Failed(format!("stop failed: {error}"))
        }
    };
    *status.write() = stopped;
}

/// Record how a deployment task ended; `None` means it did not finish in time
fn settle_task_outcome(
    status: &RwLock<DeploymentStatus>,
    outcome: Option<std::result::Result<(), tokio::task::JoinError>>,
    identity: &WorkerIdentity,
) {
    let mut status = status.write();
    match outcome {
        Some(Ok(())) => {}
        Some(Err(join_error)) => {
            *status = DeploymentStatus::Failed(format!("worker task ended abnormally: {join_error}"));
        }
        None => {
            warn!(identity = %identity, "Worker did not stop in time");
            if status.is_active() {
                *status = DeploymentStatus::Failed("stop timed out".to_string());
            }
        }
    }
}
