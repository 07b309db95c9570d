use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lifecycle_bridge::container::{BridgeContext, Component, ReadyEvent, ReadyListener};
use lifecycle_bridge::runtime::{Deployable, SharedData, WorkerContext};
use lifecycle_bridge::{BridgeError, Result};
use serde_json::json;

pub const PING_ADDRESS: &str = "test.ping";

pub fn starts_key(slot: usize) -> String {
    format!("starts:{slot}")
}

pub fn stops_key(slot: usize) -> String {
    format!("stops:{slot}")
}

/// Records construction, start and stop in the runtime's shared data
///
/// The const parameter gives every slot its own type, and so its own identity.
pub struct RecordingWorker<const SLOT: usize>;

impl<const SLOT: usize> Component for RecordingWorker<SLOT> {
    fn construct(ctx: &BridgeContext) -> Result<Self> {
        let shared = ctx.runtime().shared_data();
        shared.counter("constructed").increment_and_get();
        // Nothing may be deployed while components are still being built
        shared
            .counter("deployments_seen_during_construct")
            .add_and_get(ctx.runtime().deployments().len() as i64);
        Ok(Self)
    }
}

#[async_trait]
impl<const SLOT: usize> Deployable for RecordingWorker<SLOT> {
    async fn start(&mut self, ctx: WorkerContext) -> anyhow::Result<()> {
        ctx.shared_data().counter(&starts_key(SLOT)).increment_and_get();
        ctx.shared_data()
            .local_map("started_identities")
            .insert(ctx.identity().to_string(), json!(ctx.deployment_id().to_string()));
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type WorkerA = RecordingWorker<0>;
pub type WorkerB = RecordingWorker<1>;

pub fn starts(shared: &SharedData, slot: usize) -> i64 {
    shared.counter(&starts_key(slot)).get()
}

/// Answers requests on [`PING_ADDRESS`] until stopped
pub struct PingWorker {
    stops: Option<lifecycle_bridge::runtime::Counter>,
}

impl Component for PingWorker {
    fn construct(ctx: &BridgeContext) -> Result<Self> {
        Ok(Self {
            stops: Some(ctx.runtime().shared_data().counter(&stops_key(99))),
        })
    }
}

#[async_trait]
impl Deployable for PingWorker {
    async fn start(&mut self, ctx: WorkerContext) -> anyhow::Result<()> {
        let mut consumer = ctx.event_bus().consumer(PING_ADDRESS);
        let stop = ctx.stop_signal();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = consumer.recv() => match message {
                        Some(mut message) => {
                            let body = message.body.clone();
                            message.reply(json!({ "pong": body }));
                        }
                        None => break,
                    },
                    _ = stop.clone().wait() => break,
                }
            }
        });
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(stops) = &self.stops {
            stops.increment_and_get();
        }
        Ok(())
    }
}

pub static UNBUILDABLE_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

/// Construction always fails
pub struct UnbuildableWorker;

impl Component for UnbuildableWorker {
    fn construct(_ctx: &BridgeContext) -> Result<Self> {
        UNBUILDABLE_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Err(BridgeError::Configuration(
            "required credential missing".to_string(),
        ))
    }
}

#[async_trait]
impl Deployable for UnbuildableWorker {
    async fn start(&mut self, _ctx: WorkerContext) -> anyhow::Result<()> {
        anyhow::bail!("never constructed, never started")
    }
}

pub static PROVIDER_FAILURE_CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

/// Only used by the provider failure scenario; counts constructions globally
pub struct ProviderFailureWorker;

impl Component for ProviderFailureWorker {
    fn construct(_ctx: &BridgeContext) -> Result<Self> {
        PROVIDER_FAILURE_CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Ok(Self)
    }
}

#[async_trait]
impl Deployable for ProviderFailureWorker {
    async fn start(&mut self, _ctx: WorkerContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Non-worker component recording what it saw when readiness fired
pub struct ReadinessWitness {
    shared: SharedData,
}

impl ReadinessWitness {
    pub fn build(ctx: &BridgeContext) -> Result<Self> {
        Ok(Self {
            shared: ctx.runtime().shared_data().clone(),
        })
    }
}

impl ReadyListener for ReadinessWitness {
    fn on_container_ready(&mut self, event: &ReadyEvent) -> Result<()> {
        self.shared.counter("ready_events").increment_and_get();
        self.shared
            .counter("ready_component_count")
            .add_and_get(event.component_count as i64);
        Ok(())
    }
}
