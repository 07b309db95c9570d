//! # Bridge Launch
//!
//! Deploys a heartbeat worker and runs until ctrl-c.
//!
//! Configuration comes from `config/config.json`, an optional
//! `config.<project_name>.json` in the working directory, and `BRIDGE__*`
//! environment variables (e.g. `BRIDGE__RUNTIME__EVENT_LOOP_POOL_SIZE=8`).

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lifecycle_bridge::coordination::StandaloneProvider;
use lifecycle_bridge::launcher::launch_or_exit;
use lifecycle_bridge::prelude::*;
use serde_json::json;
use tracing::info;

const HEARTBEAT_ADDRESS: &str = "bridge.heartbeat";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Publishes a beat on the event bus at a fixed interval
struct HeartbeatWorker {
    interval: Duration,
}

impl Component for HeartbeatWorker {
    fn construct(_ctx: &BridgeContext) -> lifecycle_bridge::Result<Self> {
        Ok(Self {
            interval: HEARTBEAT_INTERVAL,
        })
    }
}

#[async_trait]
impl Deployable for HeartbeatWorker {
    async fn start(&mut self, ctx: WorkerContext) -> anyhow::Result<()> {
        let beats = ctx.shared_data().counter("heartbeats");
        let stop = ctx.stop_signal();
        let interval = self.interval;

        info!(
            deployment_id = %ctx.deployment_id(),
            node_id = %ctx.node_id(),
            clustered = ctx.is_clustered(),
            "💓 Heartbeat worker started"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let beat = beats.increment_and_get();
                        let receivers = ctx.event_bus().publish(HEARTBEAT_ADDRESS, json!({ "beat": beat }));
                        info!(beat = beat, receivers = receivers, "💓 Heartbeat");
                    }
                    _ = stop.clone().wait() => break,
                }
            }
        });

        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        info!("Heartbeat worker stopped");
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let handle = launch_or_exit::<HeartbeatWorker>(StandaloneProvider);

    handle
        .wait_for_shutdown_signal()
        .context("waiting for shutdown signal")?;

    let stop_timeout = handle.context().config().deployment.stop_timeout();
    handle
        .shutdown(stop_timeout)
        .context("shutting down runtime")?;

    Ok(())
}
