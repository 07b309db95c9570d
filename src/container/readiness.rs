//! One-shot readiness signal fired once every component is constructed.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::Result;

/// Payload delivered to every listener when the container is ready
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyEvent {
    pub fired_at: DateTime<Utc>,
    /// Components constructed before the signal fired
    pub component_count: usize,
}

/// Receives the container readiness callback
pub trait ReadyListener: Send {
    fn on_container_ready(&mut self, event: &ReadyEvent) -> Result<()>;
}

struct Subscription {
    label: String,
    listener: Box<dyn ReadyListener>,
}

/// Listeners waiting for the container to become ready
///
/// `fire` consumes the signal, so it can be delivered at most once.
#[derive(Default)]
pub struct ReadinessSignal {
    subscriptions: Vec<Subscription>,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, label: impl Into<String>, listener: Box<dyn ReadyListener>) {
        self.subscriptions.push(Subscription {
            label: label.into(),
            listener,
        });
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Deliver the event to every listener in subscription order
    ///
    /// Stops at the first listener error and returns it.
    pub fn fire(self, component_count: usize) -> Result<ReadyEvent> {
        let event = ReadyEvent {
            fired_at: Utc::now(),
            component_count,
        };

        info!(
            listeners = self.subscriptions.len(),
            component_count = component_count,
            "📣 READINESS: Container ready, notifying listeners"
        );

        for mut subscription in self.subscriptions {
            debug!(listener = %subscription.label, "Delivering readiness event");
            subscription.listener.on_container_ready(&event)?;
        }

        Ok(event)
    }
}

impl std::fmt::Debug for ReadinessSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<_> = self.subscriptions.iter().map(|s| s.label.as_str()).collect();
        f.debug_struct("ReadinessSignal")
            .field("listeners", &labels)
            .finish()
    }
}
