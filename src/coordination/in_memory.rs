//! In-process membership group.
//!
//! Several runtimes in one process can share a single manager to form a
//! cluster. Used by tests and local multi-node runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{ClusterNode, CoordinationError, CoordinationManager, NodeId};
use crate::logging::log_coordination_operation;

const BACKEND: &str = "in-memory";

#[derive(Debug, Default)]
pub struct InMemoryCoordinationManager {
    members: DashMap<NodeId, ClusterNode>,
    unavailable: AtomicBool,
}

impl InMemoryCoordinationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away; later joins fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn ensure_available(&self) -> Result<(), CoordinationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoordinationError::Unavailable {
                backend: BACKEND.to_string(),
                message: "membership group closed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationManager for InMemoryCoordinationManager {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn join(&self, node: &ClusterNode) -> Result<(), CoordinationError> {
        self.ensure_available()?;

        let node_id = node.node_id.to_string();
        if self.members.insert(node.node_id.clone(), node.clone()).is_some() {
            debug!(node_id = %node_id, "Node re-joined in-memory cluster");
        }

        log_coordination_operation(
            "join",
            BACKEND,
            Some(&node_id),
            "joined",
            Some(&node.address()),
        );
        Ok(())
    }

    async fn leave(&self, node_id: &NodeId) -> Result<(), CoordinationError> {
        match self.members.remove(node_id) {
            Some(_) => {
                log_coordination_operation("leave", BACKEND, Some(&node_id.to_string()), "left", None);
                Ok(())
            }
            None => Err(CoordinationError::UnknownMember {
                node_id: node_id.to_string(),
            }),
        }
    }

    async fn members(&self) -> Result<Vec<ClusterNode>, CoordinationError> {
        self.ensure_available()?;
        Ok(self.members.iter().map(|entry| entry.value().clone()).collect())
    }
}
