//! # Cluster Coordination Seam
//!
//! The runtime never depends on a concrete membership backend. It receives a
//! [`CoordinationManagerProvider`] at construction, asks it exactly once for a
//! [`CoordinationManager`], and runs standalone when none is supplied.
//!
//! ```text
//! Launcher ──→ Container::refresh ──→ RuntimeHandle::new(provider)
//!                                          │
//!                                          ├─ provider.coordination_manager()   (once)
//!                                          └─ manager.join(local node)          (bounded)
//! ```

mod in_memory;
mod provider;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use in_memory::InMemoryCoordinationManager;
pub use provider::{CoordinationManagerProvider, StandaloneProvider, StaticCoordinationProvider};

/// Unique identity of a runtime instance within a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address card a runtime presents when joining a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
    pub ha_group: String,
}

impl ClusterNode {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Failures raised by a coordination backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinationError {
    #[error("Coordination backend {backend} unavailable: {message}")]
    Unavailable { backend: String, message: String },

    #[error("Joining cluster via {backend} timed out after {timeout_ms}ms")]
    JoinTimeout { backend: String, timeout_ms: u64 },

    #[error("Clustering requested but no coordination manager was supplied")]
    ManagerRequired,

    #[error("Node {node_id} is not a member of the cluster")]
    UnknownMember { node_id: String },

    #[error("Coordination backend error: {0}")]
    Backend(String),
}

/// Cluster membership backend attached to a runtime
///
/// Implementations wrap a concrete coordination service. Calls happen on the
/// runtime's own executor.
#[async_trait]
pub trait CoordinationManager: Send + Sync + fmt::Debug {
    /// Short backend name for logs, e.g. `"in-memory"`
    fn backend(&self) -> &str;

    /// Register the local node with the cluster
    async fn join(&self, node: &ClusterNode) -> Result<(), CoordinationError>;

    /// Remove the local node from the cluster
    async fn leave(&self, node_id: &NodeId) -> Result<(), CoordinationError>;

    /// Current cluster membership
    async fn members(&self) -> Result<Vec<ClusterNode>, CoordinationError>;
}

/// Shared handle to a coordination manager
pub type SharedCoordinationManager = Arc<dyn CoordinationManager>;
