//! Deployment identifiers and records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::deployable::WorkerIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(Uuid);

impl DeploymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single deployment
///
/// ```text
/// Accepted → Running → Stopping → Stopped
///     ↓
///   Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Accepted for execution, `start` not finished yet
    Accepted,
    Running,
    Stopping,
    Stopped,
    /// `start` returned an error or panicked
    Failed(String),
}

impl DeploymentStatus {
    /// Counts against `deployment.max_deployments`
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Accepted | DeploymentStatus::Running | DeploymentStatus::Stopping
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStatus::Accepted => write!(f, "accepted"),
            DeploymentStatus::Running => write!(f, "running"),
            DeploymentStatus::Stopping => write!(f, "stopping"),
            DeploymentStatus::Stopped => write!(f, "stopped"),
            DeploymentStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Snapshot of a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub identity: WorkerIdentity,
    /// Order in which the runtime accepted deploy requests, starting at 1
    pub sequence: u64,
    pub status: DeploymentStatus,
    pub deployed_at: DateTime<Utc>,
}
