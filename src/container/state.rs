//! # Launch State
//!
//! Tracks where a launch is in its startup sequence.
//!
//! ```text
//! Uninitialized → ContainerBuilding → ReadyEventFired → Deploying → Running → Stopped
//!                         ↓                                  ↓
//!                       Failed                             Failed
//! ```
//!
//! `Failed` and `Stopped` are terminal.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LaunchState {
    /// Nothing registered with the container has been constructed yet
    #[default]
    Uninitialized,

    /// Runtime and components are being constructed
    ContainerBuilding,

    /// Every component is constructed and the readiness signal has fired
    ReadyEventFired,

    /// Bridges are handing their workers to the runtime
    Deploying,

    /// Every deploy request was accepted
    Running,

    /// Startup aborted; the reason is carried for reporting
    Failed(String),

    /// Workers stopped and runtime shut down after a successful launch
    Stopped,
}

impl LaunchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LaunchState::Failed(_) | LaunchState::Stopped)
    }

    pub fn description(&self) -> &'static str {
        match self {
            LaunchState::Uninitialized => "Launch not started",
            LaunchState::ContainerBuilding => "Building container",
            LaunchState::ReadyEventFired => "Container ready",
            LaunchState::Deploying => "Deploying workers",
            LaunchState::Running => "Workers deployed",
            LaunchState::Failed(_) => "Launch failed",
            LaunchState::Stopped => "Launch stopped",
        }
    }

    /// Check if transition to the target state is valid
    pub fn can_transition_to(&self, target: &LaunchState) -> bool {
        use LaunchState::*;

        match (self, target) {
            (Uninitialized, ContainerBuilding) => true,

            (ContainerBuilding, ReadyEventFired) => true,
            (ContainerBuilding, Failed(_)) => true,

            (ReadyEventFired, Deploying) => true,

            (Deploying, Running) => true,
            (Deploying, Failed(_)) => true,

            (Running, Stopped) => true,

            _ => false,
        }
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchState::Uninitialized => write!(f, "Uninitialized"),
            LaunchState::ContainerBuilding => write!(f, "ContainerBuilding"),
            LaunchState::ReadyEventFired => write!(f, "ReadyEventFired"),
            LaunchState::Deploying => write!(f, "Deploying"),
            LaunchState::Running => write!(f, "Running"),
            LaunchState::Failed(reason) => write!(f, "Failed({reason})"),
            LaunchState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Shared, validated launch state
#[derive(Debug, Clone, Default)]
pub struct LaunchStateManager {
    state: Arc<RwLock<LaunchState>>,
}

impl LaunchStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> LaunchState {
        self.state.read().clone()
    }

    /// Move to `target`, rejecting transitions the lifecycle does not allow
    pub fn transition_to(&self, target: LaunchState) -> Result<(), BridgeError> {
        let mut current = self.state.write();

        if !current.can_transition_to(&target) {
            return Err(BridgeError::InvalidState(format!(
                "invalid launch transition from {current} to {target}"
            )));
        }

        tracing::info!(
            from_state = %current,
            to_state = %target,
            "🔄 LAUNCH STATE: {}",
            target.description()
        );

        *current = target;
        Ok(())
    }

    /// Record a fatal error if the current state allows failing
    pub fn fail(&self, error: &BridgeError) {
        let target = LaunchState::Failed(error.to_string());
        if let Err(transition_error) = self.transition_to(target) {
            tracing::warn!(
                error = %error,
                transition_error = %transition_error,
                "⚠️ LAUNCH STATE: failure not recorded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use LaunchState::*;

        assert!(Uninitialized.can_transition_to(&ContainerBuilding));
        assert!(ContainerBuilding.can_transition_to(&ReadyEventFired));
        assert!(ReadyEventFired.can_transition_to(&Deploying));
        assert!(Deploying.can_transition_to(&Running));
        assert!(Running.can_transition_to(&Stopped));
    }

    #[test]
    fn test_failure_only_from_building_or_deploying() {
        use LaunchState::*;
        let failed = Failed("boom".to_string());

        assert!(ContainerBuilding.can_transition_to(&failed));
        assert!(Deploying.can_transition_to(&failed));
        assert!(!Uninitialized.can_transition_to(&failed));
        assert!(!Running.can_transition_to(&failed));
    }

    #[test]
    fn test_invalid_transitions() {
        use LaunchState::*;

        // No skipping the readiness signal
        assert!(!ContainerBuilding.can_transition_to(&Deploying));
        assert!(!Uninitialized.can_transition_to(&Running));
        // Readiness fires once
        assert!(!ReadyEventFired.can_transition_to(&ReadyEventFired));
        // Terminal states stay terminal
        assert!(!Failed("boom".to_string()).can_transition_to(&ContainerBuilding));
        assert!(!Stopped.can_transition_to(&Uninitialized));
    }

    #[test]
    fn test_manager_rejects_invalid_transition() {
        let manager = LaunchStateManager::new();
        assert_eq!(manager.current_state(), LaunchState::Uninitialized);

        let err = manager.transition_to(LaunchState::Running).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidState(_)));
        assert_eq!(manager.current_state(), LaunchState::Uninitialized);
    }

    #[test]
    fn test_manager_records_failure() {
        let manager = LaunchStateManager::new();
        manager.transition_to(LaunchState::ContainerBuilding).unwrap();
        manager.fail(&BridgeError::Configuration("missing dependency".to_string()));

        let state = manager.current_state();
        assert!(state.is_terminal());
        assert!(state.to_string().contains("missing dependency"));
    }

    #[test]
    fn test_clones_share_state() {
        let manager = LaunchStateManager::new();
        let observer = manager.clone();
        manager.transition_to(LaunchState::ContainerBuilding).unwrap();
        assert_eq!(observer.current_state(), LaunchState::ContainerBuilding);
    }
}
