//! Error types for the lifecycle bridge.
//!
//! Every failure on the startup path is fatal. `BridgeError` names the stage
//! that failed so the launcher can report it before exiting.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::coordination::CoordinationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// A component or worker could not be constructed, or configuration is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The coordination manager could not be acquired or the cluster could not be joined
    #[error("Coordination acquisition error: {0}")]
    CoordinationAcquisition(String),

    /// The runtime rejected a deploy request
    #[error("Deployment error for {identity}: {reason}")]
    Deployment { identity: String, reason: String },

    /// A lifecycle transition that is not allowed from the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The owned runtime could not be built or driven
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BridgeError {
    pub fn deployment(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Deployment {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Startup stage this error aborts
    pub fn stage(&self) -> &'static str {
        match self {
            BridgeError::Configuration(_) => "container_building",
            BridgeError::CoordinationAcquisition(_) => "runtime_construction",
            BridgeError::Deployment { .. } => "deploying",
            BridgeError::InvalidState(_) => "lifecycle",
            BridgeError::Runtime(_) => "runtime_construction",
        }
    }

    /// Process exit status used when this error aborts startup
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Configuration(_) => 78,
            BridgeError::CoordinationAcquisition(_) => 69,
            BridgeError::Deployment { .. } => 70,
            BridgeError::InvalidState(_) | BridgeError::Runtime(_) => 1,
        }
    }
}

impl From<ConfigurationError> for BridgeError {
    fn from(error: ConfigurationError) -> Self {
        BridgeError::Configuration(error.to_string())
    }
}

impl From<CoordinationError> for BridgeError {
    fn from(error: CoordinationError) -> Self {
        BridgeError::CoordinationAcquisition(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_exit_code_are_distinct_per_category() {
        let config = BridgeError::Configuration("missing dependency".to_string());
        let coordination = BridgeError::CoordinationAcquisition("backend down".to_string());
        let deployment = BridgeError::deployment("OrderWorker", "runtime closed");

        assert_eq!(config.stage(), "container_building");
        assert_eq!(coordination.stage(), "runtime_construction");
        assert_eq!(deployment.stage(), "deploying");

        assert_ne!(config.exit_code(), 0);
        assert_ne!(coordination.exit_code(), 0);
        assert_ne!(deployment.exit_code(), 0);
    }

    #[test]
    fn test_coordination_error_converts_to_acquisition_error() {
        let error: BridgeError = CoordinationError::Unavailable {
            backend: "in-memory".to_string(),
            message: "closed".to_string(),
        }
        .into();

        assert!(matches!(error, BridgeError::CoordinationAcquisition(_)));
        assert!(error.to_string().contains("in-memory"));
    }

    #[test]
    fn test_deployment_error_display() {
        let error = BridgeError::deployment("OrderWorker", "capacity exhausted");
        assert_eq!(
            error.to_string(),
            "Deployment error for OrderWorker: capacity exhausted"
        );
    }
}
