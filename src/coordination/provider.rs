//! Providers that hand a coordination manager to the runtime.

use std::sync::Arc;

use super::{CoordinationError, CoordinationManager, SharedCoordinationManager};

/// Supplies the coordination manager a runtime is built with
///
/// Called exactly once while the runtime is constructed, before any worker
/// is deployed. `Ok(None)` requests standalone mode; `Err` aborts startup.
pub trait CoordinationManagerProvider: Send + Sync {
    fn coordination_manager(&self) -> Result<Option<SharedCoordinationManager>, CoordinationError>;
}

impl<F> CoordinationManagerProvider for F
where
    F: Fn() -> Result<Option<SharedCoordinationManager>, CoordinationError> + Send + Sync,
{
    fn coordination_manager(&self) -> Result<Option<SharedCoordinationManager>, CoordinationError> {
        self()
    }
}

/// Never supplies a manager; the runtime runs standalone
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneProvider;

impl CoordinationManagerProvider for StandaloneProvider {
    fn coordination_manager(&self) -> Result<Option<SharedCoordinationManager>, CoordinationError> {
        Ok(None)
    }
}

/// Supplies a manager built ahead of time
#[derive(Debug, Clone)]
pub struct StaticCoordinationProvider {
    manager: SharedCoordinationManager,
}

impl StaticCoordinationProvider {
    pub fn new(manager: Arc<dyn CoordinationManager>) -> Self {
        Self { manager }
    }
}

impl CoordinationManagerProvider for StaticCoordinationProvider {
    fn coordination_manager(&self) -> Result<Option<SharedCoordinationManager>, CoordinationError> {
        Ok(Some(Arc::clone(&self.manager)))
    }
}
