use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lifecycle_bridge::coordination::{
    ClusterNode, CoordinationError, CoordinationManager, CoordinationManagerProvider, NodeId,
    SharedCoordinationManager,
};

/// Counts how often the runtime asks for a manager
#[derive(Clone, Default)]
pub struct CountingProvider {
    calls: Arc<AtomicUsize>,
    manager: Option<SharedCoordinationManager>,
}

impl CountingProvider {
    pub fn standalone() -> Self {
        Self::default()
    }

    pub fn with_manager(manager: SharedCoordinationManager) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            manager: Some(manager),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CoordinationManagerProvider for CountingProvider {
    fn coordination_manager(&self) -> Result<Option<SharedCoordinationManager>, CoordinationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.manager.clone())
    }
}

/// Provider whose backend cannot be reached
#[derive(Clone, Copy, Default)]
pub struct FailingProvider;

impl CoordinationManagerProvider for FailingProvider {
    fn coordination_manager(&self) -> Result<Option<SharedCoordinationManager>, CoordinationError> {
        Err(CoordinationError::Unavailable {
            backend: "test".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

/// Manager whose join never completes
#[derive(Debug, Default)]
pub struct StalledCoordinationManager;

#[async_trait]
impl CoordinationManager for StalledCoordinationManager {
    fn backend(&self) -> &str {
        "stalled"
    }

    async fn join(&self, _node: &ClusterNode) -> Result<(), CoordinationError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn leave(&self, _node_id: &NodeId) -> Result<(), CoordinationError> {
        Ok(())
    }

    async fn members(&self) -> Result<Vec<ClusterNode>, CoordinationError> {
        Ok(Vec::new())
    }
}
