//! Runs a future on several runtime tasks and collects the results in order.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextRunnerError {
    #[error("Already on a runtime thread; blocking here would deadlock")]
    AlreadyOnRuntime,

    #[error("Runtime is shut down")]
    RuntimeClosed,

    #[error("Instances did not complete within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Instance {index} failed: {message}")]
    InstanceFailed { index: usize, message: String },

    #[error("Instance {index} panicked: {message}")]
    InstancePanicked { index: usize, message: String },
}

/// Executes user code on the runtime's worker pool
#[derive(Debug, Clone)]
pub struct ContextRunner {
    handle: Handle,
    closed: Arc<AtomicBool>,
}

impl ContextRunner {
    /// `closed` is the owning runtime's shutdown flag
    pub(crate) fn new(handle: Handle, closed: Arc<AtomicBool>) -> Self {
        Self { handle, closed }
    }

    fn ensure_open(&self) -> Result<(), ContextRunnerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ContextRunnerError::RuntimeClosed);
        }
        Ok(())
    }

    /// Spawn `instances` copies of `task` and return their results by instance index.
    ///
    /// The first failing instance (lowest index) is reported; the remaining
    /// instances still run to completion.
    pub async fn execute<F, Fut, T, E>(
        &self,
        instances: usize,
        task: F,
    ) -> Result<Vec<T>, ContextRunnerError>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.ensure_open()?;

        let handles: Vec<_> = (0..instances)
            .map(|index| self.handle.spawn(task(index)))
            .collect();

        let outcomes = futures::future::join_all(handles).await;
        debug!(instances = instances, "Context runner collected instance results");

        let mut results = Vec::with_capacity(instances);
        let mut first_error = None;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            let error = match outcome {
                Ok(Ok(value)) => {
                    results.push(value);
                    continue;
                }
                Ok(Err(error)) => ContextRunnerError::InstanceFailed {
                    index,
                    message: error.to_string(),
                },
                Err(join_error) => ContextRunnerError::InstancePanicked {
                    index,
                    message: join_error.to_string(),
                },
            };

            if first_error.is_none() {
                first_error = Some(error);
            } else {
                warn!(error = %error, "Additional context runner instance failed");
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(results),
        }
    }

    /// Blocking form of [`execute`](Self::execute) for callers outside the runtime
    pub fn execute_blocking<F, Fut, T, E>(
        &self,
        instances: usize,
        task: F,
        timeout: Duration,
    ) -> Result<Vec<T>, ContextRunnerError>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(ContextRunnerError::AlreadyOnRuntime);
        }
        self.ensure_open()?;

        self.handle.block_on(async {
            tokio::time::timeout(timeout, self.execute(instances, task))
                .await
                .map_err(|_| ContextRunnerError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })?
        })
    }
}
