//! Async execution channel to the background worker.
//!
//! Relays cell source to the worker process and races the reply against
//! a hard wall-clock ceiling, so the interactive side never blocks on
//! long-running code. There is no cancellation: when the timer fires
//! the wait is abandoned, the worker keeps computing, and its late
//! reply is dropped by request-id correlation on the next call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ipc::WorkerHandle;
use crate::output::CellOutput;

/// Hard ceiling on how long a caller waits for one execution.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Async channel to one worker process.
///
/// At most one execution is in flight at a time; a second call queues
/// on the worker lock until the first reply (or its abandonment)
/// releases it.
pub struct WorkerChannel {
    worker: Arc<Mutex<WorkerHandle>>,
    timeout: Duration,
}

impl WorkerChannel {
    /// Spawn and initialize a worker, with the default timeout.
    pub async fn connect() -> Result<Self> {
        Self::connect_with_timeout(DEFAULT_EXECUTION_TIMEOUT).await
    }

    /// Spawn and initialize a worker with a custom reply timeout.
    pub async fn connect_with_timeout(timeout: Duration) -> Result<Self> {
        let worker = tokio::task::spawn_blocking(|| {
            let mut worker = WorkerHandle::spawn()?;
            worker.init()?;
            Ok::<_, Error>(worker)
        })
        .await
        .map_err(|e| Error::Ipc(format!("worker startup task panicked: {e}")))??;

        Ok(Self {
            worker: Arc::new(Mutex::new(worker)),
            timeout,
        })
    }

    /// Execute one cell in the worker.
    ///
    /// Fails with [`Error::Timeout`] if no reply arrives within the
    /// configured ceiling. The underlying computation is not cancelled
    /// and may still complete unobserved.
    pub async fn execute(&self, source_text: &str) -> Result<CellOutput> {
        let request_id = Uuid::new_v4();
        let source = source_text.to_string();
        let worker = self.worker.clone();

        let wait = async move {
            let mut guard = worker.lock_owned().await;
            tokio::task::spawn_blocking(move || guard.execute(&source, request_id))
                .await
                .map_err(|e| Error::Ipc(format!("execution task panicked: {e}")))?
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%request_id, "execution timed out; abandoning wait");
                Err(Error::Timeout(self.timeout.as_secs()))
            }
        }
    }

    /// The configured reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
