//! Interpreter host: owns the process-wide session singleton.
//!
//! Guarantees exactly one initialized runtime per process through an
//! idempotent "get or create" accessor. Concurrent callers during a
//! load all await the same in-flight future; a failed load is retried
//! from scratch on the next call.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::output::CellOutput;

use super::session::{InterpreterSession, SessionConfig};

/// Capacity for the status broadcast channel. Status strings are
/// advisory; slow subscribers simply miss older updates.
const STATUS_CHANNEL_CAPACITY: usize = 64;

type LoadResult = std::result::Result<Arc<InterpreterSession>, Arc<Error>>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

/// Lifecycle phase of the hosted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

enum HostState {
    Uninitialized,
    Loading(LoadFuture),
    Ready(Arc<InterpreterSession>),
    Failed(String),
}

/// Process-wide interpreter host.
pub struct InterpreterHost {
    state: Mutex<HostState>,
    config: SessionConfig,
    status_tx: broadcast::Sender<String>,
}

impl InterpreterHost {
    pub fn new(config: SessionConfig) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(HostState::Uninitialized),
            config,
            status_tx,
        }
    }

    /// Subscribe to advisory status strings ("Loading numpy...", "Ready").
    pub fn subscribe_status(&self) -> broadcast::Receiver<String> {
        self.status_tx.subscribe()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> HostPhase {
        match &*self.state.lock().unwrap() {
            HostState::Uninitialized => HostPhase::Uninitialized,
            HostState::Loading(_) => HostPhase::Loading,
            HostState::Ready(_) => HostPhase::Ready,
            HostState::Failed(_) => HostPhase::Failed,
        }
    }

    /// Message from the most recent failed load, if any.
    pub fn last_error(&self) -> Option<String> {
        match &*self.state.lock().unwrap() {
            HostState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Get or create the session.
    ///
    /// Ready returns immediately; Loading awaits the stored in-flight
    /// future (a second load is never started); Uninitialized or Failed
    /// starts a fresh load.
    pub async fn acquire(&self) -> Result<Arc<InterpreterSession>> {
        let future = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                HostState::Ready(session) => return Ok(session.clone()),
                HostState::Loading(future) => future.clone(),
                HostState::Uninitialized | HostState::Failed(_) => {
                    let config = self.config.clone();
                    let status_tx = self.status_tx.clone();
                    let future = async move {
                        tokio::task::spawn_blocking(move || {
                            InterpreterSession::initialize(&config, |message| {
                                let _ = status_tx.send(message.to_string());
                            })
                        })
                        .await
                        .map_err(|e| {
                            Arc::new(Error::Init(format!("initialization task panicked: {e}")))
                        })?
                        .map(Arc::new)
                        .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *state = HostState::Loading(future.clone());
                    future
                }
            }
        };

        let result = future.clone().await;

        // Commit the transition only if the state still holds this very
        // load. A waiter of an older (failed) load can wake after a
        // retry installed a fresh Loading or Ready state; overwriting
        // it here would orphan that in-flight load.
        {
            let mut state = self.state.lock().unwrap();
            if matches!(&*state, HostState::Loading(current) if current.ptr_eq(&future)) {
                match &result {
                    Ok(session) => {
                        *state = HostState::Ready(session.clone());
                        let _ = self.status_tx.send("Ready".to_string());
                    }
                    Err(err) => {
                        *state = HostState::Failed(err.to_string());
                        let _ = self.status_tx.send(format!("Failed: {err}"));
                    }
                }
            }
        }

        result.map_err(|err| Error::Init(err.to_string()))
    }

    /// Execute one cell against the hosted session, initializing it
    /// first if needed. Failures surface as error records, never as
    /// host-level errors; an `Err` here means initialization failed.
    pub async fn execute(&self, source: &str) -> Result<CellOutput> {
        let session = self.acquire().await?;
        let source = source.to_string();
        tokio::task::spawn_blocking(move || session.execute_normalized(&source))
            .await
            .map_err(|e| Error::Runtime(format!("execution task panicked: {e}")))
    }

    /// Install a package into the hosted session. Requires Ready.
    ///
    /// Failure is reported through the status channel and the returned
    /// error; the session stays Ready either way.
    pub async fn install_package(&self, name: &str) -> Result<()> {
        let session = {
            let state = self.state.lock().unwrap();
            match &*state {
                HostState::Ready(session) => session.clone(),
                _ => {
                    return Err(Error::NotReady(
                        "package installation requires an initialized session".to_string(),
                    ));
                }
            }
        };

        let _ = self.status_tx.send(format!("Installing {name}..."));
        let package = name.to_string();
        let result = tokio::task::spawn_blocking(move || session.install_package(&package))
            .await
            .map_err(|e| Error::Install {
                package: name.to_string(),
                message: format!("install task panicked: {e}"),
            })?;

        match &result {
            Ok(()) => {
                let _ = self.status_tx.send(format!("Installed {name}"));
            }
            Err(err) => {
                tracing::warn!(package = name, error = %err, "package install failed");
                let _ = self.status_tx.send(format!("Install failed: {err}"));
            }
        }
        result
    }
}

impl Default for InterpreterHost {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
