//! Worker process management for off-thread cell execution.
//!
//! Provides `WorkerHandle` for spawning and communicating with the
//! background execution context: a separate process owning its own
//! interpreter session, so the interactive side never blocks on it.

use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::output::CellOutput;

use super::protocol::{WorkerReply, WorkerRequest, read_message, write_message};

/// Handle to a worker process.
///
/// Provides blocking send/recv over the worker's stdin/stdout; async
/// callers go through `channel::WorkerChannel` instead.
pub struct WorkerHandle {
    /// The child process.
    child: Child,
    /// Buffered stdin writer.
    stdin: BufWriter<std::process::ChildStdin>,
    /// Buffered stdout reader.
    stdout: BufReader<std::process::ChildStdout>,
    /// Whether the worker has been killed.
    killed: bool,
}

impl WorkerHandle {
    /// Spawn a new worker process.
    ///
    /// Looks for the `pyrite-worker` binary in the following order:
    /// 1. `PYRITE_WORKER_PATH` environment variable
    /// 2. Same directory as the current executable
    /// 3. System PATH
    pub fn spawn() -> Result<Self> {
        let worker_path = Self::find_worker_binary()?;

        let mut child = Command::new(&worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let worker stderr pass through for debugging
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "Failed to spawn worker process '{}': {}",
                    worker_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;

        let mut handle = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            killed: false,
        };

        // Verify worker is alive with a ping
        handle.send_request(&WorkerRequest::Ping)?;
        match handle.recv_reply()? {
            WorkerReply::Pong => Ok(handle),
            other => Err(Error::Ipc(format!(
                "Unexpected response from worker: {other:?}"
            ))),
        }
    }

    /// Find the pyrite-worker binary path.
    fn find_worker_binary() -> Result<PathBuf> {
        // 1. Check environment variable
        if let Ok(path) = std::env::var("PYRITE_WORKER_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        let worker_name = if cfg!(windows) {
            "pyrite-worker.exe"
        } else {
            "pyrite-worker"
        };

        // 2. Look next to current executable
        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let worker_path = exe_dir.join(worker_name);
            if worker_path.exists() {
                return Ok(worker_path);
            }
        }

        // 3. Try system PATH via which
        if let Ok(path) = which::which(worker_name) {
            return Ok(path);
        }

        // 4. For development: try target/debug or target/release
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            for profile in &["debug", "release"] {
                let path = PathBuf::from(&manifest_dir)
                    .join("..")
                    .join("..")
                    .join("target")
                    .join(profile)
                    .join(worker_name);
                if path.exists() {
                    return Ok(path.canonicalize().unwrap_or(path));
                }
            }
        }

        Err(Error::Ipc(
            "Could not find pyrite-worker binary. Set PYRITE_WORKER_PATH or ensure it's in PATH."
                .to_string(),
        ))
    }

    /// Send a request to the worker.
    pub fn send_request(&mut self, request: &WorkerRequest) -> Result<()> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        write_message(&mut self.stdin, request)
    }

    /// Receive a reply from the worker.
    pub fn recv_reply(&mut self) -> Result<WorkerReply> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        read_message(&mut self.stdout)
    }

    /// Initialize the worker's interpreter session.
    ///
    /// Blocks until the runtime is loaded inside the worker. The
    /// worker's session is independent of any session in this process;
    /// state divergence between the two is expected.
    pub fn init(&mut self) -> Result<()> {
        self.send_request(&WorkerRequest::Init)?;
        match self.recv_reply()? {
            WorkerReply::Ready => Ok(()),
            WorkerReply::Error { message, .. } => Err(Error::Init(message)),
            other => Err(Error::Ipc(format!(
                "Unexpected response when initializing worker: {other:?}"
            ))),
        }
    }

    /// Execute one cell in the worker and wait for its reply.
    ///
    /// Replies whose `request_id` does not match are stale leftovers of
    /// an abandoned (timed-out) wait; they are dropped and the read
    /// continues.
    pub fn execute(&mut self, source_text: &str, request_id: Uuid) -> Result<CellOutput> {
        self.send_request(&WorkerRequest::Execute {
            source_text: source_text.to_string(),
            request_id,
        })?;

        loop {
            match self.recv_reply()? {
                WorkerReply::Result { output, request_id: id } if id == request_id => {
                    return Ok(output);
                }
                WorkerReply::Error { message, request_id: Some(id) } if id == request_id => {
                    return Err(Error::Runtime(message));
                }
                reply @ (WorkerReply::Result { .. } | WorkerReply::Error { .. }) => {
                    tracing::debug!(
                        stale = ?reply.request_id(),
                        expected = %request_id,
                        "dropping stale worker reply"
                    );
                }
                other => {
                    return Err(Error::Ipc(format!(
                        "Unexpected response when executing: {other:?}"
                    )));
                }
            }
        }
    }

    /// Kill the worker process immediately.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        self.killed = true;

        // Try graceful shutdown first so cleanup can happen
        let _ = self.send_request_unchecked(&WorkerRequest::Shutdown);
        std::thread::sleep(Duration::from_millis(10));

        // Force kill if still running
        if let Err(e) = self.child.kill() {
            // ESRCH means process already exited, which is fine
            if !e.to_string().contains("No such process") {
                tracing::warn!("Failed to kill worker: {}", e);
            }
        }

        // Wait to reap zombie
        let _ = self.child.wait();

        Ok(())
    }

    // Shutdown path writes after `killed` is set; bypass the liveness check.
    fn send_request_unchecked(&mut self, request: &WorkerRequest) -> Result<()> {
        write_message(&mut self.stdin, request)
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Graceful shutdown - ask the worker to exit cleanly.
    pub fn shutdown(mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        let _ = self.send_request(&WorkerRequest::Shutdown);

        match self.child.wait() {
            Ok(status) => {
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::Ipc(format!("Worker exited with status: {status}")))
                }
            }
            Err(e) => Err(Error::Ipc(format!("Failed to wait for worker: {e}"))),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Ensure worker is killed when handle is dropped
        let _ = self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require the pyrite-worker binary to be built.
    // Run `cargo build -p pyrite-worker` first.

    #[test]
    #[ignore = "Requires pyrite-worker binary"]
    fn test_worker_spawn_and_ping() {
        let worker = WorkerHandle::spawn().unwrap();
        assert!(worker.pid() > 0);
    }

    #[test]
    #[ignore = "Requires pyrite-worker binary"]
    fn test_worker_execute_after_init() {
        let mut worker = WorkerHandle::spawn().unwrap();
        worker.init().unwrap();

        let output = worker.execute("1 + 1", Uuid::new_v4()).unwrap();
        assert_eq!(output.records()[0].payload, "2");
    }
}
