//! Error types for pyrite-core.

use thiserror::Error;

/// Result type for pyrite-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pyrite-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Runtime engine or a required bootstrap step failed to load.
    #[error("interpreter initialization failed: {0}")]
    Init(String),

    /// The interpreter session is not in the Ready state.
    #[error("interpreter session not ready: {0}")]
    NotReady(String),

    /// A Python call made by the host itself raised.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Package installation failed. The session stays usable.
    #[error("failed to install package '{package}': {message}")]
    Install { package: String, message: String },

    /// Background execution exceeded the wait ceiling.
    #[error("execution timed out after {0} seconds")]
    Timeout(u64),

    /// IPC communication error with the worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<pyo3::PyErr> for Error {
    fn from(err: pyo3::PyErr) -> Self {
        Error::Runtime(err.to_string())
    }
}
