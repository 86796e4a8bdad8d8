//! Core engine for Pyrite embedded-Python notebooks.
//!
//! This crate provides:
//! - Interpreter host: lazy, process-wide session singleton
//! - Execution bridge: cells run against a persistent global namespace
//! - Output normalizer: raw runtime values into canonical records
//! - Worker IPC and channel: off-thread execution under a hard timeout

pub mod channel;
pub mod error;
pub mod interpreter;
pub mod ipc;
pub mod notebook;
pub mod output;
pub mod paths;

pub use channel::{DEFAULT_EXECUTION_TIMEOUT, WorkerChannel};
pub use error::{Error, Result};
pub use interpreter::{
    HostPhase, InterpreterHost, InterpreterSession, PRELOAD_LIBRARIES, SessionConfig,
};
pub use notebook::{Cell, CellType, Notebook};
pub use output::{
    CellOutput, ObjectHandle, OutputKind, OutputRecord, RawValue, normalize, sanitize,
};
pub use paths::SessionDirs;
