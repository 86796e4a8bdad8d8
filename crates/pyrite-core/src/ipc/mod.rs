//! Worker process IPC: protocol messages and process management.

pub mod protocol;
pub mod worker;

pub use protocol::{WorkerReply, WorkerRequest, read_message, write_message};
pub use worker::WorkerHandle;
