//! IPC protocol messages for Pyrite worker processes.
//!
//! Uses length-prefixed JSON messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + JSON-encoded message.
//!
//! JSON keeps the payload restricted to plain serializable structures,
//! which is all the worker boundary is allowed to carry.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::output::CellOutput;

/// Request sent from parent to worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Initialize the worker's own interpreter session.
    Init,

    /// Execute one cell's source text.
    Execute {
        /// The cell source to run.
        source_text: String,
        /// Correlates this request with its eventual reply.
        request_id: Uuid,
    },

    /// Ping to check if the worker is alive.
    Ping,

    /// Shutdown the worker process gracefully.
    Shutdown,
}

/// Reply sent from worker to parent process.
///
/// The worker replies exactly once per request; a reply whose
/// `request_id` matches no waiting caller is dropped on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Interpreter session is initialized.
    Ready,

    /// Execution completed with a normalized, sanitized output.
    Result {
        output: CellOutput,
        request_id: Uuid,
    },

    /// The request failed inside the worker. Not for user code: those
    /// failures come back as error records inside `Result`.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
    },

    /// Response to a Ping.
    Pong,

    /// Acknowledgement of a shutdown request.
    ShuttingDown,
}

impl WorkerReply {
    /// The correlation id carried by this reply, if any.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::Result { request_id, .. } => Some(*request_id),
            Self::Error { request_id, .. } => *request_id,
            _ => None,
        }
    }
}

/// Write a message using length-prefixed JSON encoding.
pub fn write_message<W: Write>(writer: &mut W, message: &impl Serialize) -> Result<()> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {e}")))?;

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {e}")))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {e}")))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {e}")))?;

    Ok(())
}

/// Read a message using length-prefixed JSON encoding.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {e}")))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    // Sanity check: reject absurdly large messages (100MB)
    if len > 100 * 1024 * 1024 {
        return Err(Error::Ipc(format!("IPC message too large: {len} bytes")));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Serialization(format!("Failed to decode IPC message: {e}")))
}
