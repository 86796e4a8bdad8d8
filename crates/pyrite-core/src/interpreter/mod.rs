//! Embedded interpreter: session lifecycle and the execution bridge.

mod host;
mod session;

pub use host::{HostPhase, InterpreterHost};
pub use session::{InterpreterSession, PRELOAD_LIBRARIES, SessionConfig};
