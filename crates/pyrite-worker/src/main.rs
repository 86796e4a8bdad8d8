//! Pyrite worker process: the background execution context.
//!
//! Speaks length-prefixed JSON over stdin/stdout. Owns its own
//! interpreter session, independent of any session in the parent
//! process; state divergence between the two is an accepted limitation
//! of off-thread execution, not a bug.
//!
//! Every reply is fully normalized and sanitized before it is written:
//! the transport only carries plain serializable structures.

use std::io::{BufReader, BufWriter, Read, Write};

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use pyrite_core::interpreter::{InterpreterSession, SessionConfig};
use pyrite_core::ipc::{WorkerReply, WorkerRequest, read_message, write_message};

fn main() -> Result<()> {
    // Log to stderr; stdout is the IPC stream.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = BufWriter::new(stdout.lock());

    serve(&mut reader, &mut writer)
}

fn serve<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<()> {
    let mut session: Option<InterpreterSession> = None;

    loop {
        let request: WorkerRequest = match read_message(reader) {
            Ok(request) => request,
            Err(err) => {
                // Parent closed the pipe or the stream is corrupt; exit.
                tracing::debug!("worker request stream ended: {err}");
                return Ok(());
            }
        };

        match request {
            WorkerRequest::Ping => {
                write_message(writer, &WorkerReply::Pong)?;
            }

            WorkerRequest::Init => {
                if session.is_none() {
                    match InterpreterSession::initialize(&SessionConfig::default(), |status| {
                        tracing::info!("{status}");
                    }) {
                        Ok(initialized) => session = Some(initialized),
                        Err(err) => {
                            write_message(
                                writer,
                                &WorkerReply::Error {
                                    message: err.to_string(),
                                    request_id: None,
                                },
                            )?;
                            continue;
                        }
                    }
                }
                write_message(writer, &WorkerReply::Ready)?;
            }

            WorkerRequest::Execute {
                source_text,
                request_id,
            } => {
                let reply = match session.as_ref() {
                    Some(session) => WorkerReply::Result {
                        output: session.execute_normalized(&source_text),
                        request_id,
                    },
                    None => WorkerReply::Error {
                        message: "interpreter session not initialized".to_string(),
                        request_id: Some(request_id),
                    },
                };
                write_message(writer, &reply)?;
            }

            WorkerRequest::Shutdown => {
                write_message(writer, &WorkerReply::ShuttingDown)?;
                return Ok(());
            }
        }
    }
}
