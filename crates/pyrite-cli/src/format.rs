//! Output formatting for terminal display.
//!
//! Renders cell output records for human consumption. Image payloads
//! are decoded and written into the session's scratch directory rather
//! than dumped to the terminal.

use base64::Engine;
use pyrite_core::{CellOutput, OutputKind, SessionDirs};

use crate::colors;

/// Print a cell's output records in presentation order.
pub fn print_output(cell_id: &str, output: &CellOutput, dirs: &SessionDirs) {
    println!("\n{}{}:{}", colors::CYAN, cell_id, colors::RESET);

    for (index, record) in output.records().iter().enumerate() {
        match record.kind {
            OutputKind::Text => {
                if record.payload.is_empty() {
                    println!("  {}(no output){}", colors::DIM, colors::RESET);
                } else {
                    for line in record.payload.lines() {
                        println!("  {line}");
                    }
                }
            }
            OutputKind::Html => {
                println!("  {}[html]{}", colors::DIM, colors::RESET);
                for line in record.payload.lines() {
                    println!("  {line}");
                }
            }
            OutputKind::Image => {
                let name = if index == 0 {
                    format!("{cell_id}.png")
                } else {
                    format!("{cell_id}-{index}.png")
                };
                let path = dirs.scratch_dir.join(name);
                match base64::engine::general_purpose::STANDARD.decode(&record.payload) {
                    Ok(bytes) => match std::fs::write(&path, bytes) {
                        Ok(()) => println!(
                            "  {}[image]{} saved to {}",
                            colors::DIM,
                            colors::RESET,
                            path.display()
                        ),
                        Err(err) => println!(
                            "  {}[image]{} could not be written: {err}",
                            colors::YELLOW,
                            colors::RESET
                        ),
                    },
                    Err(err) => println!(
                        "  {}[image]{} payload is not valid base64: {err}",
                        colors::YELLOW,
                        colors::RESET
                    ),
                }
            }
            OutputKind::Error => {
                for line in record.payload.lines() {
                    println!("  {}{line}{}", colors::RED, colors::RESET);
                }
            }
        }
    }
}
