//! Run command implementation for the Pyrite CLI.
//!
//! Executes a notebook headlessly, attaching each code cell's output.
//! This is the minimal stand-in for a notebook frontend's cell store:
//! it owns cell ordering and persistence, and asks the core only to
//! execute source text.

use std::path::Path;
use std::time::Instant;

use pyrite_core::{
    CellOutput, CellType, Error, InterpreterHost, Notebook, SessionConfig, SessionDirs,
    WorkerChannel,
};

use crate::colors;
use crate::format::print_output;

/// How cell source reaches an interpreter.
enum Engine {
    /// Directly against the in-process session.
    InProcess(InterpreterHost),
    /// Through the background worker, under the reply timeout.
    Isolated(WorkerChannel),
}

impl Engine {
    async fn connect(isolated: bool, config: SessionConfig) -> anyhow::Result<Self> {
        if isolated {
            Ok(Self::Isolated(WorkerChannel::connect().await?))
        } else {
            let host = InterpreterHost::new(config);
            spawn_status_printer(&host);
            Ok(Self::InProcess(host))
        }
    }

    /// Execute one cell. Timeouts surface as error records attached to
    /// the cell; infrastructure failures propagate.
    async fn execute(&self, source: &str) -> Result<CellOutput, Error> {
        let result = match self {
            Self::InProcess(host) => host.execute(source).await,
            Self::Isolated(channel) => channel.execute(source).await,
        };
        match result {
            Ok(output) => Ok(output),
            Err(err @ Error::Timeout(_)) => Ok(CellOutput::error(err.to_string())),
            Err(err) => Err(err),
        }
    }
}

/// Forward interpreter status strings to the terminal as dim lines.
fn spawn_status_printer(host: &InterpreterHost) {
    let mut status = host.subscribe_status();
    tokio::spawn(async move {
        while let Ok(message) = status.recv().await {
            println!("{}{}{}", colors::DIM, message, colors::RESET);
        }
    });
}

/// Execute a notebook file.
pub async fn execute(notebook_path: &str, isolated: bool, save: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let path = Path::new(notebook_path);

    let mut notebook = Notebook::load(path)?;
    if notebook.cells.is_empty() {
        println!(
            "{}No cells found in notebook.{}",
            colors::YELLOW,
            colors::RESET
        );
        return Ok(());
    }

    let dirs = SessionDirs::from_notebook_path(path)?;
    let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let engine = Engine::connect(isolated, SessionConfig::rooted_at(root)).await?;

    println!(
        "{}Running{} {} ({} cells)",
        colors::BOLD,
        colors::RESET,
        notebook_path,
        notebook.cells.len()
    );

    let mut executed = 0;
    for cell in &mut notebook.cells {
        if cell.cell_type != CellType::Code {
            continue;
        }

        cell.is_executing = true;
        let output = engine.execute(&cell.content).await?;
        print_output(&cell.id, &output, &dirs);
        cell.output = Some(output);
        cell.is_executing = false;
        executed += 1;
    }

    println!(
        "\n{}Completed{} {} cells in {:.2}s",
        colors::GREEN,
        colors::RESET,
        executed,
        start.elapsed().as_secs_f64()
    );

    if save {
        notebook.save(path)?;
        println!("{}Outputs written back to {notebook_path}{}", colors::DIM, colors::RESET);
    }

    Ok(())
}

/// Evaluate a single snippet and print its output.
pub async fn exec(source: &str, isolated: bool) -> anyhow::Result<()> {
    let dirs = SessionDirs::from_session_dir(Path::new("."))?;
    let engine = Engine::connect(isolated, SessionConfig::default()).await?;
    let output = engine.execute(source).await?;
    print_output("result", &output, &dirs);
    Ok(())
}

/// Install a package into a fresh interpreter session.
///
/// Useful for checking installability and warming the package cache;
/// the session itself ends with the process.
pub async fn install(package: &str) -> anyhow::Result<()> {
    let host = InterpreterHost::new(SessionConfig::default());
    spawn_status_printer(&host);
    host.acquire().await?;
    host.install_package(package).await?;
    println!("{}Installed{} {package}", colors::GREEN, colors::RESET);
    Ok(())
}
