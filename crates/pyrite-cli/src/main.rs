//! Pyrite CLI - headless runner for embedded-Python notebooks.

mod colors;
mod format;
mod run;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pyrite")]
#[command(about = "Notebook execution engine with an embedded Python runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook headlessly
    Run {
        /// Path to the notebook (.json file)
        notebook: String,

        /// Execute in an isolated worker process under the reply timeout
        #[arg(long)]
        isolated: bool,

        /// Write outputs back into the notebook file
        #[arg(long)]
        save: bool,
    },

    /// Evaluate a single snippet and print its output
    Exec {
        /// Source text to execute
        source: String,

        /// Execute in an isolated worker process under the reply timeout
        #[arg(long)]
        isolated: bool,
    },

    /// Install a package into the interpreter session
    Install {
        /// Package name
        package: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Run {
            notebook,
            isolated,
            save,
        } => run::execute(&notebook, isolated, save).await,
        Commands::Exec { source, isolated } => run::exec(&source, isolated).await,
        Commands::Install { package } => run::install(&package).await,
    }
}
