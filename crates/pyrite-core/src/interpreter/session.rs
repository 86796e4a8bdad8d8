//! Embedded interpreter session and the execution bridge.
//!
//! An [`InterpreterSession`] wraps one embedded CPython runtime: the
//! persistent global namespace that survives across cell executions,
//! and the bootstrap wrapper that turns a cell's source text into
//! classifiable output entries.

use std::ffi::CString;
use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};

use crate::error::{Error, Result};
use crate::output::{self, CellOutput, RawValue};
use crate::paths::SessionDirs;

/// Source of the in-runtime bootstrap module.
const BOOTSTRAP_SOURCE: &str = include_str!("bootstrap.py");

/// Libraries preloaded into every session, in load order: numeric
/// computing, plotting, data tables, package installer. Individual
/// load failures are tolerated.
pub const PRELOAD_LIBRARIES: &[&str] = &["numpy", "matplotlib", "pandas", "pip"];

/// Configuration for creating an interpreter session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Parent directory for the session's `.pyrite` tree.
    /// Defaults to the current directory.
    pub root: Option<PathBuf>,

    /// Skip library preloading (faster startup for one-shot evaluation).
    pub skip_preload: bool,
}

impl SessionConfig {
    /// Session rooted at the given directory.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            skip_preload: false,
        }
    }
}

/// One initialized embedded-Python runtime.
///
/// Exclusively owned by the interpreter host (or a worker process); no
/// other component holds a direct reference to the runtime.
pub struct InterpreterSession {
    /// Persistent global namespace shared by every execution.
    globals: Py<PyDict>,

    /// Bootstrap `run_cell(source, globals)` wrapper.
    run_fn: Py<PyAny>,

    /// Bootstrap `install_package(name)` helper.
    install_fn: Py<PyAny>,

    /// Session directory layout (`workspace/`, `scratch/`).
    dirs: SessionDirs,

    /// Names of libraries that actually loaded during preload.
    preloaded: Vec<String>,
}

impl InterpreterSession {
    /// Initialize the embedded runtime, preload libraries, install the
    /// bootstrap wrapper, and create the session directories.
    ///
    /// Heavy and blocking; callers off the main thread should wrap this
    /// in `spawn_blocking`. `status` receives advisory progress strings
    /// for UI consumption and never gates correctness.
    pub fn initialize(config: &SessionConfig, status: impl Fn(&str)) -> Result<Self> {
        status("Loading Python runtime...");
        Python::initialize();

        let root = config
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let dirs = SessionDirs::from_session_dir(&root)?;

        let mut preloaded = Vec::new();
        let (globals, run_fn, install_fn) = Python::attach(|py| -> Result<_> {
            let globals = PyDict::new(py).unbind();

            if !config.skip_preload {
                for &library in PRELOAD_LIBRARIES {
                    status(&format!("Loading {library}..."));
                    match py.import(library) {
                        Ok(_) => preloaded.push(library.to_string()),
                        Err(err) => {
                            // Non-essential; execution continues without it.
                            tracing::warn!(library, error = %err, "preload failed");
                            status(&format!("Skipped {library} (load failed)"));
                        }
                    }
                }
            }

            status("Installing bootstrap...");
            let source = CString::new(BOOTSTRAP_SOURCE)
                .map_err(|e| Error::Init(format!("bootstrap source contains NUL: {e}")))?;
            let module = PyModule::from_code(
                py,
                source.as_c_str(),
                c"bootstrap.py",
                c"pyrite_bootstrap",
            )
            .map_err(|e| Error::Init(format!("bootstrap module failed to load: {e}")))?;

            // Force the non-interactive plotting backend before any cell runs.
            module
                .getattr("configure_plotting")
                .and_then(|f| f.call0().map(|_| ()))
                .map_err(|e| Error::Init(format!("plotting configuration failed: {e}")))?;

            let run_fn = module
                .getattr("run_cell")
                .map_err(|e| Error::Init(format!("bootstrap missing run_cell: {e}")))?
                .unbind();
            let install_fn = module
                .getattr("install_package")
                .map_err(|e| Error::Init(format!("bootstrap missing install_package: {e}")))?
                .unbind();

            Ok((globals, run_fn, install_fn))
        })?;

        Ok(Self {
            globals,
            run_fn,
            install_fn,
            dirs,
            preloaded,
        })
    }

    /// Run one cell's source text against the persistent namespace and
    /// return the raw wrapper value.
    ///
    /// The wrapper reports user-code failures as error entries in the
    /// returned value; an `Err` here means the bridge itself failed.
    pub fn execute(&self, source: &str) -> Result<RawValue> {
        Python::attach(|py| {
            let result = self
                .run_fn
                .bind(py)
                .call1((source, self.globals.bind(py)))?;
            Ok(output::extract_raw(py, &result))
        })
    }

    /// Run one cell and normalize the result.
    ///
    /// All failures surface as data: even a bridge-level error becomes
    /// an error record rather than propagating to the caller.
    pub fn execute_normalized(&self, source: &str) -> CellOutput {
        match self.execute(source) {
            Ok(raw) => output::normalize(raw),
            Err(err) => CellOutput::error(err.to_string()),
        }
    }

    /// Install a package by name through the in-runtime installer.
    ///
    /// Requires the installer library to be importable inside the
    /// runtime. Failure reports the package and underlying message;
    /// the session stays usable either way.
    pub fn install_package(&self, name: &str) -> Result<()> {
        Python::attach(|py| {
            self.install_fn
                .bind(py)
                .call1((name,))
                .map_err(|e| Error::Install {
                    package: name.to_string(),
                    message: e.to_string(),
                })?;
            Ok(())
        })
    }

    /// Session directory layout.
    pub fn dirs(&self) -> &SessionDirs {
        &self.dirs
    }

    /// Libraries that loaded successfully during preload.
    pub fn preloaded(&self) -> &[String] {
        &self.preloaded
    }
}
