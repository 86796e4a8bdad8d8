//! Session directory management.
//!
//! Provides a consistent directory structure for Pyrite sessions,
//! ensuring the interpreter and the CLI agree on the same paths.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Directory structure for a Pyrite session.
///
/// All Pyrite-related files are stored under a `.pyrite` directory
/// next to the notebook file:
///
/// ```text
/// notebook.json
/// .pyrite/
/// ├── workspace/  # Mountable working directory for executed code
/// └── scratch/    # Scratch space and generated artifacts (plots, files)
/// ```
///
/// Both directories exist before the first execution.
#[derive(Debug, Clone)]
pub struct SessionDirs {
    /// The `.pyrite` directory itself.
    pub pyrite_dir: PathBuf,

    /// Working directory for executed code.
    pub workspace_dir: PathBuf,

    /// Scratch space for generated artifacts.
    pub scratch_dir: PathBuf,
}

impl SessionDirs {
    /// Create directory structure from a notebook path.
    ///
    /// Creates all necessary directories if they don't exist.
    pub fn from_notebook_path(notebook_path: &Path) -> Result<Self> {
        let notebook_dir = notebook_path.parent().unwrap_or(Path::new("."));
        Self::from_session_dir(notebook_dir)
    }

    /// Create directory structure under the given parent directory.
    ///
    /// Creates all necessary directories if they don't exist.
    pub fn from_session_dir(session_dir: &Path) -> Result<Self> {
        let pyrite_dir = session_dir.join(".pyrite");
        let workspace_dir = pyrite_dir.join("workspace");
        let scratch_dir = pyrite_dir.join("scratch");

        fs::create_dir_all(&workspace_dir)?;
        fs::create_dir_all(&scratch_dir)?;

        Ok(Self {
            pyrite_dir,
            workspace_dir,
            scratch_dir,
        })
    }

    /// Clean all session artifacts.
    ///
    /// Removes the entire `.pyrite` directory and recreates it.
    pub fn clean(&self) -> Result<()> {
        if self.pyrite_dir.exists() {
            fs::remove_dir_all(&self.pyrite_dir)?;
        }

        fs::create_dir_all(&self.workspace_dir)?;
        fs::create_dir_all(&self.scratch_dir)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_notebook_path() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let notebook_path = temp.path().join("test.json");

        let dirs =
            SessionDirs::from_notebook_path(&notebook_path).expect("Failed to create dirs");

        assert!(dirs.pyrite_dir.ends_with(".pyrite"));
        assert!(dirs.workspace_dir.exists());
        assert!(dirs.scratch_dir.exists());
    }

    #[test]
    fn test_clean() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs =
            SessionDirs::from_session_dir(temp.path()).expect("Failed to create dirs");

        let test_file = dirs.scratch_dir.join("figure.png");
        fs::write(&test_file, "png").expect("Failed to write test file");
        assert!(test_file.exists());

        dirs.clean().expect("Failed to clean");
        assert!(!test_file.exists());

        // But directories should be recreated
        assert!(dirs.workspace_dir.exists());
        assert!(dirs.scratch_dir.exists());
    }
}
