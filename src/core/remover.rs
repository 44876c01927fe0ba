use std::path::{Path, PathBuf};
use tracing::info;

use super::prompt::{confirm_exact, Prompter};
use crate::config::{absolutize, clear_project_override_if_under, ConfigStore};
use crate::error::{PynstalError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Cancelled,
    Removed {
        unregistered: Vec<PathBuf>,
        default_interpreter: Option<PathBuf>,
        project_cleared: bool,
    },
}

/// Deletes a virtual environment and drops every reference to it
pub struct VenvRemover<'a> {
    store: &'a ConfigStore,
    cwd: &'a Path,
}

impl<'a> VenvRemover<'a> {
    pub fn new(store: &'a ConfigStore, cwd: &'a Path) -> Self {
        Self { store, cwd }
    }

    /// Requires the user to type `yes`. A failed delete leaves the registry untouched.
    pub fn remove(&self, venv_dir: &Path, prompter: &mut dyn Prompter) -> Result<Removal> {
        let target = absolutize(venv_dir, self.cwd);
        if !target.is_dir() {
            return Err(PynstalError::Validation(format!(
                "Virtual environment not found: {}",
                target.display()
            )));
        }

        let question = format!(
            "This will permanently delete {}. Type 'yes' to confirm: ",
            target.display()
        );
        if !confirm_exact(prompter, &question, "yes") {
            return Ok(Removal::Cancelled);
        }

        let mut registry = self.store.load_global()?;

        std::fs::remove_dir_all(&target).map_err(|e| {
            PynstalError::Execution(format!("Failed to delete {}: {}", target.display(), e))
        })?;
        info!("Deleted {}", target.display());

        // The default may point into the venv without being registered
        let before = registry.clone();
        let unregistered = registry.remove_under(&target, self.cwd);
        if registry != before {
            self.store.save_global(&registry)?;
        }
        let project_cleared = clear_project_override_if_under(&target, self.cwd)?;

        Ok(Removal::Removed {
            unregistered,
            default_interpreter: registry.default_interpreter,
            project_cleared,
        })
    }
}
