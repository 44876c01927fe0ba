use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::process::{CommandLine, CommandResult, CommandRunner};
use crate::config::{absolutize, set_project_default_interpreter, ConfigStore};

/// Interpreter inside a virtual environment, at the platform's conventional location
pub fn venv_python(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

/// Directory holding the environment's executables
pub fn venv_bin_dir(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts")
    } else {
        venv_dir.join("bin")
    }
}

/// Creates virtual environments with `<interpreter> -m venv` and registers them
pub struct EnvironmentBuilder<'a> {
    runner: &'a dyn CommandRunner,
    store: &'a ConfigStore,
    cwd: &'a Path,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(runner: &'a dyn CommandRunner, store: &'a ConfigStore, cwd: &'a Path) -> Self {
        Self { runner, store, cwd }
    }

    pub fn command_for(&self, interpreter: &Path, venv_dir: &Path) -> CommandLine {
        CommandLine::new(
            interpreter,
            vec![
                "-m".into(),
                "venv".into(),
                absolutize(venv_dir, self.cwd).display().to_string(),
            ],
        )
    }

    /// Create the environment. On a real success its interpreter is registered
    /// globally and becomes the project default; the global default is left alone.
    pub fn create(
        &self,
        interpreter: &Path,
        venv_dir: &Path,
        dry_run: bool,
        sink: &mut dyn FnMut(&str),
    ) -> CommandResult {
        let command = self.command_for(interpreter, venv_dir);

        if dry_run {
            return CommandResult::ok(format!("DRY RUN: would run: {}", command));
        }

        if !interpreter.exists() {
            return CommandResult::failed(
                String::new(),
                format!("Interpreter executable not found: {}", interpreter.display()),
            );
        }

        sink(&format!("Running command: {}", command));
        let result = self.runner.run(&command, sink);
        if result.success {
            self.register(venv_dir);
        }
        result
    }

    fn register(&self, venv_dir: &Path) {
        let python = absolutize(&venv_python(venv_dir), self.cwd);
        if !python.exists() {
            warn!("No interpreter found at {}; not registering", python.display());
            return;
        }

        let registered = self.store.load_global().and_then(|mut registry| {
            if registry.insert_front(python.clone()) {
                self.store.save_global(&registry)?;
            }
            Ok(())
        });
        if let Err(e) = registered {
            warn!("Could not register {}: {}", python.display(), e);
        }

        match set_project_default_interpreter(&python, self.cwd) {
            Ok(()) => info!(
                "Configured project default interpreter for {}: {}",
                self.cwd.display(),
                python.display()
            ),
            Err(e) => warn!("Could not update project default interpreter: {}", e),
        }
    }
}
