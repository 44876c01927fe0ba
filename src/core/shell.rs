use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use super::builder::venv_bin_dir;

/// Shell used for the activation subshell: `PYNSTAL_SHELL`, then `SHELL`, then bash
pub fn shell_program() -> PathBuf {
    pick_shell(std::env::var_os("PYNSTAL_SHELL"), std::env::var_os("SHELL"))
}

fn pick_shell(preferred: Option<OsString>, login: Option<OsString>) -> PathBuf {
    let set = |value: Option<OsString>| value.filter(|v| !v.is_empty());
    set(preferred)
        .or_else(|| set(login))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/bin/bash"))
}

/// `PATH` with the environment's executables in front
pub fn activated_path(venv_dir: &Path, current: Option<OsString>) -> OsString {
    let mut dirs = vec![venv_bin_dir(venv_dir)];
    if let Some(current) = current {
        dirs.extend(std::env::split_paths(&current));
    }
    std::env::join_paths(dirs).unwrap_or_else(|_| venv_bin_dir(venv_dir).into_os_string())
}

/// Start an interactive shell with the environment activated and wait for it to exit.
pub fn spawn_activated_shell(venv_dir: &Path) {
    if cfg!(windows) {
        println!(
            "To activate, run: {}",
            venv_bin_dir(venv_dir).join("activate.bat").display()
        );
        return;
    }

    let shell = shell_program();
    info!("Launching {} with {} activated", shell.display(), venv_dir.display());
    println!(
        "Launching interactive shell ({}) with venv activated. Exit to return.",
        shell.display()
    );

    let status = Command::new(&shell)
        .arg("-i")
        .env("VIRTUAL_ENV", venv_dir)
        .env("PATH", activated_path(venv_dir, std::env::var_os("PATH")))
        .status();
    if let Err(e) = status {
        warn!("Could not start {}: {}", shell.display(), e);
    }
}
