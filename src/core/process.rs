use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::config::absolutize;

/// Outcome of a subprocess-invoking operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    /// Non-empty only on failure
    pub error: String,
}

impl CommandResult {
    pub fn ok(stdout: String) -> Self {
        Self {
            success: true,
            stdout,
            error: String::new(),
        }
    }

    pub fn failed(stdout: String, error: String) -> Self {
        Self {
            success: false,
            stdout,
            error,
        }
    }
}

/// Program plus arguments, kept apart so nothing goes through a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs a command to completion, handing each line of combined stdout/stderr to `sink`.
pub trait CommandRunner {
    fn run(&self, command: &CommandLine, sink: &mut dyn FnMut(&str)) -> CommandResult;
}

/// Runner spawning real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandLine, sink: &mut dyn FnMut(&str)) -> CommandResult {
        debug!("Spawning: {}", command);

        // Both streams share one pipe so lines arrive in the order the child wrote them
        let spawned = std::io::pipe().and_then(|(reader, writer)| {
            let child = Command::new(&command.program)
                .args(&command.args)
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer)
                .spawn()?;
            Ok((child, reader))
        });

        let (mut child, reader) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                return CommandResult::failed(
                    String::new(),
                    format!("Failed to run {}: {}", command.program.display(), e),
                )
            }
        };

        let mut lines = Vec::new();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    sink(line);
                    lines.push(line.to_string());
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return CommandResult::failed(lines.join("\n"), e.to_string());
                }
            }
        }

        let stdout = lines.join("\n");
        match child.wait() {
            Ok(status) if status.success() => CommandResult::ok(stdout),
            Ok(status) => CommandResult::failed(stdout, format!("Command exited with {}", status)),
            Err(e) => CommandResult::failed(stdout, e.to_string()),
        }
    }
}

/// Turn a user-supplied interpreter into the program to execute.
///
/// Bare names are looked up on `PATH`; anything with a directory part is
/// made absolute against `cwd`.
pub fn resolve_program(program: &Path, cwd: &Path) -> PathBuf {
    if program.is_absolute() {
        return program.to_path_buf();
    }
    if program.components().count() == 1 {
        if let Some(found) = find_on_path(&program.to_string_lossy()) {
            return found;
        }
    }
    absolutize(program, cwd)
}

/// First executable file called `name` on `PATH`
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", name));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_display() {
        let cmd = CommandLine::new(
            "/usr/bin/python3",
            vec!["-m".into(), "pip".into(), "install".into(), "numpy".into()],
        );
        assert_eq!(cmd.to_string(), "/usr/bin/python3 -m pip install numpy");
    }

    #[test]
    fn test_resolve_program_relative_path() {
        let cwd = Path::new("/work");
        assert_eq!(
            resolve_program(Path::new("./venv/bin/python"), cwd),
            PathBuf::from("/work/venv/bin/python")
        );
        assert_eq!(
            resolve_program(Path::new("/usr/bin/python3"), cwd),
            PathBuf::from("/usr/bin/python3")
        );
    }

    #[test]
    fn test_missing_program_is_a_failed_result() {
        let cmd = CommandLine::new("/definitely/not/here/python", vec!["--version".into()]);
        let result = SystemRunner.run(&cmd, &mut |_| {});
        assert!(!result.success);
        assert!(result.error.contains("/definitely/not/here/python"));
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_stdout_and_stderr_lines() {
        let cmd = CommandLine::new(
            "/bin/sh",
            vec!["-c".into(), "echo one; echo two 1>&2; exit 3".into()],
        );
        let mut seen = Vec::new();
        let result = SystemRunner.run(&cmd, &mut |line| seen.push(line.to_string()));

        assert!(!result.success);
        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(result.stdout, "one\ntwo");
        assert!(result.error.contains("exited"));
    }
}
