use std::path::Path;
use tracing::{debug, info};

use super::process::{CommandLine, CommandResult, CommandRunner};
use super::templates::PackageSpec;

/// Installs template entries with `<interpreter> -m pip install`
pub struct PackageInstaller<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    pub fn command_for(interpreter: &Path, entry: &PackageSpec) -> CommandLine {
        let mut args: Vec<String> = vec!["-m".into(), "pip".into(), "install".into()];
        args.extend(entry.packages().iter().cloned());
        args.extend(entry.args().iter().cloned());
        CommandLine::new(interpreter, args)
    }

    /// Run one pip invocation per entry, in order, stopping at the first failure.
    ///
    /// Packages installed by earlier entries stay installed when a later one fails.
    pub fn install(
        &self,
        interpreter: &Path,
        entries: &[PackageSpec],
        dry_run: bool,
        sink: &mut dyn FnMut(&str),
    ) -> CommandResult {
        let mut outputs = Vec::new();

        if dry_run {
            for entry in entries {
                let command = Self::command_for(interpreter, entry);
                outputs.push(format!("DRY RUN: would run: {}", command));
            }
            return CommandResult::ok(outputs.join("\n"));
        }

        if !interpreter.exists() {
            return CommandResult::failed(
                String::new(),
                format!("Interpreter executable not found: {}", interpreter.display()),
            );
        }

        for (i, entry) in entries.iter().enumerate() {
            let command = Self::command_for(interpreter, entry);
            info!("Installing entry {}/{}: {}", i + 1, entries.len(), entry);
            sink(&format!("Running command: {}", command));

            let result = self.runner.run(&command, sink);
            outputs.push(result.stdout);
            if !result.success {
                debug!("Aborting install after failed entry {}", i + 1);
                return CommandResult::failed(
                    outputs.join("\n"),
                    format!("Failed installing {}: {}", entry, result.error),
                );
            }
        }

        CommandResult::ok(outputs.join("\n"))
    }
}
