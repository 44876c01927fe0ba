use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use anyhow::{Context, Result};

use crate::config::ConfigStore;
use crate::core::Engine;

#[derive(Parser)]
#[command(name = "pynstal")]
#[command(about = "Manage Python interpreters, virtual environments and package templates")]
#[command(version)]
pub struct Cli {
    /// Directory holding interpreters.json and templates.json
    #[arg(long, env = "PYNSTAL_HOME", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that runs an interpreter
#[derive(Args, Debug)]
pub struct RunOpts {
    /// Interpreter path to use (overrides project and global defaults)
    #[arg(long)]
    pub interpreter: Option<PathBuf>,

    /// Dry run - show the commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an interpreter path
    AddInterpreter {
        path: PathBuf,
    },

    /// Set the default interpreter (interactive when no path is given)
    SetDefaultInterpreter {
        path: Option<PathBuf>,

        /// Store the default for the current directory only
        #[arg(long)]
        project: bool,
    },

    /// List registered interpreters and defaults
    List,

    /// Manage interpreters
    #[command(subcommand)]
    Interpreter(InterpreterCommands),

    /// Create a virtual environment
    CreateVenv {
        venv_dir: PathBuf,

        #[command(flatten)]
        run: RunOpts,

        /// Do not offer to open an activated subshell afterwards
        #[arg(long)]
        no_activate: bool,
    },

    /// Delete a virtual environment and forget its interpreter
    RemoveVenv {
        venv_dir: PathBuf,
    },

    /// Create a virtual environment and install a template into it
    CreateFromTemplate {
        template: String,
        venv_dir: PathBuf,

        #[command(flatten)]
        run: RunOpts,

        /// Do not offer to open an activated subshell afterwards
        #[arg(long)]
        no_activate: bool,
    },

    /// Install a template into an existing interpreter
    Install {
        template: String,

        #[command(flatten)]
        run: RunOpts,
    },

    /// Manage templates
    #[command(subcommand)]
    Template(TemplateCommands),
}

#[derive(Subcommand)]
pub enum InterpreterCommands {
    /// List registered interpreters and defaults
    List,

    /// Auto-detect Python installations on this system
    Detect {
        /// Interactively select interpreters to add
        #[arg(long, conflicts_with = "add_all")]
        add: bool,

        /// Add every detected interpreter without confirmation
        #[arg(long)]
        add_all: bool,
    },

    /// Register an interpreter path
    Add {
        path: PathBuf,
    },

    /// Forget a registered interpreter (interactive when no path is given)
    Remove {
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List all templates
    List,

    /// Add a new template
    Add {
        name: String,

        /// Package names (a quoted, space-separated list also works)
        #[arg(required = true)]
        packages: Vec<String>,

        /// Extra pip install flags, e.g. "--index-url https://..."
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,
    },

    /// Remove a template
    Remove {
        name: String,
    },

    /// Show template details
    Show {
        name: String,
    },

    /// Append packages to a template
    AddPkg {
        name: String,

        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Append packages installed with extra pip flags
    AddPkgComplex {
        name: String,

        #[arg(required = true)]
        packages: Vec<String>,

        /// Extra pip install flags, e.g. "--index-url https://..."
        #[arg(long, required = true, allow_hyphen_values = true)]
        args: String,
    },

    /// Remove the entry at a position shown by `template show`
    RemovePkg {
        name: String,
        index: usize,
    },
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        let config_dir = match self.config_dir {
            Some(dir) => dir,
            None => ConfigStore::default_dir()?,
        };
        let cwd = std::env::current_dir().context("Cannot determine the working directory")?;
        let mut engine = Engine::new(config_dir, cwd)?;

        match self.command {
            Commands::AddInterpreter { path } => engine.add_interpreter(&path),
            Commands::SetDefaultInterpreter { path, project } => {
                engine.set_default_interpreter(path.as_deref(), project)
            }
            Commands::List => engine.list(),
            Commands::Interpreter(command) => match command {
                InterpreterCommands::List => engine.list(),
                InterpreterCommands::Detect { add, add_all } => {
                    engine.detect_interpreters(add, add_all)
                }
                InterpreterCommands::Add { path } => engine.add_interpreter(&path),
                InterpreterCommands::Remove { path } => engine.remove_interpreter(path.as_deref()),
            },
            Commands::CreateVenv { venv_dir, run, no_activate } => engine.create_venv(
                &venv_dir,
                run.interpreter.as_deref(),
                run.dry_run,
                !no_activate,
            ),
            Commands::RemoveVenv { venv_dir } => engine.remove_venv(&venv_dir),
            Commands::CreateFromTemplate { template, venv_dir, run, no_activate } => engine
                .create_from_template(
                    &template,
                    &venv_dir,
                    run.interpreter.as_deref(),
                    run.dry_run,
                    !no_activate,
                ),
            Commands::Install { template, run } => {
                engine.install(&template, run.interpreter.as_deref(), run.dry_run)
            }
            Commands::Template(command) => match command {
                TemplateCommands::List => engine.template_list(),
                TemplateCommands::Add { name, packages, args } => {
                    engine.template_add(&name, &packages, args.as_deref())
                }
                TemplateCommands::Remove { name } => engine.template_remove(&name),
                TemplateCommands::Show { name } => engine.template_show(&name),
                TemplateCommands::AddPkg { name, packages } => {
                    engine.template_add_packages(&name, &packages, None)
                }
                TemplateCommands::AddPkgComplex { name, packages, args } => {
                    engine.template_add_packages(&name, &packages, Some(&args))
                }
                TemplateCommands::RemovePkg { name, index } => {
                    engine.template_remove_package(&name, index)
                }
            },
        }
    }
}
