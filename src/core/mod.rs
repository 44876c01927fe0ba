mod builder;
mod detect;
mod engine;
mod installer;
mod process;
mod prompt;
mod remover;
mod resolver;
mod shell;
mod templates;

pub use builder::{venv_python, EnvironmentBuilder};
pub use detect::{current_runtime, detect, SearchRoots};
pub use installer::PackageInstaller;
pub use process::{resolve_program, CommandRunner, SystemRunner};
pub use prompt::{choose_many, choose_one, confirm, Choice, Prompter, TerminalPrompter};
pub use remover::{Removal, VenvRemover};
pub use resolver::InterpreterResolver;
pub use shell::spawn_activated_shell;
pub use templates::{PackageSpec, TemplateRegistry, TemplateStore};

// Export the main engine
pub use engine::Engine;
