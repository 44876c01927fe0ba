use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod cli;
mod config;
mod core;
mod error;

use cli::Cli;
use error::PynstalError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    debug!("Starting pynstal v{}", env!("CARGO_PKG_VERSION"));

    // Execute the requested command
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<PynstalError>()
                .map(PynstalError::exit_code)
                .unwrap_or(1);
            eprintln!("Error: {:#}", err);
            ExitCode::from(code)
        }
    }
}
