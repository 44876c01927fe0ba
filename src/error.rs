use std::path::PathBuf;

use thiserror::Error;

/// Main error type for pynstal operations
#[derive(Error, Debug)]
pub enum PynstalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Template '{0}' already exists")]
    TemplateExists(String),

    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Index {index} is out of range for template '{template}' ({len} entries)")]
    IndexOutOfRange {
        template: String,
        index: usize,
        len: usize,
    },

    #[error("No interpreter specified and no interpreter configured")]
    NoInterpreter,

    #[error("Interpreter not found: {}", .0.display())]
    InterpreterNotFound(PathBuf),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl PynstalError {
    /// Process exit code for this error: 2 for validation problems, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            PynstalError::TemplateExists(_)
            | PynstalError::TemplateNotFound(_)
            | PynstalError::IndexOutOfRange { .. }
            | PynstalError::NoInterpreter
            | PynstalError::InterpreterNotFound(_)
            | PynstalError::Validation(_) => 2,
            PynstalError::Config(_)
            | PynstalError::Io(_)
            | PynstalError::Serialization(_)
            | PynstalError::Execution(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PynstalError>;
