use std::path::PathBuf;

use thiserror::Error;

/// Errors that callers are expected to match on.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),
    #[error("path is not a directory: {0}")]
    PathNotADirectory(PathBuf),
    #[error("no known date pattern in filename: {0}")]
    UnrecognizedFilenameFormat(String),
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
    #[error("operation cancelled")]
    Cancelled,
}

/// Failure of an external command-line tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {diagnostic}")]
    Failed {
        tool: &'static str,
        status: String,
        diagnostic: String,
    },
    #[error("unexpected {tool} output: {message}")]
    Output { tool: &'static str, message: String },
}

impl ToolError {
    /// Diagnostic text surfaced by the tool, if any.
    pub fn diagnostic(&self) -> &str {
        match self {
            ToolError::Failed { diagnostic, .. } => diagnostic,
            ToolError::Output { message, .. } => message,
            ToolError::Spawn { .. } => "",
        }
    }
}
