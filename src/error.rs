use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArchiveError {
    #[error("input file does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("failed to read table {path}: {message}")]
    TableRead { path: PathBuf, message: String },

    #[error("malformed table {path}: {message}")]
    TableParse { path: PathBuf, message: String },

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("row {row}: empty required field '{column}'")]
    EmptyField { row: usize, column: String },

    #[error("invalid column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("authentication request failed: {0}")]
    AuthHttp(String),

    #[error("authentication returned status {status}: {message}")]
    AuthStatus { status: u16, message: String },

    #[error("registry request failed: {0}")]
    RegistryHttp(String),

    #[error("workflow runner failed: {0}")]
    Runner(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
