use std::path::PathBuf;
use thiserror::Error;

/// Main error type for codegraft operations
#[derive(Error, Debug)]
pub enum GraftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed change-set: {0}")]
    MalformedChangeSet(String),

    #[error("Source file {path} is unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    #[error("File system error: {0}")]
    FileSystem(String),
}

pub type Result<T> = std::result::Result<T, GraftError>;
