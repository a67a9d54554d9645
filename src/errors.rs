use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for schema, persistence, and input failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid column '{0}'")]
    InvalidColumn(String),
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },
    #[error("inconsistent column lengths: {details}")]
    InconsistentLengths { details: String },
    #[error("feature store already exists at {}", .0.display())]
    StoreExists(PathBuf),
    #[error("feature store not found at {}", .0.display())]
    StoreMissing(PathBuf),
    #[error("feature store at {} is sealed", .0.display())]
    Sealed(PathBuf),
    #[error("corrupt feature store: {0}")]
    Corrupt(String),
    #[error("input error: {0}")]
    Input(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
