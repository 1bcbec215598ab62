use std::path::PathBuf;

use thiserror::Error;

/// Errors from the embedded KV store adapter.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("store at {path:?} could not be opened and was moved aside: {source}")]
    Corrupt { path: PathBuf, source: String },

    #[error("column family not found: {0}")]
    MissingColumnFamily(String),

    #[error("store is read-only")]
    ReadOnly,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
