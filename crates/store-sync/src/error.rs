use thiserror::Error;

use fingerprint_store::ContentHash;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("content {0} not found in artifact cache")]
    NotFound(ContentHash),

    #[error("no cache entry for lookup fingerprint {0}")]
    NoCacheEntry(ContentHash),

    #[error("partial retrieval failure: {missing} of {total} file(s) unavailable")]
    PartialRetrieval { missing: usize, total: usize },

    #[error("malformed store descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("store directory is not readable: {0}")]
    UnreadableStoreDir(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
