use thiserror::Error;

/// Error taxonomy for the typed fingerprint store (OpenFailure,
/// IOFailure, DeserializeFailure kinds scoped to this crate).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store format version {found} is incompatible with {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Kv(#[from] fp_kv::KvError),

    #[error("malformed stored json for key {key}: {source}")]
    Deserialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
