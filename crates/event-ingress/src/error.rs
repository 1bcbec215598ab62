use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("truncated event frame: expected {expected} more bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("malformed event payload: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngressError>;
