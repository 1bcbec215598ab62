use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("malformed fingerprint json: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TreeError>;
