use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("drop '{drop_name}' has {count} duplicate-hash conflict(s); file list not generated")]
    DuplicateConflict { drop_name: String, count: usize },
}

pub type Result<T> = std::result::Result<T, ManifestError>;
