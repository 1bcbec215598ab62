use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("fingerprint store lookup failed: {0}")]
    Store(#[from] fingerprint_store::StoreError),

    #[error("tree diff failed: {0}")]
    Tree(#[from] fp_tree::TreeError),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
