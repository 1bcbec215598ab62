use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fingerprint_store::{ContentHash, FingerprintStoreEntry, PipId, Store};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// One side (old or new) of a fingerprint-diff comparison: a fingerprint
/// store view plus the per-pip text log the analyzer narrates its findings
/// into while the session is in scope.
///
/// Implementors own their own lifetime — the caller opens one, runs the
/// analysis, and drops it; there is no `open`/`close` pair on the trait
/// itself.
#[async_trait]
pub trait FingerprintSession: Send + Sync {
    async fn try_get_entry(
        &self,
        pip_unique_output_hash: Option<ContentHash>,
        formatted_semi_stable_hash: &str,
    ) -> Result<Option<FingerprintStoreEntry>>;

    async fn try_get_content_hash_value(&self, hash_hex: &str) -> Result<Option<serde_json::Value>>;

    /// Append one line to this pip's human-readable diagnostic log. Best
    /// effort: a write failure here must not surface as an analysis error.
    async fn write_pip_line(&self, pip_id: PipId, line: &str);
}

/// [`FingerprintSession`] backed by a real [`fingerprint_store::Store`],
/// narrating to one text file per pip under `log_dir`.
pub struct StoreSession {
    store: Arc<Store>,
    log_dir: PathBuf,
}

impl StoreSession {
    pub fn new(store: Arc<Store>, log_dir: PathBuf) -> Self {
        Self { store, log_dir }
    }
}

#[async_trait]
impl FingerprintSession for StoreSession {
    async fn try_get_entry(
        &self,
        pip_unique_output_hash: Option<ContentHash>,
        formatted_semi_stable_hash: &str,
    ) -> Result<Option<FingerprintStoreEntry>> {
        Ok(self
            .store
            .try_get_fingerprint_store_entry(pip_unique_output_hash, formatted_semi_stable_hash)
            .await?)
    }

    async fn try_get_content_hash_value(&self, hash_hex: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.store.try_get_content_hash_value(hash_hex).await?)
    }

    async fn write_pip_line(&self, pip_id: PipId, line: &str) {
        if let Err(err) = write_pip_line(&self.log_dir, pip_id, line).await {
            tracing::warn!(%pip_id, error = %err, "failed to write cache-miss diagnostic line");
        }
    }
}

async fn write_pip_line(log_dir: &std::path::Path, pip_id: PipId, line: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(log_dir).await?;
    let path = log_dir.join(format!("{}.log", pip_id.0));
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await
}
