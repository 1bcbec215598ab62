//! A [`FingerprintSession`] that answers every lookup with "not found" —
//! the old side of the comparison when no prior store was retrieved at
//! all (first build on a branch, or C6 retrieval failed).

use async_trait::async_trait;
use cache_miss_analyzer::FingerprintSession;
use fingerprint_store::{ContentHash, FingerprintStoreEntry, PipId};

pub struct NullSession;

#[async_trait]
impl FingerprintSession for NullSession {
    async fn try_get_entry(
        &self,
        _pip_unique_output_hash: Option<ContentHash>,
        _formatted_semi_stable_hash: &str,
    ) -> cache_miss_analyzer::Result<Option<FingerprintStoreEntry>> {
        Ok(None)
    }

    async fn try_get_content_hash_value(
        &self,
        _hash_hex: &str,
    ) -> cache_miss_analyzer::Result<Option<serde_json::Value>> {
        Ok(None)
    }

    async fn write_pip_line(&self, _pip_id: PipId, _line: &str) {}
}
