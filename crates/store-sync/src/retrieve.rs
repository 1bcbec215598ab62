//! Retrieve algorithm: resolve a lookup fingerprint to a
//! descriptor, pin every one of its associated content hashes (fail fast
//! if any is missing — a partial retrieval is a failure, not a partial
//! success), then materialize the files with bounded concurrency.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use fingerprint_store::ContentHash;

use crate::cache::ArtifactCache;
use crate::candidates::KeyCandidate;
use crate::descriptor::StoreDescriptor;
use crate::error::{Result, SyncError};
use crate::lookup::lookup_fingerprint;

pub struct RetrieveOutcome {
    pub file_count: usize,
    pub total_bytes: u64,
    pub key_used: String,
    pub provenance: Option<String>,
}

/// Retrieve using one specific, already-known key (no candidate fallback).
#[tracing::instrument(skip(cache), fields(%key))]
pub async fn retrieve_by_key(
    cache: &dyn ArtifactCache,
    target_dir: &Path,
    format_version: u32,
    lookup_version: u32,
    key: &str,
    fingerprint_salt: &str,
    concurrency: usize,
) -> Result<RetrieveOutcome> {
    let lookup_fp = lookup_fingerprint(format_version, lookup_version, key, fingerprint_salt);
    let entry = cache
        .resolve_entry(lookup_fp)
        .await?
        .ok_or(SyncError::NoCacheEntry(lookup_fp))?;

    let descriptor_bytes = cache.get_by_key(entry.descriptor_hash).await?;
    let descriptor: StoreDescriptor = serde_json::from_slice(&descriptor_bytes)
        .map_err(|e| SyncError::MalformedDescriptor(e.to_string()))?;

    pin_all(cache, &entry.associated_hashes).await?;

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total_bytes = Arc::new(std::sync::atomic::AtomicU64::new(0));

    stream::iter(descriptor.contents.iter())
        .map(|file| {
            let semaphore = semaphore.clone();
            let total_bytes = total_bytes.clone();
            let dest = target_dir.join(&file.key);
            let hash = file.content_hash;
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                cache.materialize(hash, &dest).await?;
                let size = tokio::fs::metadata(&dest).await?.len();
                total_bytes.fetch_add(size, std::sync::atomic::Ordering::Relaxed);
                Ok::<_, SyncError>(())
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<()>>>()?;

    tracing::info!(
        file_count = descriptor.contents.len(),
        %key,
        "retrieved fingerprint store"
    );

    Ok(RetrieveOutcome {
        file_count: descriptor.contents.len(),
        total_bytes: total_bytes.load(std::sync::atomic::Ordering::Relaxed),
        key_used: key.to_string(),
        provenance: None,
    })
}

async fn pin_all(cache: &dyn ArtifactCache, hashes: &[ContentHash]) -> Result<()> {
    let mut missing = 0usize;
    for hash in hashes {
        if !cache.contains(*hash).await? {
            missing += 1;
        }
    }
    if missing > 0 {
        return Err(SyncError::PartialRetrieval {
            missing,
            total: hashes.len(),
        });
    }
    Ok(())
}

/// Try each candidate key in order; the first whose full retrieval
/// succeeds wins and the rest are not attempted.
pub async fn retrieve_by_candidates(
    cache: &dyn ArtifactCache,
    target_dir: &Path,
    format_version: u32,
    lookup_version: u32,
    candidates: &[KeyCandidate],
    fingerprint_salt: &str,
    concurrency: usize,
) -> Result<RetrieveOutcome> {
    let mut last_err = None;
    for candidate in candidates {
        match retrieve_by_key(
            cache,
            target_dir,
            format_version,
            lookup_version,
            &candidate.key,
            fingerprint_salt,
            concurrency,
        )
        .await
        {
            Ok(mut outcome) => {
                outcome.provenance = Some(candidate.provenance.clone());
                return Ok(outcome);
            }
            Err(e) => {
                tracing::debug!(key = %candidate.key, error = %e, "candidate key did not retrieve");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(SyncError::NoCacheEntry(ContentHash::compute(&[b"no candidates"]))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FsArtifactCache;
    use crate::publish::{publish_store, PublishRequest};

    #[tokio::test]
    async fn publish_then_retrieve_round_trip_matches_file_set_and_hashes() {
        let store_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(store_dir.path().join("a.sst"), b"alpha").await.unwrap();
        tokio::fs::create_dir_all(store_dir.path().join("nested")).await.unwrap();
        tokio::fs::write(store_dir.path().join("nested/b.sst"), b"beta").await.unwrap();

        let cache_dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(cache_dir.path()).unwrap();

        publish_store(
            &cache,
            PublishRequest {
                store_dir: store_dir.path(),
                trace_info: serde_json::json!({}),
                friendly_name: "test".to_string(),
                format_version: 3,
                lookup_version: 1,
                key: "main",
                fingerprint_salt: "salt",
                concurrency: 8,
            },
        )
        .await
        .unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let outcome = retrieve_by_key(&cache, target_dir.path(), 3, 1, "main", "salt", 8)
            .await
            .unwrap();

        assert_eq!(outcome.file_count, 2);
        assert_eq!(
            tokio::fs::read(target_dir.path().join("a.sst")).await.unwrap(),
            b"alpha"
        );
        assert_eq!(
            tokio::fs::read(target_dir.path().join("nested/b.sst")).await.unwrap(),
            b"beta"
        );
    }

    #[tokio::test]
    async fn retrieve_with_unknown_key_is_no_cache_entry() {
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(cache_dir.path()).unwrap();
        let target_dir = tempfile::tempdir().unwrap();

        let err = retrieve_by_key(&cache, target_dir.path(), 3, 1, "nonexistent", "salt", 4)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoCacheEntry(_)));
    }

    #[tokio::test]
    async fn candidate_fallback_tries_keys_in_order_until_one_succeeds() {
        let store_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(store_dir.path().join("a.sst"), b"alpha").await.unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(cache_dir.path()).unwrap();

        publish_store(
            &cache,
            PublishRequest {
                store_dir: store_dir.path(),
                trace_info: serde_json::json!({}),
                friendly_name: "test".to_string(),
                format_version: 3,
                lookup_version: 1,
                key: "real-branch",
                fingerprint_salt: "salt",
                concurrency: 4,
            },
        )
        .await
        .unwrap();

        let candidates = vec![
            KeyCandidate {
                key: "missing-branch".to_string(),
                provenance: "BUILD_SOURCEBRANCH".to_string(),
            },
            KeyCandidate {
                key: "real-branch".to_string(),
                provenance: "SYSTEM_PULLREQUEST_SOURCEBRANCH".to_string(),
            },
        ];

        let target_dir = tempfile::tempdir().unwrap();
        let outcome = retrieve_by_candidates(&cache, target_dir.path(), 3, 1, &candidates, "salt", 4)
            .await
            .unwrap();

        assert_eq!(outcome.key_used, "real-branch");
        assert_eq!(outcome.provenance.as_deref(), Some("SYSTEM_PULLREQUEST_SOURCEBRANCH"));
    }
}
