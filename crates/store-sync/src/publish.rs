//! Publish algorithm: upload every file under a store
//! directory into the artifact cache with bounded concurrency, build and
//! store a descriptor, then publish a lookup-fingerprint-keyed cache
//! entry pointing at it.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use fingerprint_store::ContentHash;

use crate::cache::{ArtifactCache, CacheEntry};
use crate::descriptor::{DescriptorFileEntry, StoreDescriptor};
use crate::error::Result;
use crate::lookup::lookup_fingerprint;
use crate::walk::walk_files;

pub struct PublishOutcome {
    pub published: bool,
    pub file_count: usize,
    pub total_bytes: u64,
    pub lookup_fingerprint: ContentHash,
}

pub struct PublishRequest<'a> {
    pub store_dir: &'a Path,
    pub trace_info: serde_json::Value,
    pub friendly_name: String,
    pub format_version: u32,
    pub lookup_version: u32,
    pub key: &'a str,
    pub fingerprint_salt: &'a str,
    pub concurrency: usize,
}

#[tracing::instrument(skip(cache, request), fields(key = %request.key))]
pub async fn publish_store(cache: &dyn ArtifactCache, request: PublishRequest<'_>) -> Result<PublishOutcome> {
    let lookup_fp = lookup_fingerprint(
        request.format_version,
        request.lookup_version,
        request.key,
        request.fingerprint_salt,
    );

    let files = walk_files(request.store_dir).await?;
    if files.is_empty() {
        tracing::info!("store directory is empty, skipping publish");
        return Ok(PublishOutcome {
            published: false,
            file_count: 0,
            total_bytes: 0,
            lookup_fingerprint: lookup_fp,
        });
    }

    let semaphore = Arc::new(Semaphore::new(request.concurrency.max(1)));
    let total_bytes = Arc::new(std::sync::atomic::AtomicU64::new(0));

    let contents: Vec<DescriptorFileEntry> = stream::iter(files.into_iter())
        .map(|file| {
            let semaphore = semaphore.clone();
            let total_bytes = total_bytes.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let bytes = tokio::fs::read(&file.absolute).await?;
                total_bytes.fetch_add(bytes.len() as u64, std::sync::atomic::Ordering::Relaxed);
                let hash = cache.put(bytes).await?;
                Ok::<_, crate::error::SyncError>(DescriptorFileEntry {
                    key: file.relative,
                    content_hash: hash,
                })
            }
        })
        .buffer_unordered(request.concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    let file_count = contents.len();
    let associated_hashes: Vec<ContentHash> = contents.iter().map(|c| c.content_hash).collect();

    let descriptor = StoreDescriptor {
        trace_info: request.trace_info,
        friendly_name: request.friendly_name,
        contents,
    };
    let descriptor_bytes = serde_json::to_vec(&descriptor)?;
    let descriptor_hash = cache.put(descriptor_bytes).await?;

    cache
        .publish_entry(
            lookup_fp,
            CacheEntry {
                descriptor_hash,
                associated_hashes,
            },
        )
        .await?;

    let total_bytes = total_bytes.load(std::sync::atomic::Ordering::Relaxed);
    tracing::info!(file_count, total_bytes, "published fingerprint store");

    Ok(PublishOutcome {
        published: true,
        file_count,
        total_bytes,
        lookup_fingerprint: lookup_fp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FsArtifactCache;

    #[tokio::test]
    async fn publishing_an_empty_directory_skips_with_success() {
        let store_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(cache_dir.path()).unwrap();

        let outcome = publish_store(
            &cache,
            PublishRequest {
                store_dir: store_dir.path(),
                trace_info: serde_json::json!({}),
                friendly_name: "test".to_string(),
                format_version: 3,
                lookup_version: 1,
                key: "main",
                fingerprint_salt: "salt",
                concurrency: 4,
            },
        )
        .await
        .unwrap();

        assert!(!outcome.published);
        assert_eq!(outcome.file_count, 0);
    }

    #[tokio::test]
    async fn publishing_a_populated_directory_records_all_files() {
        let store_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(store_dir.path().join("a.sst"), b"aaa").await.unwrap();
        tokio::fs::write(store_dir.path().join("b.sst"), b"bbbbb").await.unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(cache_dir.path()).unwrap();

        let outcome = publish_store(
            &cache,
            PublishRequest {
                store_dir: store_dir.path(),
                trace_info: serde_json::json!({"build": 1}),
                friendly_name: "test".to_string(),
                format_version: 3,
                lookup_version: 1,
                key: "main",
                fingerprint_salt: "salt",
                concurrency: 4,
            },
        )
        .await
        .unwrap();

        assert!(outcome.published);
        assert_eq!(outcome.file_count, 2);
        assert_eq!(outcome.total_bytes, 8);

        let entry = cache.resolve_entry(outcome.lookup_fingerprint).await.unwrap().unwrap();
        assert_eq!(entry.associated_hashes.len(), 2);
    }
}
