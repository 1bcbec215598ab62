//! In-memory `ArtifactCache` for tests in other crates (`runtime-analyzer`)
//! that need to publish/retrieve without touching a filesystem.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use fingerprint_store::ContentHash;

use crate::cache::{ArtifactCache, CacheEntry};
use crate::error::{Result, SyncError};

#[derive(Default)]
pub struct MemoryArtifactCache {
    blobs: Mutex<HashMap<ContentHash, Vec<u8>>>,
    entries: Mutex<HashMap<ContentHash, CacheEntry>>,
}

impl MemoryArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactCache for MemoryArtifactCache {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentHash> {
        let hash = ContentHash::compute(&[&bytes]);
        self.blobs.lock().unwrap().entry(hash).or_insert(bytes);
        Ok(hash)
    }

    async fn get_by_key(&self, hash: ContentHash) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or(SyncError::NotFound(hash))
    }

    async fn contains(&self, hash: ContentHash) -> Result<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(&hash))
    }

    async fn materialize(&self, hash: ContentHash, dest: &Path) -> Result<()> {
        let bytes = self.get_by_key(hash).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    async fn publish_entry(&self, lookup_fingerprint: ContentHash, entry: CacheEntry) -> Result<()> {
        self.entries.lock().unwrap().insert(lookup_fingerprint, entry);
        Ok(())
    }

    async fn resolve_entry(&self, lookup_fingerprint: ContentHash) -> Result<Option<CacheEntry>> {
        Ok(self.entries.lock().unwrap().get(&lookup_fingerprint).cloned())
    }
}
