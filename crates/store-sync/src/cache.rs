//! `ArtifactCache`: the only surface `store-sync` depends on for actual
//! content storage (the artifact content cache's
//! internals are an explicit non-goal; we only need `put`/`get_by_key`/
//! `materialize`). `FsArtifactCache` is a concurrency-bounded reference
//! implementation grounded on `aivcs_core::cas::fs::FsCasStore`'s
//! 2-hex-char sharded directory layout and atomic temp-file-then-rename
//! writes, extended with a side JSON file holding fingerprint-keyed
//! cache-entry pointers (descriptor hash + associated file hashes), since
//! a real artifact cache exposes both a blob store and a pointer store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use fingerprint_store::ContentHash;

use crate::error::{Result, SyncError};

/// A published pointer: `lookupFingerprint -> (descriptorHash, associatedHashes)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub descriptor_hash: ContentHash,
    pub associated_hashes: Vec<ContentHash>,
}

#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Store `bytes` under their content hash. Idempotent.
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentHash>;

    /// Fetch previously-`put` bytes by their content hash.
    async fn get_by_key(&self, hash: ContentHash) -> Result<Vec<u8>>;

    /// Whether `hash` is present in the cache (used to pin all of a
    /// descriptor's associated hashes before materializing any of them).
    async fn contains(&self, hash: ContentHash) -> Result<bool>;

    /// Copy the content stored under `hash` to `dest` on the local filesystem.
    async fn materialize(&self, hash: ContentHash, dest: &Path) -> Result<()>;

    /// Publish a temporal cache entry under `lookup_fingerprint`.
    async fn publish_entry(&self, lookup_fingerprint: ContentHash, entry: CacheEntry) -> Result<()>;

    /// Resolve a previously-published cache entry, if any.
    async fn resolve_entry(&self, lookup_fingerprint: ContentHash) -> Result<Option<CacheEntry>>;
}

#[derive(Default, Serialize, Deserialize)]
struct EntriesFile {
    entries: HashMap<String, CacheEntry>,
}

/// Reference `ArtifactCache` rooted at a local directory: `objects/<sh>/<rest>`
/// for content blobs, `entries.json` for the fingerprint-keyed pointer map.
pub struct FsArtifactCache {
    objects_dir: PathBuf,
    entries_path: PathBuf,
    entries: Mutex<EntriesFile>,
}

impl FsArtifactCache {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let objects_dir = root.join("objects");
        std::fs::create_dir_all(&objects_dir)?;
        let entries_path = root.join("entries.json");
        let entries = if entries_path.exists() {
            let raw = std::fs::read(&entries_path)?;
            serde_json::from_slice(&raw)?
        } else {
            EntriesFile::default()
        };
        Ok(Self {
            objects_dir,
            entries_path,
            entries: Mutex::new(entries),
        })
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    fn persist_entries(&self, entries: &EntriesFile) -> Result<()> {
        let raw = serde_json::to_vec_pretty(entries)?;
        let parent = self
            .entries_path
            .parent()
            .expect("entries path always has parent");
        let mut tmp = NamedTempFile::new_in(parent)?;
        use std::io::Write;
        tmp.write_all(&raw)?;
        tmp.persist(&self.entries_path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactCache for FsArtifactCache {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentHash> {
        let hash = ContentHash::compute(&[&bytes]);
        let path = self.blob_path(&hash);
        if path.exists() {
            return Ok(hash);
        }
        let shard_dir = path.parent().expect("blob path always has parent").to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&shard_dir)?;
            let mut tmp = NamedTempFile::new_in(&shard_dir)?;
            use std::io::Write;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .expect("blocking put task panicked")?;
        Ok(hash)
    }

    async fn get_by_key(&self, hash: ContentHash) -> Result<Vec<u8>> {
        let path = self.blob_path(&hash);
        tokio::fs::read(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SyncError::NotFound(hash),
                _ => SyncError::Io(e),
            })
    }

    async fn contains(&self, hash: ContentHash) -> Result<bool> {
        Ok(self.blob_path(&hash).exists())
    }

    async fn materialize(&self, hash: ContentHash, dest: &Path) -> Result<()> {
        let src = self.blob_path(&hash);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, dest).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SyncError::NotFound(hash),
            _ => SyncError::Io(e),
        })?;
        Ok(())
    }

    async fn publish_entry(&self, lookup_fingerprint: ContentHash, entry: CacheEntry) -> Result<()> {
        let mut guard = self.entries.lock().unwrap();
        guard.entries.insert(lookup_fingerprint.to_hex(), entry);
        self.persist_entries(&guard)
    }

    async fn resolve_entry(&self, lookup_fingerprint: ContentHash) -> Result<Option<CacheEntry>> {
        let guard = self.entries.lock().unwrap();
        Ok(guard.entries.get(&lookup_fingerprint.to_hex()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_idempotent_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(dir.path()).unwrap();
        let h1 = cache.put(b"payload".to_vec()).await.unwrap();
        let h2 = cache.put(b"payload".to_vec()).await.unwrap();
        assert_eq!(h1, h2);
    }

    #[tokio::test]
    async fn materialize_copies_bytes_to_dest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(dir.path()).unwrap();
        let hash = cache.put(b"hello".to_vec()).await.unwrap();

        let dest = dir.path().join("out").join("file.txt");
        cache.materialize(hash, &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn publish_and_resolve_entry_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(dir.path()).unwrap();
        let fp = ContentHash::compute(&[b"lookup"]);
        let entry = CacheEntry {
            descriptor_hash: ContentHash::compute(&[b"descriptor"]),
            associated_hashes: vec![ContentHash::compute(&[b"a"])],
        };
        cache.publish_entry(fp, entry.clone()).await.unwrap();

        let resolved = cache.resolve_entry(fp).await.unwrap().unwrap();
        assert_eq!(resolved.descriptor_hash, entry.descriptor_hash);
    }

    #[tokio::test]
    async fn resolve_unknown_fingerprint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsArtifactCache::new(dir.path()).unwrap();
        let fp = ContentHash::compute(&[b"nothing published"]);
        assert!(cache.resolve_entry(fp).await.unwrap().is_none());
    }
}
