use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use tracing::{info, instrument};

use crate::cache_miss::CacheMissRecord;
use crate::entry::{FingerprintStoreEntry, PipFingerprintKeys};
use crate::error::{Result, StoreError};
use crate::families;
use crate::format::{self, FormatHeader};
use crate::gc::{self, FamilyTag};
use crate::hash::ContentHash;

/// Open mode mirrored from [`fp_kv::KvMode`] plus the GC-relevant
/// `max_entry_age` the KV layer doesn't know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    ReadWrite,
    ReadOnly,
}

fn load_json(kv: &fp_kv::KvStore, cf: &str, hex_key: &str) -> Result<Option<serde_json::Value>> {
    match kv.get(cf, hex_key.as_bytes())? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Deserialize {
                key: hex_key.to_string(),
                source,
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Typed writer/reader over [`fp_kv`] for the entry families. Models
/// `Uninitialized -> Opening -> {RW, RO, Snapshot} -> Closing -> Closed` at
/// the type level the same way [`fp_kv::KvStore`] does: a `Store` only
/// exists once `open` or `create_snapshot` has succeeded, and is closed by
/// `dispose` (or by dropping it without running GC).
pub struct Store {
    kv: Arc<fp_kv::KvStore>,
    max_entry_age: Duration,
    format: FormatHeader,
}

impl Store {
    /// Open (creating if absent) a fingerprint store at `path`. In
    /// [`StoreMode::ReadWrite`], the format header is written on first open
    /// and an LRU-age record is initialized on every touched key.
    /// [`StoreMode::ReadOnly`] forbids writes and disables GC.
    #[instrument(skip(path))]
    pub fn open(path: impl AsRef<Path>, mode: StoreMode, max_entry_age: Duration) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let read_only = mode == StoreMode::ReadOnly;
        let format = format::read_or_init(&path, read_only)?;

        let kv_mode = match mode {
            StoreMode::ReadWrite => fp_kv::KvMode::ReadWrite,
            StoreMode::ReadOnly => fp_kv::KvMode::ReadOnly,
        };
        let kv = fp_kv::KvStore::open(&path, kv_mode, families::ALL)?;
        info!(?path, ?mode, "opened fingerprint store");
        Ok(Self {
            kv: Arc::new(kv),
            max_entry_age,
            format,
        })
    }

    /// A read-only view of this store as of the call moment (P3: later
    /// writes to `self` are invisible through the returned handle).
    pub async fn create_snapshot(&self) -> Result<Store> {
        let kv = Arc::clone(&self.kv);
        let max_entry_age = self.max_entry_age;
        let format = self.format;
        let snapshot = tokio::task::spawn_blocking(move || kv.create_snapshot()).await??;
        Ok(Store {
            kv: Arc::new(snapshot),
            max_entry_age,
            format,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.kv.is_read_only()
    }

    pub fn path(&self) -> &Path {
        self.kv.path()
    }

    pub fn format_header(&self) -> FormatHeader {
        self.format
    }

    pub fn gc_token(&self) -> fp_kv::GcToken {
        self.kv.gc_token()
    }

    /// Atomically writes the pip's keys row and any entry-family blob not
    /// already present (I1, I2). The path-set blob is written only if
    /// `store_path_set` is true or the path-set hash isn't already present —
    /// callers that already know the hash is shared across pips can pass
    /// `false` to skip the (potentially large) write.
    #[instrument(skip(self, entry))]
    pub async fn put_fingerprint_store_entry(
        &self,
        entry: FingerprintStoreEntry,
        store_path_set: bool,
    ) -> Result<()> {
        if self.is_read_only() {
            return Err(StoreError::Kv(fp_kv::KvError::ReadOnly));
        }
        let kv = Arc::clone(&self.kv);
        let now = gc::now_millis();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let pip_key = entry.formatted_semi_stable_hash.as_bytes();
            let weak_hex = entry.keys.weak_fingerprint.to_hex();
            let strong_hex = entry.keys.strong_fingerprint.to_hex();
            let pathset_hex = entry.keys.path_set_hash.to_hex();

            let weak_exists = kv
                .get(families::WEAK_FP_TO_INPUTS, weak_hex.as_bytes())?
                .is_some();
            let strong_exists = kv
                .get(families::STRONG_FP_TO_INPUTS, strong_hex.as_bytes())?
                .is_some();
            let pathset_exists = kv
                .get(families::PATHSET_HASH_TO_INPUTS, pathset_hex.as_bytes())?
                .is_some();
            let write_pathset = store_path_set || !pathset_exists;

            let keys_blob = serde_json::to_vec(&entry.keys).expect("keys always serialize");
            let mut batch = kv.batch();
            batch.put(families::PIP_TO_FP_KEYS, pip_key, &keys_blob);
            batch.put(
                families::LRU_TIMESTAMPS,
                &gc::lru_key(FamilyTag::PipToFpKeys, pip_key),
                &now.to_be_bytes(),
            );

            if !weak_exists {
                let blob = serde_json::to_vec(&entry.weak_fingerprint_inputs)
                    .expect("json always serializes");
                batch.put(families::WEAK_FP_TO_INPUTS, weak_hex.as_bytes(), &blob);
                batch.put(
                    families::LRU_TIMESTAMPS,
                    &gc::lru_key(FamilyTag::WeakFp, weak_hex.as_bytes()),
                    &now.to_be_bytes(),
                );
            }
            if !strong_exists {
                let blob = serde_json::to_vec(&entry.strong_fingerprint_inputs)
                    .expect("json always serializes");
                batch.put(families::STRONG_FP_TO_INPUTS, strong_hex.as_bytes(), &blob);
                batch.put(
                    families::LRU_TIMESTAMPS,
                    &gc::lru_key(FamilyTag::StrongFp, strong_hex.as_bytes()),
                    &now.to_be_bytes(),
                );
            }
            if write_pathset {
                if let Some(path_set_inputs) = &entry.path_set_inputs {
                    let blob =
                        serde_json::to_vec(path_set_inputs).expect("json always serializes");
                    batch.put(families::PATHSET_HASH_TO_INPUTS, pathset_hex.as_bytes(), &blob);
                    batch.put(
                        families::LRU_TIMESTAMPS,
                        &gc::lru_key(FamilyTag::PathSet, pathset_hex.as_bytes()),
                        &now.to_be_bytes(),
                    );
                }
            }
            batch.commit()?;
            Ok(())
        })
        .await?
    }

    /// Write-once-wins by content hash (I2): a no-op if `hash` already has a
    /// value stored.
    pub async fn put_content_hash(&self, hash: ContentHash, value: serde_json::Value) -> Result<()> {
        if self.is_read_only() {
            return Err(StoreError::Kv(fp_kv::KvError::ReadOnly));
        }
        let kv = Arc::clone(&self.kv);
        let now = gc::now_millis();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let hex = hash.to_hex();
            if kv.get(families::CONTENT_HASH_TO_VALUE, hex.as_bytes())?.is_some() {
                return Ok(());
            }
            let blob = serde_json::to_vec(&value).expect("json always serializes");
            let mut batch = kv.batch();
            batch.put(families::CONTENT_HASH_TO_VALUE, hex.as_bytes(), &blob);
            batch.put(
                families::LRU_TIMESTAMPS,
                &gc::lru_key(FamilyTag::ContentHash, hex.as_bytes()),
                &now.to_be_bytes(),
            );
            batch.commit()?;
            Ok(())
        })
        .await?
    }

    /// Replace-by-key (I4): refreshed unconditionally, matching "refreshed
    /// whenever it disagrees with the current pip" — an unconditional
    /// overwrite with the same value is indistinguishable from a no-op.
    pub async fn put_pip_unique_output_hash(
        &self,
        hash: ContentHash,
        semi_stable_hash: String,
    ) -> Result<()> {
        if self.is_read_only() {
            return Err(StoreError::Kv(fp_kv::KvError::ReadOnly));
        }
        let kv = Arc::clone(&self.kv);
        tokio::task::spawn_blocking(move || -> Result<()> {
            kv.put(
                families::PIP_UNIQUE_OUTPUT_HASH_TO_SEMISTABLE,
                hash.to_hex().as_bytes(),
                semi_stable_hash.as_bytes(),
            )?;
            Ok(())
        })
        .await?
    }

    /// Writes the single ordered `cacheMissList` blob, replacing any prior
    /// one in full.
    pub async fn put_cache_miss_list(&self, list: Vec<CacheMissRecord>) -> Result<()> {
        if self.is_read_only() {
            return Err(StoreError::Kv(fp_kv::KvError::ReadOnly));
        }
        let kv = Arc::clone(&self.kv);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let blob = serde_json::to_vec(&list).expect("list always serializes");
            kv.put(families::CACHE_MISS_LIST, families::CACHE_MISS_LIST_KEY, &blob)?;
            Ok(())
        })
        .await?
    }

    /// Prefers `pip_unique_output_hash` lookup (via
    /// `pip_unique_output_hash_to_semistable`); falls back to
    /// `formatted_semi_stable_hash` when absent or not given.
    pub async fn try_get_fingerprint_store_entry(
        &self,
        pip_unique_output_hash: Option<ContentHash>,
        formatted_semi_stable_hash: &str,
    ) -> Result<Option<FingerprintStoreEntry>> {
        let kv = Arc::clone(&self.kv);
        let fallback_key = formatted_semi_stable_hash.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<FingerprintStoreEntry>> {
            let resolved_key = match pip_unique_output_hash {
                Some(hash) => kv
                    .get(
                        families::PIP_UNIQUE_OUTPUT_HASH_TO_SEMISTABLE,
                        hash.to_hex().as_bytes(),
                    )?
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .unwrap_or(fallback_key),
                None => fallback_key,
            };

            let Some(keys_blob) = kv.get(families::PIP_TO_FP_KEYS, resolved_key.as_bytes())? else {
                return Ok(None);
            };
            let keys: PipFingerprintKeys =
                serde_json::from_slice(&keys_blob).map_err(|source| StoreError::Deserialize {
                    key: resolved_key.clone(),
                    source,
                })?;

            let weak = load_json(
                &kv,
                families::WEAK_FP_TO_INPUTS,
                &keys.weak_fingerprint.to_hex(),
            )?
            .unwrap_or(serde_json::Value::Null);
            let strong = load_json(
                &kv,
                families::STRONG_FP_TO_INPUTS,
                &keys.strong_fingerprint.to_hex(),
            )?
            .unwrap_or(serde_json::Value::Null);
            let path_set_inputs = load_json(
                &kv,
                families::PATHSET_HASH_TO_INPUTS,
                &keys.path_set_hash.to_hex(),
            )?;

            Ok(Some(FingerprintStoreEntry {
                formatted_semi_stable_hash: resolved_key,
                keys,
                weak_fingerprint_inputs: weak,
                strong_fingerprint_inputs: strong,
                path_set_inputs,
            }))
        })
        .await?
    }

    pub async fn try_get_content_hash_value(
        &self,
        hash_hex: &str,
    ) -> Result<Option<serde_json::Value>> {
        let kv = Arc::clone(&self.kv);
        let hash_hex = hash_hex.to_string();
        tokio::task::spawn_blocking(move || {
            load_json(&kv, families::CONTENT_HASH_TO_VALUE, &hash_hex)
        })
        .await?
    }

    pub async fn try_get_cache_miss_list(&self) -> Result<Option<Vec<CacheMissRecord>>> {
        let kv = Arc::clone(&self.kv);
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<CacheMissRecord>>> {
            match kv.get(families::CACHE_MISS_LIST, families::CACHE_MISS_LIST_KEY)? {
                Some(bytes) => {
                    let list = serde_json::from_slice(&bytes).map_err(|source| {
                        StoreError::Deserialize {
                            key: "cache_miss_list".to_string(),
                            source,
                        }
                    })?;
                    Ok(Some(list))
                }
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn contains_content_hash(&self, hash_hex: &str) -> Result<bool> {
        let kv = Arc::clone(&self.kv);
        let hash_hex = hash_hex.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            Ok(kv
                .get(families::CONTENT_HASH_TO_VALUE, hash_hex.as_bytes())?
                .is_some())
        })
        .await?
    }

    /// If `run_gc` and the GC token hasn't been cancelled, sweep entries
    /// older than `max_entry_age` before closing. Consumes `self`: the
    /// underlying KV handle closes when the last `Arc` to it drops.
    #[instrument(skip(self))]
    pub async fn dispose(self, run_gc: bool) -> Result<()> {
        if run_gc && !self.is_read_only() && !self.kv.gc_token().is_cancelled() {
            let kv = Arc::clone(&self.kv);
            let max_entry_age = self.max_entry_age;
            let swept = tokio::task::spawn_blocking(move || gc::sweep(&kv, max_entry_age)).await??;
            info!(swept, "fingerprint store GC pass complete");
        }
        Ok(())
    }
}
