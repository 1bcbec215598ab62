use crate::{KvStore, Result};

/// An atomic multi-column-family write batch.
///
/// Used to satisfy I1: a pip's weak-fp, strong-fp, path-set, and
/// pip-to-fingerprint-keys families are all written in one commit.
pub struct KvBatch<'a> {
    store: &'a KvStore,
    batch: rocksdb::WriteBatch,
    missing_cf: Option<String>,
}

impl<'a> KvBatch<'a> {
    pub(crate) fn new(store: &'a KvStore) -> Self {
        Self {
            store,
            batch: rocksdb::WriteBatch::default(),
            missing_cf: None,
        }
    }

    /// Stage a put. Column families that don't exist are only discovered at
    /// commit time (rocksdb batches don't validate CF handles eagerly).
    pub fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) -> &mut Self {
        if let Some(handle) = self.store.db().cf_handle(cf) {
            self.batch.put_cf(&handle, key, value);
        } else {
            // Deferred failure: surfaced on commit via a sentinel so callers
            // don't need a fallible `put`.
            self.missing_cf = Some(cf.to_string());
        }
        self
    }

    pub fn delete(&mut self, cf: &str, key: &[u8]) -> &mut Self {
        if let Some(handle) = self.store.db().cf_handle(cf) {
            self.batch.delete_cf(&handle, key);
        } else {
            self.missing_cf = Some(cf.to_string());
        }
        self
    }

    pub fn commit(self) -> Result<()> {
        if let Some(cf) = self.missing_cf {
            return Err(crate::KvError::MissingColumnFamily(cf));
        }
        self.store.commit_batch(self.batch)
    }
}
