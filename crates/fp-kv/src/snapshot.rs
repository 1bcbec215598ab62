use std::sync::Arc;

use crate::Db;

use crate::error::KvError;
use crate::Result;

/// An owned, point-in-time read view of a [`crate::KvStore`].
///
/// `rocksdb::SnapshotWithThreadMode` borrows from the `DB` it was taken
/// from; we keep the owning `Arc<Db>` alongside it and extend the borrow to
/// `'static` via `transmute`. This is sound because the `Arc<Db>` field is
/// declared after the snapshot field, so it's dropped after the snapshot
/// (Rust drops struct fields in declaration order) — the snapshot never
/// outlives the database it borrows from.
pub struct KvSnapshot {
    snapshot: rocksdb::SnapshotWithThreadMode<'static, Db>,
    db: Arc<Db>,
}

impl KvSnapshot {
    pub(crate) fn capture(db: Arc<Db>) -> Self {
        let snap: rocksdb::SnapshotWithThreadMode<'_, Db> = db.snapshot();
        // Safety: see struct-level doc comment on field drop order.
        let snap: rocksdb::SnapshotWithThreadMode<'static, Db> =
            unsafe { std::mem::transmute(snap) };
        Self { snapshot: snap, db }
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn get_cf(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| KvError::MissingColumnFamily(cf.to_string()))?;
        self.snapshot
            .get_cf(&handle, key)
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    pub(crate) fn iter_all_cf(&self, cf: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| KvError::MissingColumnFamily(cf.to_string()))?;
        let iter = self
            .snapshot
            .iterator_cf(&handle, rocksdb::IteratorMode::Start);
        let mut out = Vec::new();
        for item in iter {
            let (k, v) = item.map_err(|e| KvError::Backend(e.to_string()))?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}
