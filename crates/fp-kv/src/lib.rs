//! Embedded ordered KV store adapter.
//!
//! Thin wrapper over `rocksdb` that gives the layers above a small, typed
//! surface: open a directory as a set of named column families, read/write
//! or read-only, take a point-in-time snapshot, and signal a background GC
//! loop to stop before shutdown. No exception control flow — every fallible
//! operation returns a [`KvError`].

mod batch;
mod error;
mod gc;
mod snapshot;

pub use batch::KvBatch;
pub use error::KvError;
pub use gc::GcToken;
pub use snapshot::KvSnapshot;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, MultiThreaded, Options};
use tracing::{info, instrument, warn};

/// The database thread mode used throughout this crate. `MultiThreaded`
/// gives `cf_handle` an `Arc<BoundColumnFamily>`, so handles can be held
/// across `.await` points and shared between readers without re-locking.
pub(crate) type Db = rocksdb::DBWithThreadMode<MultiThreaded>;

pub type Result<T> = std::result::Result<T, KvError>;

/// Open mode for [`KvStore::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvMode {
    /// Single writer, readers see committed state.
    ReadWrite,
    /// Writes rejected; GC disabled.
    ReadOnly,
}

enum Backing {
    Owned(Arc<Db>),
    Snapshot(KvSnapshot),
}

/// A handle onto an embedded KV store: either the live read/write (or
/// read-only) database, or a read-only snapshot of one taken at a point in
/// time. Mirrors the `Uninitialized -> Opening -> {RW, RO, Snapshot} ->
/// Closing -> Closed` state machine at the type level: a `KvStore` only
/// exists once open has succeeded, and is closed by dropping it.
pub struct KvStore {
    backing: Backing,
    mode: KvMode,
    column_families: Vec<String>,
    gc_token: GcToken,
    path: PathBuf,
}

impl KvStore {
    /// Open (creating if absent) an embedded KV store at `path` with the
    /// given column families. In [`KvMode::ReadOnly`] mode, writes are
    /// rejected and no GC token is active.
    #[instrument(skip(column_families))]
    pub fn open(path: impl AsRef<Path>, mode: KvMode, column_families: &[&str]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = column_families
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let open_result = match mode {
            KvMode::ReadWrite => Db::open_cf_descriptors(&opts, &path, cf_descriptors),
            KvMode::ReadOnly => {
                Db::open_cf_descriptors_read_only(&opts, &path, cf_descriptors, false)
            }
        };

        let db = match open_result {
            Ok(db) => db,
            Err(e) => return Err(Self::recover_or_fail(&path, e)),
        };

        info!(?path, ?mode, "opened embedded KV store");
        Ok(Self {
            backing: Backing::Owned(Arc::new(db)),
            mode,
            column_families: column_families.iter().map(|s| s.to_string()).collect(),
            gc_token: GcToken::new(),
            path,
        })
    }

    /// Move a directory that failed to open aside (timestamp-suffixed) so
    /// the caller can recreate a fresh store, per the corrupt-store
    /// recovery contract.
    fn recover_or_fail(path: &Path, err: rocksdb::Error) -> KvError {
        warn!(?path, error = %err, "store open failed, attempting move-aside recovery");
        if path.exists() {
            let suffix = chrono::Utc::now().format("%Y%m%dT%H%M%S%fZ");
            let moved = path.with_extension(format!("corrupt-{suffix}"));
            if std::fs::rename(path, &moved).is_ok() {
                warn!(?moved, "moved corrupt store directory aside");
            }
        }
        KvError::Corrupt {
            path: path.to_path_buf(),
            source: err.to_string(),
        }
    }

    /// Take a read-only, point-in-time snapshot. Writes to `self` after this
    /// call are invisible through the returned handle (P3).
    pub fn create_snapshot(&self) -> Result<KvStore> {
        let Backing::Owned(db) = &self.backing else {
            return Err(KvError::Unsupported(
                "cannot snapshot a snapshot".to_string(),
            ));
        };
        let snap = KvSnapshot::capture(Arc::clone(db));
        Ok(KvStore {
            backing: Backing::Snapshot(snap),
            mode: KvMode::ReadOnly,
            column_families: self.column_families.clone(),
            gc_token: GcToken::new(),
            path: self.path.clone(),
        })
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.mode, KvMode::ReadOnly) || matches!(self.backing, Backing::Snapshot(_))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cancellable GC token for this store. Cloning shares the same
    /// cancellation flag.
    pub fn gc_token(&self) -> GcToken {
        self.gc_token.clone()
    }

    fn db(&self) -> &Db {
        match &self.backing {
            Backing::Owned(db) => db,
            Backing::Snapshot(snap) => snap.db(),
        }
    }

    fn cf_handle(&self, cf: &str) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db()
            .cf_handle(cf)
            .ok_or_else(|| KvError::MissingColumnFamily(cf.to_string()))
    }

    pub fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        if self.is_read_only() {
            return Err(KvError::ReadOnly);
        }
        let Backing::Owned(db) = &self.backing else {
            return Err(KvError::ReadOnly);
        };
        let handle = self.cf_handle(cf)?;
        db.put_cf(&handle, key, value)
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    pub fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match &self.backing {
            Backing::Owned(db) => {
                let handle = self.cf_handle(cf)?;
                db.get_cf(&handle, key)
                    .map_err(|e| KvError::Backend(e.to_string()))
            }
            Backing::Snapshot(snap) => snap.get_cf(cf, key),
        }
    }

    pub fn delete(&self, cf: &str, key: &[u8]) -> Result<()> {
        if self.is_read_only() {
            return Err(KvError::ReadOnly);
        }
        let Backing::Owned(db) = &self.backing else {
            return Err(KvError::ReadOnly);
        };
        let handle = self.cf_handle(cf)?;
        db.delete_cf(&handle, key)
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    /// Iterate all `(key, value)` pairs in `cf` in key order.
    pub fn iter_all(&self, cf: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        match &self.backing {
            Backing::Owned(db) => {
                let handle = self.cf_handle(cf)?;
                let iter = db.iterator_cf(&handle, rocksdb::IteratorMode::Start);
                let mut out = Vec::new();
                for item in iter {
                    let (k, v) = item.map_err(|e| KvError::Backend(e.to_string()))?;
                    out.push((k.to_vec(), v.to_vec()));
                }
                Ok(out)
            }
            Backing::Snapshot(snap) => snap.iter_all_cf(cf),
        }
    }

    /// Begin an atomic multi-family write batch (I1: weak/strong/pathset
    /// families are committed together per pip).
    pub fn batch(&self) -> KvBatch<'_> {
        KvBatch::new(self)
    }

    pub(crate) fn commit_batch(&self, batch: rocksdb::WriteBatch) -> Result<()> {
        if self.is_read_only() {
            return Err(KvError::ReadOnly);
        }
        let Backing::Owned(db) = &self.backing else {
            return Err(KvError::ReadOnly);
        };
        db.write(batch).map_err(|e| KvError::Backend(e.to_string()))
    }
}
