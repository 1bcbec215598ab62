//! Build-manifest aggregator (C7): collects per-file drop entries, diverts
//! same-path/different-hash registrations to a duplicates log instead of
//! overwriting or erroring the whole pipeline, and emits a sorted,
//! normalized file list per drop. Grounded on `oxidized_state`'s
//! `ReleaseRegistry` append-only-history posture ("don't lose data on
//! conflict, surface it structurally") generalized from release promotion
//! to per-file manifest registration.

mod error;

pub use error::{ManifestError, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use fingerprint_store::ContentHash;

/// One `RecordFileForBuildManifest` registration.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub drop_name: String,
    pub relative_path: String,
    pub azure_artifacts_hash: ContentHash,
    pub build_manifest_hash: ContentHash,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    azure_artifacts_hash: ContentHash,
    build_manifest_hash: ContentHash,
}

#[derive(Debug, Clone)]
pub struct DuplicateConflict {
    pub drop_name: String,
    pub relative_path: String,
    pub existing_azure_artifacts_hash: ContentHash,
    pub conflicting_azure_artifacts_hash: ContentHash,
}

/// One row of the final emitted manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFileEntry {
    pub relative_path: String,
    pub azure_artifacts_hash: String,
    pub build_manifest_hash: String,
}

type Key = (Arc<str>, Arc<str>);

#[derive(Default)]
pub struct BuildManifestAggregator {
    entries: DashMap<Key, StoredEntry>,
    duplicates: DashMap<Arc<str>, Vec<DuplicateConflict>>,
    generate_called: AtomicBool,
}

impl BuildManifestAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of file records. A second registration of
    /// the same `(dropName, relativePath)` with a *different*
    /// `azureArtifactsHash` is a conflict: it is appended to the
    /// duplicates log rather than stored or rejected outright. A second
    /// registration with the *same* hash is a harmless no-op (the pip
    /// re-ran but produced the same content).
    pub fn record(&self, records: &[FileRecord]) {
        if self.generate_called.load(Ordering::SeqCst) {
            tracing::warn!(
                count = records.len(),
                "build manifest records arrived after file-list generation was requested"
            );
        }

        for record in records {
            let drop_name: Arc<str> = Arc::from(record.drop_name.as_str());
            let relative_path: Arc<str> = Arc::from(record.relative_path.as_str());
            let key = (drop_name.clone(), relative_path.clone());

            match self.entries.get(&key) {
                Some(existing) if existing.azure_artifacts_hash != record.azure_artifacts_hash => {
                    let conflict = DuplicateConflict {
                        drop_name: record.drop_name.clone(),
                        relative_path: record.relative_path.clone(),
                        existing_azure_artifacts_hash: existing.azure_artifacts_hash,
                        conflicting_azure_artifacts_hash: record.azure_artifacts_hash,
                    };
                    tracing::warn!(
                        drop_name = %record.drop_name,
                        relative_path = %record.relative_path,
                        "duplicate build manifest entry with differing content hash"
                    );
                    self.duplicates.entry(drop_name).or_default().push(conflict);
                }
                Some(_) => {
                    // Same hash re-registered: no-op (I2-style idempotence).
                }
                None => {
                    self.entries.insert(
                        key,
                        StoredEntry {
                            azure_artifacts_hash: record.azure_artifacts_hash,
                            build_manifest_hash: record.build_manifest_hash,
                        },
                    );
                }
            }
        }
    }

    /// Number of duplicate conflicts recorded for `drop_name` so far.
    pub fn duplicate_count(&self, drop_name: &str) -> usize {
        self.duplicates.get(drop_name).map(|v| v.len()).unwrap_or(0)
    }

    pub fn duplicates_for(&self, drop_name: &str) -> Vec<DuplicateConflict> {
        self.duplicates
            .get(drop_name)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Produce the sorted, normalized file list for `drop_name`.
    /// Fails if any duplicate conflicts were recorded for this drop;
    /// neither side of a conflicting pair is ever included in the list.
    /// Latches a flag so any `record` call that arrives afterward is
    /// logged as an ordering warning (still processed, not rejected).
    pub fn try_generate_build_manifest_file_list(
        &self,
        drop_name: &str,
    ) -> Result<Vec<ManifestFileEntry>> {
        self.generate_called.store(true, Ordering::SeqCst);

        let duplicates = self.duplicates.get(drop_name).map(|v| v.len()).unwrap_or(0);
        if duplicates > 0 {
            for conflict in self.duplicates_for(drop_name) {
                tracing::error!(
                    drop_name = %conflict.drop_name,
                    relative_path = %conflict.relative_path,
                    "build manifest duplicate conflict"
                );
            }
            return Err(ManifestError::DuplicateConflict {
                drop_name: drop_name.to_string(),
                count: duplicates,
            });
        }

        let mut list: Vec<ManifestFileEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0.as_ref() == drop_name)
            .map(|entry| ManifestFileEntry {
                relative_path: entry.key().1.replace('\\', "/"),
                azure_artifacts_hash: entry.value().azure_artifacts_hash.to_hex(),
                build_manifest_hash: entry.value().build_manifest_hash.to_hex(),
            })
            .collect();
        list.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(drop: &str, path: &str, azure_tag: &str, manifest_tag: &str) -> FileRecord {
        FileRecord {
            drop_name: drop.to_string(),
            relative_path: path.to_string(),
            azure_artifacts_hash: ContentHash::compute(&[azure_tag.as_bytes()]),
            build_manifest_hash: ContentHash::compute(&[manifest_tag.as_bytes()]),
        }
    }

    #[test]
    fn deterministic_sorted_list_without_conflicts() {
        let agg = BuildManifestAggregator::new();
        agg.record(&[
            record("drop1", "b/file.txt", "hb", "mb"),
            record("drop1", "a/file.txt", "ha", "ma"),
        ]);

        let list = agg.try_generate_build_manifest_file_list("drop1").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].relative_path, "a/file.txt");
        assert_eq!(list[1].relative_path, "b/file.txt");
    }

    #[test]
    fn backslashes_normalize_to_forward_slashes() {
        let agg = BuildManifestAggregator::new();
        agg.record(&[record("drop1", "a\\b\\c.txt", "h", "m")]);
        let list = agg.try_generate_build_manifest_file_list("drop1").unwrap();
        assert_eq!(list[0].relative_path, "a/b/c.txt");
    }

    #[test]
    fn duplicate_conflict_excludes_both_sides_and_errors() {
        let agg = BuildManifestAggregator::new();
        agg.record(&[
            record("drop1", "a/b", "hashX", "m1"),
            record("drop1", "a/b", "hashX-prime", "m1"),
        ]);

        let err = agg.try_generate_build_manifest_file_list("drop1").unwrap_err();
        assert!(matches!(
            err,
            ManifestError::DuplicateConflict { count: 1, .. }
        ));
        assert_eq!(agg.duplicate_count("drop1"), 1);
    }

    #[test]
    fn same_hash_reregistration_is_not_a_conflict() {
        let agg = BuildManifestAggregator::new();
        agg.record(&[
            record("drop1", "a/b", "hashX", "m1"),
            record("drop1", "a/b", "hashX", "m1"),
        ]);

        let list = agg.try_generate_build_manifest_file_list("drop1").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(agg.duplicate_count("drop1"), 0);
    }

    #[test]
    fn record_after_generate_is_processed_with_a_warning() {
        let agg = BuildManifestAggregator::new();
        agg.record(&[record("drop1", "a", "h1", "m1")]);
        let _ = agg.try_generate_build_manifest_file_list("drop1");

        agg.record(&[record("drop1", "b", "h2", "m2")]);
        let list = agg.try_generate_build_manifest_file_list("drop1").unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn deterministic_across_insertion_order() {
        let agg_forward = BuildManifestAggregator::new();
        agg_forward.record(&[
            record("drop1", "a", "h1", "m1"),
            record("drop1", "b", "h2", "m2"),
        ]);
        let agg_backward = BuildManifestAggregator::new();
        agg_backward.record(&[
            record("drop1", "b", "h2", "m2"),
            record("drop1", "a", "h1", "m1"),
        ]);

        assert_eq!(
            agg_forward.try_generate_build_manifest_file_list("drop1").unwrap(),
            agg_backward.try_generate_build_manifest_file_list("drop1").unwrap()
        );
    }
}
