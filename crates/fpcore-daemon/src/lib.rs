//! Runtime host (expansion, not a spec component on its own): wires
//! `event-ingress` (C8) to `fingerprint-store` (C2) via `runtime-analyzer`
//! (C5), and `store-sync` (C6) at the edges of one build. This is the
//! "runtime coordinator" owning a
//! fingerprint-store writer handle, an event dispatcher, and a runtime
//! analyzer for the duration of a build; everything it does is delegate
//! to the nine components, in the order the spec's data-flow calls for:
//! retrieve a prior store (if configured) -> ingest events -> drain and
//! publish at build end.
//!
//! Not an end-user CLI (an explicit non-goal): no subcommands for
//! driving a build, only the runtime host and its bootstrap config.

pub mod config;
pub mod error;
pub mod sink;

pub use config::{CacheMissDiffFormat, CacheMissMode, FingerprintCoreConfig, FingerprintStoreMode};
pub use error::{ConfigError, HostError, Result};
pub use sink::TracingSink;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;

use build_manifest::{BuildManifestAggregator, ManifestFileEntry};
use event_ingress::{decode_event, Dispatcher, EventConsumer, Frame};
use fingerprint_store::Store;
use operation_tracker::OperationTracker;
use runtime_analyzer::{BatchConfig, DependentsProvider, NoDependents, RuntimeAnalyzer, RuntimeAnalyzerConfig, TelemetrySink};
use store_sync::{publish_store, retrieve_by_candidates, ArtifactCache, CandidateKeys, PublishOutcome, PublishRequest};

/// A point-in-time readout of the host's internal counters, suitable for
/// a `/healthz`-style endpoint or a periodic log line. No network surface
/// is opened here (that belongs to whatever process embeds this crate);
/// this is just the snapshot such a surface would serve.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    pub changed_pip_count: usize,
    pub performance: serde_json::Value,
}

/// Outcome of [`FpCoreHost::shutdown`]: the publish result plus a final
/// operation-tracker performance dump.
#[derive(Debug)]
pub struct ShutdownOutcome {
    pub publish: PublishOutcome,
    pub performance: serde_json::Value,
}

/// Where this build's "prior" fingerprint store (if any) came from, and
/// where it lives on disk for the duration of the build.
struct PriorStore {
    store: Arc<Store>,
    /// Set only when the prior store was materialized into a scratch
    /// directory by this host (the `Remote`/`GitHashes`/`AzureDevOps`
    /// paths) — `dispose` deletes it afterward.
    downloaded_dir: Option<PathBuf>,
}

/// The runtime coordinator for one build: owns the current build's
/// fingerprint-store writer handle, the event dispatcher, and the
/// `runtime-analyzer` instance for as long as the build runs.
pub struct FpCoreHost {
    config: FingerprintCoreConfig,
    current_store: Arc<Store>,
    runtime: Arc<RuntimeAnalyzer>,
    dispatcher: Dispatcher,
    build_manifest: Arc<BuildManifestAggregator>,
    operation_tracker: Arc<OperationTracker>,
}

impl FpCoreHost {
    /// Resolve the prior-store side of the diff per `config.cache_miss_mode`
    /// `cache` and `candidates` are only consulted for the
    /// `Remote`/`GitHashes`/`AzureDevOps` modes; pass whatever trivially
    /// satisfies the trait (e.g. `NoDependents`-style stub) when the mode
    /// doesn't need them — they're never called in that case.
    async fn resolve_prior_store(
        config: &FingerprintCoreConfig,
        current_store: &Arc<Store>,
        cache: Option<&dyn ArtifactCache>,
        candidates: Option<&dyn CandidateKeys>,
        fingerprint_salt: &str,
    ) -> Result<Option<PriorStore>> {
        match config.cache_miss_mode {
            CacheMissMode::Disabled => Ok(None),
            CacheMissMode::Local => {
                let snapshot = current_store.create_snapshot().await?;
                Ok(Some(PriorStore {
                    store: Arc::new(snapshot),
                    downloaded_dir: None,
                }))
            }
            CacheMissMode::CustomPath => {
                let dir = config
                    .prior_store_directory
                    .clone()
                    .ok_or(HostError::MissingPriorStoreSource {
                        mode: config.cache_miss_mode,
                    })?;
                let store = Store::open(
                    &dir,
                    fingerprint_store::StoreMode::ReadOnly,
                    ChronoDuration::minutes(config.fingerprint_store_max_entry_age_minutes),
                )?;
                Ok(Some(PriorStore {
                    store: Arc::new(store),
                    downloaded_dir: None,
                }))
            }
            CacheMissMode::Remote | CacheMissMode::GitHashes | CacheMissMode::AzureDevOps => {
                let cache = cache.ok_or(HostError::MissingPriorStoreSource {
                    mode: config.cache_miss_mode,
                })?;
                let candidates = candidates.ok_or(HostError::MissingPriorStoreSource {
                    mode: config.cache_miss_mode,
                })?;
                let target_dir = std::env::temp_dir().join(format!(
                    "fpcore-prior-{}",
                    fingerprint_store::ContentHash::compute(&[fingerprint_salt.as_bytes()]).to_hex()
                ));
                tokio::fs::create_dir_all(&target_dir).await?;
                let outcome = retrieve_by_candidates(
                    cache,
                    &target_dir,
                    fingerprint_store::CURRENT_FORMAT_VERSION,
                    fingerprint_store::CURRENT_LOOKUP_VERSION,
                    &candidates.candidates(),
                    fingerprint_salt,
                    8,
                )
                .await?;
                tracing::info!(key = %outcome.key_used, provenance = ?outcome.provenance, "retrieved prior fingerprint store");
                let store = Store::open(
                    &target_dir,
                    fingerprint_store::StoreMode::ReadOnly,
                    ChronoDuration::minutes(config.fingerprint_store_max_entry_age_minutes),
                )?;
                Ok(Some(PriorStore {
                    store: Arc::new(store),
                    downloaded_dir: Some(target_dir),
                }))
            }
        }
    }

    /// Bootstrap a host for one build: open the current store, resolve
    /// the prior store per `cache_miss_mode`, and wire a `RuntimeAnalyzer`
    /// plus its dispatcher. `sink` receives batched cache-miss analysis
    /// envelopes; pass [`TracingSink`] for a standalone process.
    pub async fn bootstrap(
        config: FingerprintCoreConfig,
        fingerprint_salt: &str,
        sink: Arc<dyn TelemetrySink>,
        dependents: Option<Arc<dyn DependentsProvider>>,
        cache: Option<&dyn ArtifactCache>,
        candidates: Option<&dyn CandidateKeys>,
    ) -> Result<Self> {
        let current_store = Arc::new(Store::open(
            &config.fingerprint_store_directory,
            config.fingerprint_store_mode.into(),
            ChronoDuration::minutes(config.fingerprint_store_max_entry_age_minutes),
        )?);

        let prior = Self::resolve_prior_store(&config, &current_store, cache, candidates, fingerprint_salt).await?;
        let (prior_store, downloaded_dir) = match prior {
            Some(p) => (Some(p.store), p.downloaded_dir),
            None => (None, None),
        };

        let build_manifest = Arc::new(BuildManifestAggregator::new());
        let operation_tracker = Arc::new(OperationTracker::new(std::time::Duration::from_secs(30)));
        let dependents = dependents.unwrap_or_else(|| Arc::new(NoDependents));

        let runtime = Arc::new(RuntimeAnalyzer::new(
            current_store.clone(),
            prior_store,
            downloaded_dir,
            dependents,
            build_manifest.clone(),
            operation_tracker.clone(),
            sink,
            RuntimeAnalyzerConfig {
                // `Disabled` mode ("no analyzer") forces the budget to
                // zero rather than threading a separate on/off switch
                // through `runtime-analyzer` — the eligibility predicate
                // already rejects every pip once the budget is spent.
                max_cache_miss_can_perform: if matches!(config.cache_miss_mode, CacheMissMode::Disabled) {
                    0
                } else {
                    config.max_num_pips_for_cache_miss_analysis
                },
                analyze_all_pips: config.runtime_cache_miss_all_pips,
                legacy_mark_uncacheable_downstream: config.legacy_mark_uncacheable_downstream,
                diff_format: config.cache_miss_diff_format.into(),
                log_dir: config.fingerprints_log_directory.clone(),
                batch: BatchConfig {
                    interval: std::time::Duration::from_secs(config.batch_interval_seconds),
                    batch_size: config.batch_size,
                    max_log_size: config.aria_individual_message_size_limit_bytes,
                },
            },
        ));

        // The runtime analyzer is the sole event consumer: it always
        // records fingerprints and forwards manifest records regardless
        // of `cache_miss_mode`, and only skips the diff subroutine itself
        // when the prior-store side is `None` (the `Disabled` case).
        let mut dispatcher = Dispatcher::new();
        dispatcher.attach(runtime.clone() as Arc<dyn EventConsumer>);

        Ok(Self {
            config,
            current_store,
            runtime,
            dispatcher,
            build_manifest,
            operation_tracker,
        })
    }

    /// Decode and dispatch every complete frame in `bytes` (the binary
    /// event-stream format). Returns the number of events dispatched.
    pub async fn ingest_bytes(&self, mut bytes: &[u8]) -> Result<usize> {
        let mut count = 0usize;
        while !bytes.is_empty() {
            let (frame, rest) = Frame::decode(bytes)?;
            let event = decode_event(&frame)?;
            self.dispatcher.dispatch(event, frame.worker_id).await;
            bytes = rest;
            count += 1;
        }
        Ok(count)
    }

    /// Read an entire event-stream source to EOF and dispatch every
    /// frame it contains.
    pub async fn ingest_reader(&self, mut reader: impl tokio::io::AsyncRead + Unpin) -> Result<usize> {
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        self.ingest_bytes(&buf).await
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            changed_pip_count: self.runtime.changed_pip_count(),
            performance: self.operation_tracker.dump_performance_json(Some(5)),
        }
    }

    pub fn try_generate_build_manifest(&self, drop_name: &str) -> Result<Vec<ManifestFileEntry>> {
        Ok(self.build_manifest.try_generate_build_manifest_file_list(drop_name)?)
    }

    /// End-of-build shutdown: drain the batching queue,
    /// dispose the prior-store snapshot/handle, delete a materialized
    /// prior-store directory if one was downloaded, then publish the
    /// current store to `cache` under `publish_key` and run the store's
    /// own age-based GC.
    pub async fn shutdown(
        self,
        cache: &dyn ArtifactCache,
        publish_key: &str,
        fingerprint_salt: &str,
        run_gc: bool,
    ) -> Result<ShutdownOutcome> {
        // Drop the dispatcher's `Arc` clone so the host's is the only one
        // left, letting `Arc::try_unwrap` below actually succeed.
        drop(self.dispatcher);

        let runtime = Arc::try_unwrap(self.runtime).map_err(|_| HostError::RuntimeStillShared)?;
        runtime.dispose().await?;

        let performance = self.operation_tracker.dump_performance_json(Some(5));

        let publish = publish_store(
            cache,
            PublishRequest {
                store_dir: self.current_store.path(),
                trace_info: serde_json::json!({ "formatVersion": self.config.fingerprint_store_mode }),
                friendly_name: "fpcore".to_string(),
                format_version: fingerprint_store::CURRENT_FORMAT_VERSION,
                lookup_version: fingerprint_store::CURRENT_LOOKUP_VERSION,
                key: publish_key,
                fingerprint_salt,
                concurrency: 8,
            },
        )
        .await?;

        let store = Arc::try_unwrap(self.current_store).map_err(|_| HostError::StoreStillShared)?;
        store.dispose(run_gc).await?;

        Ok(ShutdownOutcome { publish, performance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use build_manifest::FileRecord;
    use cache_miss_analyzer::CacheMissKind;
    use event_ingress::{encode_event, ExecutionEvent, PipCacheMiss};
    use fingerprint_store::{ContentHash, PipId};
    use runtime_analyzer::fakes::CollectingSink;
    use store_sync::FsArtifactCache;

    fn config_for(dir: &std::path::Path) -> FingerprintCoreConfig {
        FingerprintCoreConfig {
            fingerprint_store_directory: dir.join("store"),
            fingerprints_log_directory: dir.join("logs"),
            cache_miss_mode: CacheMissMode::Disabled,
            ..FingerprintCoreConfig::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_with_disabled_mode_needs_no_cache_or_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let host = FpCoreHost::bootstrap(
            config_for(dir.path()),
            "salt",
            Arc::new(CollectingSink::new()),
            None,
            None,
            None,
        )
        .await
        .unwrap();

        let snapshot = host.health();
        assert_eq!(snapshot.changed_pip_count, 0);
    }

    #[tokio::test]
    async fn custom_path_mode_without_a_directory_is_a_clear_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.cache_miss_mode = CacheMissMode::CustomPath;
        config.prior_store_directory = None;

        let err = FpCoreHost::bootstrap(config, "salt", Arc::new(CollectingSink::new()), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::MissingPriorStoreSource { .. }));
    }

    #[tokio::test]
    async fn ingesting_a_cache_miss_frame_is_visible_via_build_manifest_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let host = FpCoreHost::bootstrap(
            config_for(dir.path()),
            "salt",
            Arc::new(CollectingSink::new()),
            None,
            None,
            None,
        )
        .await
        .unwrap();

        let event = ExecutionEvent::PipCacheMiss(PipCacheMiss {
            pip_id: PipId(1),
            formatted_semi_stable_hash: "Pip1".to_string(),
            pip_unique_output_hash: None,
            kind: CacheMissKind::MissForCacheEntry,
        });
        let bytes = encode_event(&event, 0, 0).unwrap();
        let dispatched = host.ingest_bytes(&bytes).await.unwrap();
        assert_eq!(dispatched, 1);

        host.build_manifest.record(&[FileRecord {
            drop_name: "drop1".to_string(),
            relative_path: "a.txt".to_string(),
            azure_artifacts_hash: ContentHash::compute(&[b"a"]),
            build_manifest_hash: ContentHash::compute(&[b"m"]),
        }]);
        let list = host.try_generate_build_manifest("drop1").unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_publishes_and_disposes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let host = FpCoreHost::bootstrap(
            config_for(dir.path()),
            "salt",
            Arc::new(CollectingSink::new()),
            None,
            None,
            None,
        )
        .await
        .unwrap();

        let cache = FsArtifactCache::new(cache_dir.path()).unwrap();
        let outcome = host.shutdown(&cache, "main", "salt", true).await.unwrap();
        assert!(outcome.performance.is_object());
    }
}
