//! Runtime coordinator (C5): receives execution-log events, decides per
//! pip whether to run cache-miss analysis (budgeted, suppressed under the
//! transitively-changed frontier), and batches results to a telemetry
//! sink under a byte-size ceiling (§4.5).
//!
//! Grounded on `aivcs_core::event_adapter`'s event-to-domain-action
//! bridging for the `EventConsumer` implementation, and on `aivcs_core::
//! metrics::Metrics`'s atomic-counter discipline for the eligibility
//! budget counter. The prior-store handle is owned outright rather than
//! shared (`Arc`, not co-owned) per §9's design note that it "must not
//! outlive the analyzer" — `dispose` is the only place that ever consumes
//! it.

mod batch;
mod dependents;
pub mod error;
pub mod fakes;
mod session;

pub use batch::{BatchConfig, BatchRecord, TelemetrySink};
pub use dependents::{DependentsProvider, NoDependents};
pub use error::{Result, RuntimeError};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use build_manifest::{BuildManifestAggregator, FileRecord as ManifestFileRecord};
use cache_miss_analyzer::{DiffFormat, FingerprintSession, MissInfo, StoreSession};
use event_ingress::{
    event_id, DirectoryMembershipHashed, EventConsumer, ExecutionEvent, FingerprintComputationKind,
    PipCacheMiss, ProcessFingerprintComputed, RecordFileForBuildManifest,
};
use fingerprint_store::{CacheMissKind, ContentHash, FingerprintStoreEntry, PipFingerprintKeys, PipId, Store};
use operation_tracker::OperationTracker;
use session::NullSession;

struct PendingMiss {
    formatted_semi_stable_hash: String,
    pip_unique_output_hash: Option<ContentHash>,
    kind: CacheMissKind,
}

pub struct RuntimeAnalyzerConfig {
    pub max_cache_miss_can_perform: u64,
    pub analyze_all_pips: bool,
    /// §9(b): legacy builds always mark downstream changed even for
    /// `MissForProcessConfiguredUncacheable`. Default (false) is the
    /// intended, newer exemption behavior.
    pub legacy_mark_uncacheable_downstream: bool,
    pub diff_format: DiffFormat,
    pub log_dir: PathBuf,
    pub batch: BatchConfig,
}

/// The execution-log event coordinator. One instance per build.
pub struct RuntimeAnalyzer {
    current_store: Arc<Store>,
    prior_store: Option<Arc<Store>>,
    downloaded_prior_store_dir: Option<PathBuf>,
    log_dir: PathBuf,

    num_performed: AtomicU64,
    max_cache_miss_can_perform: u64,
    analyze_all_pips: bool,
    legacy_mark_uncacheable_downstream: bool,
    diff_format: DiffFormat,

    pending_misses: DashMap<PipId, PendingMiss>,
    changed_pips: DashSet<PipId>,
    dependents: Arc<dyn DependentsProvider>,

    build_manifest: Arc<BuildManifestAggregator>,
    operation_tracker: Arc<OperationTracker>,

    batch_tx: Option<tokio::sync::mpsc::UnboundedSender<BatchRecord>>,
    worker_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RuntimeAnalyzer {
    pub fn new(
        current_store: Arc<Store>,
        prior_store: Option<Arc<Store>>,
        downloaded_prior_store_dir: Option<PathBuf>,
        dependents: Arc<dyn DependentsProvider>,
        build_manifest: Arc<BuildManifestAggregator>,
        operation_tracker: Arc<OperationTracker>,
        sink: Arc<dyn TelemetrySink>,
        config: RuntimeAnalyzerConfig,
    ) -> Self {
        let (batch_tx, worker_handle) = batch::spawn_batch_worker(config.batch, sink);
        Self {
            current_store,
            prior_store,
            downloaded_prior_store_dir,
            log_dir: config.log_dir,
            num_performed: AtomicU64::new(0),
            max_cache_miss_can_perform: config.max_cache_miss_can_perform,
            analyze_all_pips: config.analyze_all_pips,
            legacy_mark_uncacheable_downstream: config.legacy_mark_uncacheable_downstream,
            diff_format: config.diff_format,
            pending_misses: DashMap::new(),
            changed_pips: DashSet::new(),
            dependents,
            build_manifest,
            operation_tracker,
            batch_tx: Some(batch_tx),
            worker_handle: Some(worker_handle),
        }
    }

    fn new_session(&self) -> Arc<dyn FingerprintSession> {
        Arc::new(StoreSession::new(self.current_store.clone(), self.log_dir.clone()))
    }

    fn old_session(&self) -> Arc<dyn FingerprintSession> {
        match &self.prior_store {
            Some(store) => Arc::new(StoreSession::new(store.clone(), self.log_dir.clone())),
            None => Arc::new(NullSession),
        }
    }

    /// Eligibility predicate (§4.5). Increments the budget counter
    /// unconditionally, matching the order the spec lists the three
    /// checks in.
    fn is_eligible(&self, pip_id: PipId) -> bool {
        let prior = self.num_performed.fetch_add(1, Ordering::SeqCst);
        if prior >= self.max_cache_miss_can_perform {
            return false;
        }
        if !self.pending_misses.contains_key(&pip_id) {
            return false;
        }
        if !self.analyze_all_pips && self.changed_pips.contains(&pip_id) {
            return false;
        }
        true
    }

    fn mark_changed_frontier(&self, pip_id: PipId, miss_kind: &CacheMissKind) {
        if matches!(miss_kind, CacheMissKind::MissForProcessConfiguredUncacheable)
            && !self.legacy_mark_uncacheable_downstream
        {
            return;
        }
        let mut stack = self.dependents.dependents_of(pip_id);
        while let Some(next) = stack.pop() {
            if self.changed_pips.insert(next) {
                stack.extend(self.dependents.dependents_of(next));
            }
        }
    }

    async fn run_analysis_if_eligible(&self, pip_id: PipId) {
        if !self.is_eligible(pip_id) {
            return;
        }
        let Some((_, pending)) = self.pending_misses.remove(&pip_id) else {
            return;
        };

        let miss_info = MissInfo {
            pip_id,
            formatted_semi_stable_hash: pending.formatted_semi_stable_hash,
            pip_unique_output_hash: pending.pip_unique_output_hash,
            cache_miss_kind: pending.kind.clone(),
        };

        let old = self.old_session();
        let new = self.new_session();
        let op = self.operation_tracker.start(None, "CacheMissAnalysis", Some(pip_id), None);
        let result = cache_miss_analyzer::analyze(&miss_info, old.as_ref(), new.as_ref(), self.diff_format).await;
        op.finish();

        self.mark_changed_frontier(pip_id, &pending.kind);

        if let Some(tx) = &self.batch_tx {
            let _ = tx.send(BatchRecord {
                pip_id,
                detail: result.detail,
            });
        }
    }

    async fn upsert_entry(&self, entry: FingerprintStoreEntry, store_path_set: bool) {
        if let Err(err) = self.current_store.put_fingerprint_store_entry(entry, store_path_set).await {
            tracing::warn!(error = %err, "failed to upsert fingerprint store entry");
        }
    }

    async fn handle_process_fingerprint_computed(&self, event: ProcessFingerprintComputed) {
        match event.kind {
            FingerprintComputationKind::CacheCheck => {
                let mut any_miss = false;
                let mut new_path_set_hash = None;
                for computation in &event.strong_fp_computations {
                    if computation.is_hit {
                        let entry = FingerprintStoreEntry {
                            formatted_semi_stable_hash: event.formatted_semi_stable_hash.clone(),
                            keys: PipFingerprintKeys {
                                weak_fingerprint: event.weak_fingerprint,
                                strong_fingerprint: computation.strong_fingerprint,
                                path_set_hash: computation.path_set_hash,
                            },
                            weak_fingerprint_inputs: event.weak_fingerprint_inputs.clone(),
                            strong_fingerprint_inputs: computation.strong_fingerprint_inputs.clone(),
                            path_set_inputs: computation.path_set_inputs.clone(),
                        };
                        let store_path_set = !self
                            .current_store
                            .contains_content_hash(&computation.path_set_hash.to_hex())
                            .await
                            .unwrap_or(false);
                        if store_path_set {
                            new_path_set_hash = Some(computation.path_set_hash);
                        }
                        self.upsert_entry(entry, store_path_set).await;
                    } else {
                        any_miss = true;
                    }
                }
                let _ = new_path_set_hash;
                if any_miss {
                    self.run_analysis_if_eligible(event.pip_id).await;
                }
            }
            FingerprintComputationKind::Execution => {
                if let Some(computation) = event.strong_fp_computations.first() {
                    let entry = FingerprintStoreEntry {
                        formatted_semi_stable_hash: event.formatted_semi_stable_hash.clone(),
                        keys: PipFingerprintKeys {
                            weak_fingerprint: event.weak_fingerprint,
                            strong_fingerprint: computation.strong_fingerprint,
                            path_set_hash: computation.path_set_hash,
                        },
                        weak_fingerprint_inputs: event.weak_fingerprint_inputs.clone(),
                        strong_fingerprint_inputs: computation.strong_fingerprint_inputs.clone(),
                        path_set_inputs: computation.path_set_inputs.clone(),
                    };
                    self.upsert_entry(entry, true).await;
                }
                self.run_analysis_if_eligible(event.pip_id).await;
            }
        }
    }

    async fn handle_pip_cache_miss(&self, event: PipCacheMiss) {
        self.pending_misses.insert(
            event.pip_id,
            PendingMiss {
                formatted_semi_stable_hash: event.formatted_semi_stable_hash,
                pip_unique_output_hash: event.pip_unique_output_hash,
                kind: event.kind,
            },
        );
    }

    async fn handle_directory_membership_hashed(&self, event: DirectoryMembershipHashed) {
        if let Err(err) = self
            .current_store
            .put_content_hash(event.directory_fingerprint, serde_json::json!(event.members))
            .await
        {
            tracing::warn!(error = %err, "failed to record directory membership hash");
        }
    }

    async fn handle_record_file_for_build_manifest(&self, event: RecordFileForBuildManifest) {
        let records: Vec<ManifestFileRecord> = event
            .records
            .into_iter()
            .map(|r| ManifestFileRecord {
                drop_name: r.drop_name,
                relative_path: r.relative_path,
                azure_artifacts_hash: r.azure_artifacts_hash,
                build_manifest_hash: r.build_manifest_hash,
            })
            .collect();
        self.build_manifest.record(&records);
    }

    /// Drain the batching queue synchronously, then dispose the prior-
    /// store snapshot, then delete the downloaded prior-store directory
    /// (§4.5's shutdown sequence).
    pub async fn dispose(mut self) -> Result<()> {
        drop(self.batch_tx.take());
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.await;
        }
        if let Some(prior) = self.prior_store.take() {
            match Arc::try_unwrap(prior) {
                Ok(store) => store.dispose(false).await?,
                Err(_) => tracing::warn!("prior store still referenced at dispose time"),
            }
        }
        if let Some(dir) = self.downloaded_prior_store_dir.take() {
            if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    return Err(RuntimeError::Io(err));
                }
            }
        }
        Ok(())
    }

    pub fn changed_pip_count(&self) -> usize {
        self.changed_pips.len()
    }

    pub fn is_changed(&self, pip_id: PipId) -> bool {
        self.changed_pips.contains(&pip_id)
    }
}

#[async_trait]
impl EventConsumer for RuntimeAnalyzer {
    fn handles(&self, event_id: u8, _worker_id: u32) -> bool {
        matches!(
            event_id,
            event_id::PROCESS_FINGERPRINT_COMPUTED
                | event_id::PIP_CACHE_MISS
                | event_id::DIRECTORY_MEMBERSHIP_HASHED
                | event_id::RECORD_FILE_FOR_BUILD_MANIFEST
        )
    }

    async fn consume(&self, event: &ExecutionEvent, _worker_id: u32) {
        match event.clone() {
            ExecutionEvent::ProcessFingerprintComputed(e) => self.handle_process_fingerprint_computed(e).await,
            ExecutionEvent::PipCacheMiss(e) => self.handle_pip_cache_miss(e).await,
            ExecutionEvent::DirectoryMembershipHashed(e) => self.handle_directory_membership_hashed(e).await,
            ExecutionEvent::RecordFileForBuildManifest(e) => self.handle_record_file_for_build_manifest(e).await,
            ExecutionEvent::Opaque { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use event_ingress::StrongFingerprintComputation;
    use fingerprint_store::StoreMode;
    use std::collections::HashMap;
    use std::time::Duration;

    fn make_store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), StoreMode::ReadWrite, ChronoDuration::minutes(30)).unwrap();
        (dir, Arc::new(store))
    }

    struct StaticDependents(HashMap<PipId, Vec<PipId>>);
    impl DependentsProvider for StaticDependents {
        fn dependents_of(&self, pip: PipId) -> Vec<PipId> {
            self.0.get(&pip).cloned().unwrap_or_default()
        }
    }

    fn analyzer(
        current: Arc<Store>,
        dependents: Arc<dyn DependentsProvider>,
        max_cache_miss_can_perform: u64,
        analyze_all_pips: bool,
    ) -> (RuntimeAnalyzer, Arc<fakes::CollectingSink>, tempfile::TempDir) {
        let log_dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(fakes::CollectingSink::new());
        let runtime = RuntimeAnalyzer::new(
            current,
            None,
            None,
            dependents,
            Arc::new(BuildManifestAggregator::new()),
            Arc::new(OperationTracker::new(Duration::from_secs(60))),
            sink.clone(),
            RuntimeAnalyzerConfig {
                max_cache_miss_can_perform,
                analyze_all_pips,
                legacy_mark_uncacheable_downstream: false,
                diff_format: DiffFormat::TreeDiff,
                log_dir: log_dir.path().to_path_buf(),
                batch: BatchConfig {
                    interval: Duration::from_secs(3600),
                    batch_size: 1,
                    max_log_size: 1_000_000,
                },
            },
        );
        (runtime, sink, log_dir)
    }

    fn miss_event(pip: u64) -> ExecutionEvent {
        ExecutionEvent::PipCacheMiss(PipCacheMiss {
            pip_id: PipId(pip),
            formatted_semi_stable_hash: format!("Pip{pip}"),
            pip_unique_output_hash: None,
            kind: CacheMissKind::MissForCacheEntry,
        })
    }

    fn fingerprint_computed_event(pip: u64) -> ExecutionEvent {
        ExecutionEvent::ProcessFingerprintComputed(ProcessFingerprintComputed {
            kind: FingerprintComputationKind::Execution,
            pip_id: PipId(pip),
            formatted_semi_stable_hash: format!("Pip{pip}"),
            pip_unique_output_hash: None,
            weak_fingerprint: ContentHash::compute(&[b"weak"]),
            weak_fingerprint_inputs: serde_json::json!({}),
            strong_fp_computations: vec![StrongFingerprintComputation {
                strong_fingerprint: ContentHash::compute(&[b"strong"]),
                path_set_hash: ContentHash::compute(&[b"pathset"]),
                is_hit: false,
                strong_fingerprint_inputs: serde_json::json!({}),
                path_set_inputs: Some(serde_json::json!({})),
            }],
        })
    }

    #[tokio::test]
    async fn miss_then_execution_event_runs_analysis_and_batches_result() {
        let (_dir, store) = make_store();
        let (runtime, sink, _log_dir) = analyzer(store, Arc::new(NoDependents), 100, false);

        runtime.consume(&miss_event(1), 0).await;
        runtime.consume(&fingerprint_computed_event(1), 0).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.envelopes().len(), 1);
    }

    #[tokio::test]
    async fn pip_with_no_recorded_miss_is_ineligible() {
        let (_dir, store) = make_store();
        let (runtime, sink, _log_dir) = analyzer(store, Arc::new(NoDependents), 100, false);

        runtime.consume(&fingerprint_computed_event(2), 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.envelopes().is_empty());
    }

    #[tokio::test]
    async fn budget_exhaustion_blocks_further_analysis() {
        let (_dir, store) = make_store();
        let (runtime, sink, _log_dir) = analyzer(store, Arc::new(NoDependents), 0, false);

        runtime.consume(&miss_event(3), 0).await;
        runtime.consume(&fingerprint_computed_event(3), 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.envelopes().is_empty());
    }

    #[tokio::test]
    async fn changed_frontier_suppresses_already_visited_downstream_pips() {
        let (_dir, store) = make_store();
        let mut deps = HashMap::new();
        deps.insert(PipId(10), vec![PipId(11)]);
        let (runtime, sink, _log_dir) = analyzer(store, Arc::new(StaticDependents(deps)), 100, false);

        runtime.consume(&miss_event(10), 0).await;
        runtime.consume(&fingerprint_computed_event(10), 0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(runtime.is_changed(PipId(11)));

        runtime.consume(&miss_event(11), 0).await;
        runtime.consume(&fingerprint_computed_event(11), 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // pip 10's own analysis always runs; pip 11's does not because it
        // was already marked changed by pip 10's frontier propagation.
        assert_eq!(sink.envelopes().len(), 1);
    }

    #[tokio::test]
    async fn analyze_all_pips_override_ignores_changed_frontier() {
        let (_dir, store) = make_store();
        let mut deps = HashMap::new();
        deps.insert(PipId(20), vec![PipId(21)]);
        let (runtime, sink, _log_dir) = analyzer(store, Arc::new(StaticDependents(deps)), 100, true);

        runtime.consume(&miss_event(20), 0).await;
        runtime.consume(&fingerprint_computed_event(20), 0).await;
        runtime.consume(&miss_event(21), 0).await;
        runtime.consume(&fingerprint_computed_event(21), 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sink.envelopes().len(), 2);
    }

    #[tokio::test]
    async fn directory_membership_hashed_writes_content_hash() {
        let (_dir, store) = make_store();
        let (runtime, _sink, _log_dir) = analyzer(store.clone(), Arc::new(NoDependents), 100, false);

        let hash = ContentHash::compute(&[b"dir"]);
        runtime
            .consume(
                &ExecutionEvent::DirectoryMembershipHashed(DirectoryMembershipHashed {
                    directory_fingerprint: hash,
                    members: vec!["a".to_string(), "b".to_string()],
                    flags: vec![],
                    enumerate_pattern_regex: None,
                }),
                0,
            )
            .await;

        let value = store.try_get_content_hash_value(&hash.to_hex()).await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!(["a", "b"]));
    }

    #[tokio::test]
    async fn build_manifest_records_forward_to_aggregator() {
        let (_dir, store) = make_store();
        let manifest = Arc::new(BuildManifestAggregator::new());
        let log_dir = tempfile::tempdir().unwrap();
        let runtime = RuntimeAnalyzer::new(
            store,
            None,
            None,
            Arc::new(NoDependents),
            manifest.clone(),
            Arc::new(OperationTracker::new(Duration::from_secs(60))),
            Arc::new(fakes::CollectingSink::new()),
            RuntimeAnalyzerConfig {
                max_cache_miss_can_perform: 100,
                analyze_all_pips: false,
                legacy_mark_uncacheable_downstream: false,
                diff_format: DiffFormat::TreeDiff,
                log_dir: log_dir.path().to_path_buf(),
                batch: BatchConfig::default(),
            },
        );

        runtime
            .consume(
                &ExecutionEvent::RecordFileForBuildManifest(RecordFileForBuildManifest {
                    records: vec![event_ingress::BuildManifestFileRecord {
                        drop_name: "drop1".to_string(),
                        relative_path: "a/b.txt".to_string(),
                        azure_artifacts_hash: ContentHash::compute(&[b"h1"]),
                        build_manifest_hash: ContentHash::compute(&[b"h2"]),
                    }],
                }),
                0,
            )
            .await;

        let list = manifest.try_generate_build_manifest_file_list("drop1").unwrap();
        assert_eq!(list.len(), 1);
        runtime.dispose().await.unwrap();
    }
}
