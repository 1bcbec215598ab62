//! Hierarchical operation counters (C9), used as a cross-cutting context
//! passed explicitly into the rest of the core rather than the source's
//! process-wide singleton ("re-express as an explicit
//! context passed into each component; tests create an isolated tracker
//! per test"). Grounded on `aivcs_core::metrics::Metrics`'s atomic-counter
//! + `flush()` idiom, generalized from a flat fixed counter set to a tree
//! keyed by `(parentCounter, kind)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use fingerprint_store::PipId;

/// Identity of one node in the counter tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterId(usize);

struct CounterNode {
    parent: Option<CounterId>,
    kind: String,
    occurrences: AtomicU64,
    total_duration: AtomicU64,
    /// Number of in-flight operations under this node, including ones
    /// bubbled up from descendants — this is the refcount that "prevents
    /// parent completion before children complete").
    active: AtomicU64,
}

struct OutstandingOp {
    counter: CounterId,
    kind: String,
    pip_id: Option<PipId>,
    artifact: Option<String>,
    start: Instant,
}

struct Inner {
    counters: Vec<CounterNode>,
    index: HashMap<(Option<CounterId>, String), CounterId>,
    outstanding: HashMap<u64, OutstandingOp>,
    next_op_id: u64,
}

/// Explicit, per-build (or per-test) context for hierarchical operation
/// counters. Reads of an existing counter's occurrence/duration totals are
/// lock-free (atomics); only inserting a brand-new `(parent, kind)` pair
/// takes the write lock, matching the dump path's locking discipline.
pub struct OperationTracker {
    inner: RwLock<Inner>,
    min_dump_interval: Duration,
    last_dump: Mutex<Option<Instant>>,
}

impl OperationTracker {
    pub fn new(min_dump_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                counters: Vec::new(),
                index: HashMap::new(),
                outstanding: HashMap::new(),
                next_op_id: 0,
            }),
            min_dump_interval,
            last_dump: Mutex::new(None),
        }
    }

    fn counter_for(&self, parent: Option<CounterId>, kind: &str) -> CounterId {
        {
            let inner = self.inner.read().unwrap();
            if let Some(id) = inner.index.get(&(parent, kind.to_string())) {
                return *id;
            }
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(id) = inner.index.get(&(parent, kind.to_string())) {
            return *id;
        }
        let id = CounterId(inner.counters.len());
        inner.counters.push(CounterNode {
            parent,
            kind: kind.to_string(),
            occurrences: AtomicU64::new(0),
            total_duration: AtomicU64::new(0),
            active: AtomicU64::new(0),
        });
        inner.index.insert((parent, kind.to_string()), id);
        id
    }

    fn bump_active(&self, counter: CounterId, delta: i64) {
        let inner = self.inner.read().unwrap();
        let mut cursor = Some(counter);
        while let Some(id) = cursor {
            let node = &inner.counters[id.0];
            if delta >= 0 {
                node.active.fetch_add(delta as u64, Ordering::SeqCst);
            } else {
                node.active.fetch_sub((-delta) as u64, Ordering::SeqCst);
            }
            cursor = node.parent;
        }
    }

    /// Begin one operation of `kind` under `parent` (`None` for a root
    /// operation), optionally associated with a pip and/or artifact id.
    /// The returned handle records duration and decrements the refcount
    /// when dropped.
    pub fn start(
        &self,
        parent: Option<CounterId>,
        kind: impl Into<String>,
        pip_id: Option<PipId>,
        artifact: Option<String>,
    ) -> OperationHandle<'_> {
        let kind = kind.into();
        let counter = self.counter_for(parent, &kind);
        self.bump_active(counter, 1);

        let op_id = {
            let mut inner = self.inner.write().unwrap();
            let op_id = inner.next_op_id;
            inner.next_op_id += 1;
            inner.outstanding.insert(
                op_id,
                OutstandingOp {
                    counter,
                    kind: kind.clone(),
                    pip_id,
                    artifact,
                    start: Instant::now(),
                },
            );
            op_id
        };

        OperationHandle {
            tracker: self,
            counter,
            op_id,
            finished: false,
        }
    }

    /// Whether `counter` (and everything under it) has no in-flight
    /// operations — i.e. its parent may complete.
    pub fn is_quiescent(&self, counter: CounterId) -> bool {
        let inner = self.inner.read().unwrap();
        inner.counters[counter.0].active.load(Ordering::SeqCst) == 0
    }

    fn finish(&self, counter: CounterId, op_id: u64, duration: Duration) {
        {
            let inner = self.inner.read().unwrap();
            let node = &inner.counters[counter.0];
            node.occurrences.fetch_add(1, Ordering::SeqCst);
            node.total_duration
                .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        }
        self.bump_active(counter, -1);
        let mut inner = self.inner.write().unwrap();
        inner.outstanding.remove(&op_id);
    }

    /// Emit a performance-JSON dump (root-sorted subtrees of durations and
    /// occurrences, plus the top-N outstanding operations when
    /// `top_outstanding` is set) via `tracing::info!`, throttled so two
    /// calls within `min_dump_interval` only emit once. Returns the
    /// rendered value even when throttled (useful for tests), but only
    /// logs it when the throttle allows.
    pub fn dump_performance_json(&self, top_outstanding: Option<usize>) -> serde_json::Value {
        let report = self.render(top_outstanding);

        let mut last = self.last_dump.lock().unwrap();
        let now = Instant::now();
        let should_emit = match *last {
            Some(prev) => now.duration_since(prev) >= self.min_dump_interval,
            None => true,
        };
        if should_emit {
            *last = Some(now);
            tracing::info!(performance = %report, "operation tracker performance dump");
        }
        report
    }

    fn render(&self, top_outstanding: Option<usize>) -> serde_json::Value {
        let inner = self.inner.read().unwrap();

        let mut roots: Vec<CounterId> = inner
            .counters
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| CounterId(i))
            .collect();
        roots.sort_by(|a, b| inner.counters[a.0].kind.cmp(&inner.counters[b.0].kind));

        let subtrees: Vec<serde_json::Value> =
            roots.iter().map(|r| self.render_node(&inner, *r)).collect();

        let mut report = serde_json::json!({ "subtrees": subtrees });

        if let Some(n) = top_outstanding {
            let mut ops: Vec<&OutstandingOp> = inner.outstanding.values().collect();
            ops.sort_by(|a, b| b.start.elapsed().cmp(&a.start.elapsed()));
            ops.truncate(n);
            let top: Vec<serde_json::Value> = ops
                .iter()
                .map(|op| {
                    serde_json::json!({
                        "kind": op.kind,
                        "pipId": op.pip_id.map(|p| p.0),
                        "artifact": op.artifact,
                        "elapsedMs": op.start.elapsed().as_millis() as u64,
                    })
                })
                .collect();
            report["topOutstanding"] = serde_json::Value::Array(top);
        }

        report
    }

    fn render_node(&self, inner: &Inner, id: CounterId) -> serde_json::Value {
        let node = &inner.counters[id.0];
        let mut children: Vec<CounterId> = inner
            .counters
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent == Some(id))
            .map(|(i, _)| CounterId(i))
            .collect();
        children.sort_by(|a, b| inner.counters[a.0].kind.cmp(&inner.counters[b.0].kind));

        serde_json::json!({
            "kind": node.kind,
            "occurrences": node.occurrences.load(Ordering::SeqCst),
            "totalDurationMs": node.total_duration.load(Ordering::SeqCst),
            "children": children.into_iter().map(|c| self.render_node(inner, c)).collect::<Vec<_>>(),
        })
    }
}

/// RAII handle for one in-flight operation. Drop (or explicit [`Self::finish`])
/// records its duration against the owning counter and decrements the
/// parent-blocking refcount.
pub struct OperationHandle<'a> {
    tracker: &'a OperationTracker,
    counter: CounterId,
    op_id: u64,
    finished: bool,
}

impl<'a> OperationHandle<'a> {
    pub fn counter_id(&self) -> CounterId {
        self.counter
    }

    pub fn finish(mut self) {
        self.finish_mut();
    }

    fn finish_mut(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let started = self
            .tracker
            .inner
            .read()
            .unwrap()
            .outstanding
            .get(&self.op_id)
            .map(|op| op.start);
        if let Some(start) = started {
            self.tracker.finish(self.counter, self.op_id, start.elapsed());
        }
    }
}

impl<'a> Drop for OperationHandle<'a> {
    fn drop(&mut self) {
        self.finish_mut();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub kind: String,
    pub occurrences: u64,
    pub total_duration_ms: u64,
}

impl OperationTracker {
    /// Point-in-time snapshot of one counter, for tests that don't want to
    /// parse the full JSON dump.
    pub fn snapshot(&self, counter: CounterId) -> CounterSnapshot {
        let inner = self.inner.read().unwrap();
        let node = &inner.counters[counter.0];
        CounterSnapshot {
            kind: node.kind.clone(),
            occurrences: node.occurrences.load(Ordering::SeqCst),
            total_duration_ms: node.total_duration.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrence_and_duration_accumulate() {
        let tracker = OperationTracker::new(Duration::from_secs(60));
        let op1 = tracker.start(None, "Publish", None, None);
        drop(op1);
        let op2 = tracker.start(None, "Publish", None, None);
        drop(op2);

        let counter = tracker.counter_for(None, "Publish");
        let snap = tracker.snapshot(counter);
        assert_eq!(snap.occurrences, 2);
    }

    #[test]
    fn parent_refcount_blocks_completion_until_children_finish() {
        let tracker = OperationTracker::new(Duration::from_secs(60));
        let parent_counter = tracker.counter_for(None, "Build");
        let parent = tracker.start(None, "Build", None, None);
        let child = tracker.start(Some(parent.counter_id()), "Compile", None, None);

        assert!(!tracker.is_quiescent(parent_counter));
        drop(child);
        assert!(tracker.is_quiescent(parent_counter));
        drop(parent);
    }

    #[test]
    fn dump_is_throttled_but_always_returns_a_report() {
        let tracker = OperationTracker::new(Duration::from_secs(3600));
        let op = tracker.start(None, "Publish", None, None);
        drop(op);

        let first = tracker.dump_performance_json(Some(5));
        let second = tracker.dump_performance_json(Some(5));
        assert_eq!(first["subtrees"][0]["kind"], "Publish");
        assert_eq!(second["subtrees"][0]["occurrences"], 1);
    }

    #[test]
    fn outstanding_operations_are_tracked_until_finished() {
        let tracker = OperationTracker::new(Duration::from_secs(60));
        let op = tracker.start(None, "Materialize", Some(PipId(9)), Some("out.dll".to_string()));
        let report = tracker.dump_performance_json(Some(5));
        assert_eq!(report["topOutstanding"][0]["pipId"], 9);
        drop(op);
        let report = tracker.dump_performance_json(Some(5));
        assert!(report["topOutstanding"].as_array().unwrap().is_empty());
    }
}
