//! Batching queue (§4.5): an in-process single-consumer queue that
//! accumulates analysis results; a worker drains it every `interval` or
//! once a batch of `batch_size` is ready, whichever comes first, and
//! serializes records into `{ "CacheMissAnalysisResults": { ... } }`
//! envelopes bounded by `max_log_size` bytes.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use cache_miss_analyzer::CacheMissAnalysisDetail;
use fingerprint_store::PipId;

pub struct BatchRecord {
    pub pip_id: PipId,
    pub detail: CacheMissAnalysisDetail,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub max_log_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            batch_size: 100,
            // `fpcore-daemon`'s `aria_individual_message_size_limit_bytes`
            // default; kept here too so the batcher has a sane bound when
            // constructed directly.
            max_log_size: 32 * 1024,
        }
    }
}

/// Where drained envelopes go. A real deployment points this at a
/// telemetry backend (explicitly out of scope here, §1); tests use
/// [`crate::fakes::CollectingSink`].
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn emit(&self, envelope: serde_json::Value);
}

pub fn spawn_batch_worker(
    config: BatchConfig,
    sink: std::sync::Arc<dyn TelemetrySink>,
) -> (mpsc::UnboundedSender<BatchRecord>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_worker(rx, config, sink));
    (tx, handle)
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<BatchRecord>,
    config: BatchConfig,
    sink: std::sync::Arc<dyn TelemetrySink>,
) {
    let mut buffer = Vec::new();
    let mut ticker = tokio::time::interval(config.interval);
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(record) => {
                        buffer.push(record);
                        if buffer.len() >= config.batch_size {
                            drain_and_emit(&mut buffer, config.max_log_size, sink.as_ref()).await;
                        }
                    }
                    None => {
                        drain_and_emit(&mut buffer, config.max_log_size, sink.as_ref()).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                drain_and_emit(&mut buffer, config.max_log_size, sink.as_ref()).await;
            }
        }
    }
}

async fn drain_and_emit(buffer: &mut Vec<BatchRecord>, max_log_size: usize, sink: &dyn TelemetrySink) {
    if buffer.is_empty() {
        return;
    }
    let records = std::mem::take(buffer);
    for envelope in build_envelopes(records, max_log_size) {
        sink.emit(envelope).await;
    }
}

enum EnvelopeValue {
    Full(serde_json::Value),
    Truncated(String),
}

/// Pure byte-size-bounded envelope builder (§4.5), split out from the
/// worker loop so it can be exercised without a running runtime.
pub fn build_envelopes(records: Vec<BatchRecord>, max_log_size: usize) -> Vec<serde_json::Value> {
    let mut envelopes = Vec::new();
    let mut current: Vec<(String, EnvelopeValue)> = Vec::new();
    let mut current_size = 0usize;

    for record in records {
        let name = record.pip_id.0.to_string();
        let serialized = serde_json::to_string(&record.detail).unwrap_or_default();
        let entry_size = name.len() + serialized.len();

        if !current.is_empty() && current_size + entry_size > max_log_size {
            envelopes.push(render_envelope(std::mem::take(&mut current)));
            current_size = 0;
        }

        if entry_size > max_log_size {
            let half = max_log_size / 2;
            let truncated = truncate_middle(&serialized, half);
            envelopes.push(render_envelope(vec![(name, EnvelopeValue::Truncated(truncated))]));
            continue;
        }

        current_size += entry_size;
        current.push((name, EnvelopeValue::Full(serde_json::from_str(&serialized).unwrap_or(serde_json::Value::Null))));
    }

    if !current.is_empty() {
        envelopes.push(render_envelope(current));
    }

    envelopes
}

/// Slices `s` down to a `half`-byte prefix and a `half`-byte suffix,
/// snapping both cut points inward to the nearest char boundary so a
/// multibyte UTF-8 sequence (e.g. a non-ASCII path in a diff reason)
/// straddling `half` never splits a character mid-byte.
fn truncate_middle(s: &str, half: usize) -> String {
    if s.len() <= half * 2 {
        return s.to_string();
    }
    let prefix_end = floor_char_boundary(s, half);
    let suffix_start = ceil_char_boundary(s, s.len() - half);
    format!("{}[...]{}", &s[..prefix_end], &s[suffix_start..])
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn render_envelope(entries: Vec<(String, EnvelopeValue)>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in entries {
        let value = match value {
            EnvelopeValue::Full(v) => v,
            EnvelopeValue::Truncated(s) => serde_json::Value::String(s),
        };
        map.insert(key, value);
    }
    serde_json::json!({ "CacheMissAnalysisResults": map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_miss_analyzer::Classification;
    use fingerprint_store::CacheMissKind;

    fn record(pip: u64, reason: &str) -> BatchRecord {
        BatchRecord {
            pip_id: PipId(pip),
            detail: CacheMissAnalysisDetail {
                actual_miss_type: CacheMissKind::MissForCacheEntry,
                reason_from_analysis: reason.to_string(),
                info: None,
            },
        }
    }

    #[test]
    fn small_batch_fits_in_one_envelope() {
        let envelopes = build_envelopes(vec![record(1, "a"), record(2, "b")], 1_000_000);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(
            envelopes[0]["CacheMissAnalysisResults"].as_object().unwrap().len(),
            2
        );
    }

    #[test]
    fn oversized_single_record_is_emitted_alone_truncated() {
        let huge_reason = "x".repeat(1000);
        let envelopes = build_envelopes(vec![record(1, &huge_reason)], 100);
        assert_eq!(envelopes.len(), 1);
        let value = &envelopes[0]["CacheMissAnalysisResults"]["1"];
        let text = value.as_str().unwrap();
        assert!(text.contains("[...]"));
        assert!(text.len() < huge_reason.len());
    }

    #[test]
    fn truncate_middle_snaps_to_char_boundaries_instead_of_panicking() {
        // Every char is 2 bytes, so byte offset 51 (an odd `half`) falls
        // mid-character on both the prefix and suffix cut points.
        let s = "é".repeat(200);
        let truncated = truncate_middle(&s, 51);
        assert!(truncated.contains("[...]"));
        assert!(truncated.len() < s.len());
    }

    #[test]
    fn oversized_record_with_multibyte_reason_does_not_panic() {
        // A Unicode path inside the diff reason (e.g. from a non-ASCII
        // workspace directory) lands as raw multibyte UTF-8 in the
        // serialized detail, not a `\u` escape.
        let huge_reason = "café/dossier/".repeat(200);
        let envelopes = build_envelopes(vec![record(1, &huge_reason)], 100);
        assert_eq!(envelopes.len(), 1);
        let value = &envelopes[0]["CacheMissAnalysisResults"]["1"];
        let text = value.as_str().unwrap();
        assert!(text.contains("[...]"));
    }

    #[test]
    fn exceeding_max_log_size_closes_and_starts_a_new_envelope() {
        let records = vec![record(1, &"a".repeat(40)), record(2, &"b".repeat(40)), record(3, &"c".repeat(40))];
        let envelopes = build_envelopes(records, 60);
        assert!(envelopes.len() >= 2);
        for envelope in &envelopes {
            assert!(!envelope["CacheMissAnalysisResults"]
                .as_object()
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn empty_input_produces_no_envelopes() {
        assert!(build_envelopes(vec![], 1000).is_empty());
    }

    #[tokio::test]
    async fn worker_drains_on_batch_size_without_waiting_for_interval() {
        use std::sync::Mutex;

        struct Collecting(Mutex<Vec<serde_json::Value>>);
        #[async_trait]
        impl TelemetrySink for Collecting {
            async fn emit(&self, envelope: serde_json::Value) {
                self.0.lock().unwrap().push(envelope);
            }
        }

        let sink = std::sync::Arc::new(Collecting(Mutex::new(Vec::new())));
        let config = BatchConfig {
            interval: Duration::from_secs(3600),
            batch_size: 2,
            max_log_size: 1_000_000,
        };
        let (tx, handle) = spawn_batch_worker(config, sink.clone());

        tx.send(record(1, "one")).unwrap();
        tx.send(record(2, "two")).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        drop(tx);
        let _ = handle.await;
    }
}
