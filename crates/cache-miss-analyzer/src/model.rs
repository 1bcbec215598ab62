use serde::{Deserialize, Serialize};

use fingerprint_store::{CacheMissKind, PipId};

/// The cache-miss event the analyzer is asked to explain.
#[derive(Debug, Clone)]
pub struct MissInfo {
    pub pip_id: PipId,
    pub formatted_semi_stable_hash: String,
    pub pip_unique_output_hash: Option<fingerprint_store::ContentHash>,
    pub cache_miss_kind: CacheMissKind,
}

/// Diff rendering the caller asked for. Both are derived from the same
/// [`fp_tree::FingerprintAspectDiff`] — `TreeDiff` renders its text report,
/// `CustomJson` captures the same fields as a JSON value instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFormat {
    CustomJson,
    TreeDiff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffRendering {
    Text(String),
    Json(serde_json::Value),
}

/// Final classification of why a pip missed (or didn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    NoMiss,
    DataMiss,
    OutputMiss,
    InvalidDescriptors,
    ArtificialMiss,
    Invalid,
    MissingFromOldBuild,
    MissingFromNewBuild,
    WeakFingerprintMismatch,
    PathSetHashMismatch,
    StrongFingerprintMismatch,
    UncacheablePip,
    /// The `AnalyzerInternalFailure` kind: an unexpected failure occurred
    /// while diffing. Logged and swallowed — never propagated to the
    /// caller as an error, since cache-miss analysis must never fail the
    /// build.
    AnalyzerInternalFailure,
}

/// `formattedSemiStableHash` disagreeing between the old and new session is
/// noted alongside whatever mismatch classification is ultimately reported,
/// rather than being a classification of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemiStableHashChange {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MismatchInfo {
    MissingOutputs { missed_outputs: Vec<String> },
    WeakFingerprintMismatch { diff: DiffRendering },
    PathSetHashMismatch { diff: DiffRendering },
    StrongFingerprintMismatch { diff: DiffRendering },
    UncacheablePip { explanation: String },
}

/// `detail.info` as emitted to telemetry: the mismatch-specific payload
/// (flattened, so it still serializes as `{"WeakFingerprintMismatch": {..}}`
/// etc.) with the semi-stable-hash annotation as a `SemiStableHash` sibling
/// key per §9(c) — kept as an annotation on whatever mismatch is reported,
/// never a distinct classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MismatchInfoEnvelope {
    #[serde(flatten)]
    pub mismatch: MismatchInfo,
    #[serde(rename = "SemiStableHash", skip_serializing_if = "Option::is_none", default)]
    pub semi_stable_hash: Option<SemiStableHashChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMissAnalysisDetail {
    pub actual_miss_type: CacheMissKind,
    pub reason_from_analysis: String,
    pub info: Option<MismatchInfoEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMissAnalysisDetailAndResult {
    pub result: Classification,
    pub detail: CacheMissAnalysisDetail,
}

impl CacheMissAnalysisDetail {
    pub(crate) fn plain(actual_miss_type: CacheMissKind, reason: impl Into<String>) -> Self {
        Self {
            actual_miss_type,
            reason_from_analysis: reason.into(),
            info: None,
        }
    }

    /// Convenience accessor for the `SemiStableHash` annotation, for
    /// callers that only care whether the pip's identity shifted between
    /// builds and not which mismatch carried the annotation.
    pub fn semi_stable_hash_changed(&self) -> Option<&SemiStableHashChange> {
        self.info.as_ref().and_then(|envelope| envelope.semi_stable_hash.as_ref())
    }
}
