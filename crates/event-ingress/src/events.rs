use serde::{Deserialize, Serialize};

use fingerprint_store::{CacheMissKind, ContentHash, PipId};

/// Wire-level event-id tags from §6's event list, in the order named
/// there. The four consumed event kinds get full typed payloads; the
/// remaining five are carried as opaque passthrough variants (§4.8's
/// "wire format of events beyond the ones the core consumes" non-goal).
pub mod event_id {
    pub const PROCESS_FINGERPRINT_COMPUTED: u8 = 1;
    pub const PIP_CACHE_MISS: u8 = 2;
    pub const DIRECTORY_MEMBERSHIP_HASHED: u8 = 3;
    pub const RECORD_FILE_FOR_BUILD_MANIFEST: u8 = 4;
    pub const PIP_EXECUTION_DIRECTORY_OUTPUTS: u8 = 5;
    pub const FILE_ARTIFACT_CONTENT_DECIDED: u8 = 6;
    pub const BUILD_SESSION_CONFIGURATION: u8 = 7;
    pub const BXL_INVOCATION: u8 = 8;
    pub const CACHE_MATERIALIZATION_ERROR: u8 = 9;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintComputationKind {
    CacheCheck,
    Execution,
}

/// One strong-fingerprint candidate considered for a pip's cache lookup
/// (or the one computed at execution time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrongFingerprintComputation {
    pub strong_fingerprint: ContentHash,
    pub path_set_hash: ContentHash,
    pub is_hit: bool,
    pub strong_fingerprint_inputs: serde_json::Value,
    pub path_set_inputs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessFingerprintComputed {
    pub kind: FingerprintComputationKind,
    pub pip_id: PipId,
    pub formatted_semi_stable_hash: String,
    pub pip_unique_output_hash: Option<ContentHash>,
    pub weak_fingerprint: ContentHash,
    pub weak_fingerprint_inputs: serde_json::Value,
    pub strong_fp_computations: Vec<StrongFingerprintComputation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipCacheMiss {
    pub pip_id: PipId,
    pub formatted_semi_stable_hash: String,
    pub pip_unique_output_hash: Option<ContentHash>,
    pub kind: CacheMissKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryMembershipHashed {
    pub directory_fingerprint: ContentHash,
    pub members: Vec<String>,
    pub flags: Vec<String>,
    pub enumerate_pattern_regex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifestFileRecord {
    pub drop_name: String,
    pub relative_path: String,
    pub azure_artifacts_hash: ContentHash,
    pub build_manifest_hash: ContentHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFileForBuildManifest {
    pub records: Vec<BuildManifestFileRecord>,
}

/// Typed dispatch payload for one execution-log frame (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
    ProcessFingerprintComputed(ProcessFingerprintComputed),
    PipCacheMiss(PipCacheMiss),
    DirectoryMembershipHashed(DirectoryMembershipHashed),
    RecordFileForBuildManifest(RecordFileForBuildManifest),
    /// One of the five event kinds named in §6 that the core never
    /// interprets: carried as a raw id + payload so the frame reader never
    /// has to fail on them.
    Opaque { event_id: u8, payload: Vec<u8> },
}

impl ExecutionEvent {
    pub fn event_id(&self) -> u8 {
        match self {
            ExecutionEvent::ProcessFingerprintComputed(_) => event_id::PROCESS_FINGERPRINT_COMPUTED,
            ExecutionEvent::PipCacheMiss(_) => event_id::PIP_CACHE_MISS,
            ExecutionEvent::DirectoryMembershipHashed(_) => event_id::DIRECTORY_MEMBERSHIP_HASHED,
            ExecutionEvent::RecordFileForBuildManifest(_) => {
                event_id::RECORD_FILE_FOR_BUILD_MANIFEST
            }
            ExecutionEvent::Opaque { event_id, .. } => *event_id,
        }
    }
}
