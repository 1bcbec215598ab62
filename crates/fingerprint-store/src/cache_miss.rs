use serde::{Deserialize, Serialize};

use crate::ids::PipId;

/// Classification of why a pip could not be served from cache (glossary:
/// "Cache miss kind"). Shared between the store's `cacheMissList` family and
/// the cache-miss analyzer's classification input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheMissKind {
    MissForDescriptorsDueToWeakFingerprints,
    MissForDescriptorsDueToStrongFingerprints,
    MissForDescriptorsDueToAugmentedWeakFingerprints,
    MissForCacheEntry,
    MissForProcessMetadata,
    MissForProcessOutputContent { missed_outputs: Vec<String> },
    MissForProcessConfiguredUncacheable,
    InvalidDescriptors,
    ArtificialMiss,
    Hit,
    Invalid,
}

/// One entry in the ordered cache-miss list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMissRecord {
    pub pip_id: PipId,
    pub kind: CacheMissKind,
}
