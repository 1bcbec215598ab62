//! Column family names, one per entry family.

pub const PIP_TO_FP_KEYS: &str = "pip_to_fp_keys";
pub const WEAK_FP_TO_INPUTS: &str = "weak_fp_to_inputs";
pub const STRONG_FP_TO_INPUTS: &str = "strong_fp_to_inputs";
pub const PATHSET_HASH_TO_INPUTS: &str = "pathset_hash_to_inputs";
pub const CONTENT_HASH_TO_VALUE: &str = "content_hash_to_value";
pub const PIP_UNIQUE_OUTPUT_HASH_TO_SEMISTABLE: &str = "pip_unique_output_hash_to_semistable";
pub const CACHE_MISS_LIST: &str = "cache_miss_list";
pub const LRU_TIMESTAMPS: &str = "lru_timestamps";

pub const ALL: &[&str] = &[
    PIP_TO_FP_KEYS,
    WEAK_FP_TO_INPUTS,
    STRONG_FP_TO_INPUTS,
    PATHSET_HASH_TO_INPUTS,
    CONTENT_HASH_TO_VALUE,
    PIP_UNIQUE_OUTPUT_HASH_TO_SEMISTABLE,
    CACHE_MISS_LIST,
    LRU_TIMESTAMPS,
];

/// Fixed key under which the single `cacheMissList` blob is stored.
pub const CACHE_MISS_LIST_KEY: &[u8] = b"list";
