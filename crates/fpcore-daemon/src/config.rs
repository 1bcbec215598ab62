//! `FingerprintCoreConfig` (the configuration options, expansion's
//! "ambient config" note): a TOML-deserializable struct callers can also
//! construct programmatically thanks to per-field defaults, mirroring
//! this corpus's cargo-style config loading rather than hand-rolled flag
//! parsing for anything beyond the daemon's own bootstrap flags.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cache_miss_analyzer::DiffFormat as AnalyzerDiffFormat;
use fingerprint_store::StoreMode;

use crate::error::{ConfigError, Result};

/// `cacheMissMode`. Selects where (if anywhere) a prior store comes
/// from for this build's diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CacheMissMode {
    /// No analyzer at all — `fpcore-daemon` still records fingerprints,
    /// it just never calls `cache-miss-analyzer`.
    Disabled,
    /// Use this build's own snapshot as the "prior" side (useful for
    /// local dev loops with no real previous build to compare against).
    Local,
    /// A caller-supplied directory already holds the prior store.
    CustomPath,
    /// Try a caller-supplied list of keys against the artifact cache.
    Remote,
    /// Derive candidate keys from git commit history.
    GitHashes,
    /// Derive candidate keys from Azure DevOps environment variables.
    AzureDevOps,
}

/// `cacheMissDiffFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CacheMissDiffFormat {
    CustomJsonDiff,
    TreeDiff,
}

impl From<CacheMissDiffFormat> for AnalyzerDiffFormat {
    fn from(value: CacheMissDiffFormat) -> Self {
        match value {
            CacheMissDiffFormat::CustomJsonDiff => AnalyzerDiffFormat::CustomJson,
            CacheMissDiffFormat::TreeDiff => AnalyzerDiffFormat::TreeDiff,
        }
    }
}

/// `fingerprintStoreMode` (the store-open mode for this process, not
/// to be confused with [`CacheMissMode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FingerprintStoreMode {
    ReadWrite,
    ReadOnly,
}

impl From<FingerprintStoreMode> for StoreMode {
    fn from(value: FingerprintStoreMode) -> Self {
        match value {
            FingerprintStoreMode::ReadWrite => StoreMode::ReadWrite,
            FingerprintStoreMode::ReadOnly => StoreMode::ReadOnly,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintCoreConfig {
    pub cache_miss_mode: CacheMissMode,
    pub cache_miss_diff_format: CacheMissDiffFormat,
    pub cache_miss_batch: bool,
    pub aria_individual_message_size_limit_bytes: usize,
    pub max_num_pips_for_cache_miss_analysis: u64,
    pub runtime_cache_miss_all_pips: bool,
    pub fingerprint_store_mode: FingerprintStoreMode,
    pub fingerprint_store_max_entry_age_minutes: i64,
    pub fingerprints_log_directory: PathBuf,

    /// Directory the fingerprint store itself lives in. Not named in the
    /// configuration list (that section is about *behavior* knobs) but
    /// every other path in this struct is meaningless without it.
    pub fingerprint_store_directory: PathBuf,
    /// Used by custom-path mode / local directory a previous store was
    /// already retrieved into, when `cache_miss_mode = CustomPath`.
    pub prior_store_directory: Option<PathBuf>,
    /// Legacy builds mark every transitive dependent of an
    /// uncacheable-by-configuration miss as changed; the newer (default)
    /// behavior exempts them so their own downstream causes still surface.
    pub legacy_mark_uncacheable_downstream: bool,
    /// Batching worker cadence (production deployments use both 1 and 5 minute variants
    /// across versions; expose it rather than hard-code it).
    pub batch_interval_seconds: u64,
    pub batch_size: usize,
}

impl Default for FingerprintCoreConfig {
    fn default() -> Self {
        Self {
            cache_miss_mode: CacheMissMode::Disabled,
            cache_miss_diff_format: CacheMissDiffFormat::TreeDiff,
            cache_miss_batch: true,
            aria_individual_message_size_limit_bytes: 32 * 1024,
            max_num_pips_for_cache_miss_analysis: 20_000,
            runtime_cache_miss_all_pips: false,
            fingerprint_store_mode: FingerprintStoreMode::ReadWrite,
            fingerprint_store_max_entry_age_minutes: 7 * 24 * 60,
            fingerprints_log_directory: PathBuf::from("fingerprints"),
            fingerprint_store_directory: PathBuf::from("fingerprint-store"),
            prior_store_directory: None,
            legacy_mark_uncacheable_downstream: false,
            batch_interval_seconds: 5 * 60,
            batch_size: 100,
        }
    }
}

impl FingerprintCoreConfig {
    /// Load from a TOML file, falling back to per-field defaults for
    /// anything the file omits (`#[serde(default)]` on the struct covers
    /// missing top-level fields too, since every field has a default).
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
