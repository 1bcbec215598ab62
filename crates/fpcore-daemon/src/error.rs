use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] fingerprint_store::StoreError),

    #[error(transparent)]
    Runtime(#[from] runtime_analyzer::RuntimeError),

    #[error(transparent)]
    Sync(#[from] store_sync::SyncError),

    #[error(transparent)]
    Ingress(#[from] event_ingress::IngressError),

    #[error(transparent)]
    Manifest(#[from] build_manifest::ManifestError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cache_miss_mode is {mode:?} but no prior store directory or candidate-key source was configured for it")]
    MissingPriorStoreSource { mode: crate::config::CacheMissMode },

    #[error("runtime analyzer still has other owners at shutdown (dispatcher not fully drained)")]
    RuntimeStillShared,

    #[error("fingerprint store still has other owners at shutdown")]
    StoreStillShared,
}

pub type Result<T> = std::result::Result<T, HostError>;
