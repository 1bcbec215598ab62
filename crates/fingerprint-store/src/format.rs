use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Bumped whenever the on-disk column-family layout or value encoding
/// changes incompatibly. Not the same axis as [`FormatHeader::lookup_version`],
/// which only affects the lookup fingerprint used by `store-sync`.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

pub const CURRENT_LOOKUP_VERSION: u32 = 1;

const HEADER_FILE: &str = "format.json";

/// The `format.json` header sitting alongside the embedded KV database
/// directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FormatHeader {
    pub format_version: u32,
    pub lookup_version: u32,
}

impl FormatHeader {
    fn current() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            lookup_version: CURRENT_LOOKUP_VERSION,
        }
    }
}

/// Read `format.json` if present, checking compatibility; otherwise write a
/// fresh one stamped with the current version (first open of a new store).
/// Version incompatibility fails before any column family is touched (I5).
pub(crate) fn read_or_init(dir: &Path, read_only: bool) -> Result<FormatHeader> {
    let path = dir.join(HEADER_FILE);
    if path.exists() {
        let text = std::fs::read_to_string(&path)?;
        let header: FormatHeader = serde_json::from_str(&text).map_err(|source| {
            StoreError::Deserialize {
                key: HEADER_FILE.to_string(),
                source,
            }
        })?;
        if header.format_version != CURRENT_FORMAT_VERSION {
            return Err(StoreError::IncompatibleVersion {
                found: header.format_version,
                expected: CURRENT_FORMAT_VERSION,
            });
        }
        Ok(header)
    } else {
        let header = FormatHeader::current();
        if !read_only {
            std::fs::create_dir_all(dir)?;
            let text = serde_json::to_string_pretty(&header).expect("header always serializes");
            std::fs::write(&path, text)?;
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_directory_gets_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let header = read_or_init(dir.path(), false).unwrap();
        assert_eq!(header.format_version, CURRENT_FORMAT_VERSION);
        assert!(dir.path().join(HEADER_FILE).exists());
    }

    #[test]
    fn incompatible_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(HEADER_FILE),
            r#"{"format_version":999,"lookup_version":1}"#,
        )
        .unwrap();
        let err = read_or_init(dir.path(), false).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IncompatibleVersion { found: 999, .. }
        ));
    }

    #[test]
    fn read_only_open_of_fresh_dir_does_not_write_header() {
        let dir = tempfile::tempdir().unwrap();
        let header = read_or_init(dir.path(), true).unwrap();
        assert_eq!(header.format_version, CURRENT_FORMAT_VERSION);
        assert!(!dir.path().join(HEADER_FILE).exists());
    }
}
