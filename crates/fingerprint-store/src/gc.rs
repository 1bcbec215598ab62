use chrono::Duration;

use crate::error::Result;
use crate::families;

/// Which family an `lru_timestamps` entry's original key belongs to. Only
/// families whose entries are actually age-collected get a tag; the
/// lookup-table families (`pip_unique_output_hash_to_semistable`,
/// `cache_miss_list`) are replace-by-key or single-blob and are never swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FamilyTag {
    PipToFpKeys,
    WeakFp,
    StrongFp,
    PathSet,
    ContentHash,
}

impl FamilyTag {
    fn code(self) -> u8 {
        match self {
            FamilyTag::PipToFpKeys => 0,
            FamilyTag::WeakFp => 1,
            FamilyTag::StrongFp => 2,
            FamilyTag::PathSet => 3,
            FamilyTag::ContentHash => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FamilyTag::PipToFpKeys),
            1 => Some(FamilyTag::WeakFp),
            2 => Some(FamilyTag::StrongFp),
            3 => Some(FamilyTag::PathSet),
            4 => Some(FamilyTag::ContentHash),
            _ => None,
        }
    }

    fn family_name(self) -> &'static str {
        match self {
            FamilyTag::PipToFpKeys => families::PIP_TO_FP_KEYS,
            FamilyTag::WeakFp => families::WEAK_FP_TO_INPUTS,
            FamilyTag::StrongFp => families::STRONG_FP_TO_INPUTS,
            FamilyTag::PathSet => families::PATHSET_HASH_TO_INPUTS,
            FamilyTag::ContentHash => families::CONTENT_HASH_TO_VALUE,
        }
    }
}

pub(crate) fn lru_key(tag: FamilyTag, original_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + original_key.len());
    out.push(tag.code());
    out.extend_from_slice(original_key);
    out
}

fn decode_lru_key(lru_key: &[u8]) -> Option<(FamilyTag, &[u8])> {
    let (&code, rest) = lru_key.split_first()?;
    Some((FamilyTag::from_code(code)?, rest))
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Delete every `lru_timestamps` entry older than `max_entry_age`, along with
/// the family row it timestamps. Per I6, callers must only invoke this after
/// the build's last in-flight write has returned — a GC pass run
/// concurrently with a write to the same key could delete a just-written
/// entry if it raced ahead of the timestamp update.
pub(crate) fn sweep(kv: &fp_kv::KvStore, max_entry_age: Duration) -> Result<usize> {
    let cutoff = now_millis() - max_entry_age.num_milliseconds();
    let mut swept = 0usize;

    for (lru_key, ts_bytes) in kv.iter_all(families::LRU_TIMESTAMPS)? {
        let Ok(ts_bytes): std::result::Result<[u8; 8], _> = ts_bytes.as_slice().try_into() else {
            continue;
        };
        let ts = i64::from_be_bytes(ts_bytes);
        if ts >= cutoff {
            continue;
        }
        let Some((tag, original_key)) = decode_lru_key(&lru_key) else {
            continue;
        };
        kv.delete(tag.family_name(), original_key)?;
        kv.delete(families::LRU_TIMESTAMPS, &lru_key)?;
        swept += 1;
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_key_roundtrip() {
        let key = lru_key(FamilyTag::WeakFp, b"deadbeef");
        let (tag, original) = decode_lru_key(&key).unwrap();
        assert_eq!(tag, FamilyTag::WeakFp);
        assert_eq!(original, b"deadbeef");
    }

    #[test]
    fn unknown_code_is_rejected() {
        let mut key = vec![255u8];
        key.extend_from_slice(b"x");
        assert!(decode_lru_key(&key).is_none());
    }
}
