use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

/// Opaque fixed-width content hash. Equality is bitwise; the canonical
/// textual form is lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash of the raw concatenation of `fields`, in order. Used where the
    /// caller already has a fixed field layout and no canonical-hasher
    /// bookkeeping (name, length-prefixing) is required.
    pub fn compute(fields: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for field in fields {
            hasher.update(field);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| HashParseError(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(HashParseError(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid content hash hex: {0}")]
pub struct HashParseError(String);

/// Builds a [`ContentHash`] over a named, ordered sequence of fields — the
/// "Type", "FormatVersion", "Key", ... style inputs used by the lookup
/// fingerprint and the pip-keyed fingerprints. Field order is
/// caller-fixed; no key sorting is performed (unlike `domain::digest`'s
/// RFC-8785 canonical JSON, this hasher has no notion of object keys).
pub struct CanonicalHasher {
    hasher: Sha256,
}

impl CanonicalHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn feed_str(&mut self, value: &str) -> &mut Self {
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn feed_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.hasher.update(value);
        self
    }

    pub fn feed_u32(&mut self, value: u32) -> &mut Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    pub fn finish(self) -> ContentHash {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.hasher.finalize());
        ContentHash(bytes)
    }
}

impl Default for CanonicalHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_fromstr_roundtrip() {
        let h = ContentHash::compute(&[b"hello"]);
        let hex = h.to_string();
        let parsed: ContentHash = hex.parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn deterministic() {
        let a = ContentHash::compute(&[b"a", b"b"]);
        let b = ContentHash::compute(&[b"a", b"b"]);
        assert_eq!(a, b);
    }

    #[test]
    fn field_boundaries_matter() {
        let a = ContentHash::compute(&[b"ab", b"c"]);
        let b = ContentHash::compute(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_hasher_matches_manual_order() {
        let mut h1 = CanonicalHasher::new();
        h1.feed_str("Type").feed_str("FingerprintStoreFingerprint");
        let a = h1.finish();

        let mut h2 = CanonicalHasher::new();
        h2.feed_str("Type").feed_str("FingerprintStoreFingerprint");
        let b = h2.finish();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_hex_rejected() {
        assert!("not-hex".parse::<ContentHash>().is_err());
        assert!("abcd".parse::<ContentHash>().is_err());
    }
}
