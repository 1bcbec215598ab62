//! Lookup fingerprint construction: a canonical-hasher input sequence
//! shared by publish and retrieve so that both sides key the same cache
//! entry for the same `(formatVersion, lookupVersion, key, salt)`.

use fingerprint_store::{CanonicalHasher, ContentHash};

pub fn lookup_fingerprint(
    format_version: u32,
    lookup_version: u32,
    key: &str,
    fingerprint_salt: &str,
) -> ContentHash {
    let mut hasher = CanonicalHasher::new();
    hasher
        .feed_str("Type")
        .feed_str("FingerprintStoreFingerprint")
        .feed_str("FormatVersion")
        .feed_u32(format_version)
        .feed_str("LookupVersion")
        .feed_u32(lookup_version)
        .feed_str("Key")
        .feed_str(key)
        .feed_str("FingerprintSalt")
        .feed_str(fingerprint_salt);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_fingerprint() {
        let a = lookup_fingerprint(3, 1, "main", "salt");
        let b = lookup_fingerprint(3, 1, "main", "salt");
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_produce_different_fingerprints() {
        let a = lookup_fingerprint(3, 1, "main", "salt");
        let b = lookup_fingerprint(3, 1, "feature/x", "salt");
        assert_ne!(a, b);
    }
}
