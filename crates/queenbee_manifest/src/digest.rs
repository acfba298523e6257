//! Content digests over canonical JSON.
//!
//! The digest of a manifest is the lowercase hex SHA-256 of its canonical
//! JSON form: compact separators, struct fields in declaration order, map
//! keys sorted, and unset optional fields serialized as `null`. This is
//! distinct from `std::hash::Hash`, which remains free for in-memory
//! containers.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Digest raw bytes to a lowercase hex SHA-256 string.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Canonical-JSON content digest for manifest types.
pub trait ContentDigest: Serialize {
    /// The canonical JSON bytes this type hashes over.
    fn canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Lowercase hex SHA-256 of [`ContentDigest::canonical_json`].
    fn content_digest(&self) -> Result<String, serde_json::Error> {
        Ok(digest_bytes(&self.canonical_json()?))
    }
}

impl<T: Serialize> ContentDigest for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        name: String,
        tag: Option<String>,
    }

    #[test]
    fn digest_is_stable_across_calls() {
        let sample = Sample {
            name: "df".to_string(),
            tag: None,
        };
        assert_eq!(
            sample.content_digest().unwrap(),
            sample.content_digest().unwrap()
        );
    }

    #[test]
    fn unset_fields_participate_in_the_digest() {
        let unset = Sample {
            name: "df".to_string(),
            tag: None,
        };
        let set = Sample {
            name: "df".to_string(),
            tag: Some("0.1.0".to_string()),
        };
        assert_ne!(
            unset.content_digest().unwrap(),
            set.content_digest().unwrap()
        );
        // `null` is part of the canonical form, not skipped.
        assert_eq!(
            String::from_utf8(unset.canonical_json().unwrap()).unwrap(),
            r#"{"name":"df","tag":null}"#
        );
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let digest = digest_bytes(b"queenbee");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
