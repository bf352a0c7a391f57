use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CoreError, Result};

/// SHA-256 digest of a canonical JSON encoding, hex encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConfigDigest(String);

impl ConfigDigest {
    /// Digest the JSON encoding of `value`. Struct fields serialize in
    /// declaration order, so equal values always produce equal digests.
    pub fn of<T: Serialize>(value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic, content-derived experiment identifier.
///
/// Derived from the leading bytes of a [`ConfigDigest`], so the same task and
/// configuration always map to the same identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Number of hex characters kept from the digest.
    pub const LEN: usize = 16;

    pub fn from_digest(digest: &ConfigDigest) -> Self {
        Self(digest.as_str()[..Self::LEN].to_string())
    }

    /// Parse an identifier read back from storage or the command line.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.len() != Self::LEN || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::Validation(format!(
                "experiment id must be {} hex characters, got '{}'",
                Self::LEN,
                value
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_is_stable() {
        let a = ConfigDigest::of(&json!({"model": "m", "temperature": 0.0})).unwrap();
        let b = ConfigDigest::of(&json!({"model": "m", "temperature": 0.0})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_id_is_digest_prefix() {
        let digest = ConfigDigest::of(&"payload").unwrap();
        let id = ExperimentId::from_digest(&digest);
        assert_eq!(id.as_str().len(), ExperimentId::LEN);
        assert!(digest.as_str().starts_with(id.as_str()));
    }

    #[test]
    fn test_parse_roundtrip() {
        let digest = ConfigDigest::of(&"payload").unwrap();
        let id = ExperimentId::from_digest(&digest);
        let parsed = ExperimentId::parse(&id.to_string().to_uppercase()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ExperimentId::parse("not-an-id").is_err());
        assert!(ExperimentId::parse("abc").is_err());
        assert!(ExperimentId::parse("zzzzzzzzzzzzzzzz").is_err());
    }
}
