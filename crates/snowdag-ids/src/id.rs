//! 32-byte identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::cb58::{cb58_decode, cb58_encode, Cb58Error};
use crate::hashing::hash256;
use crate::ID_LEN;

/// A 32-byte identifier.
///
/// Ids are content-addressed wherever possible: the id of a transaction,
/// transition, or vertex is the SHA-256 hash of its canonical bytes.
/// Equality and ordering are bytewise. The human-readable form is CB58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Id([u8; ID_LEN]);

/// Errors from parsing an [`Id`].
#[derive(Debug, Error)]
pub enum IdError {
    #[error("cb58 decoding failed: {0}")]
    Cb58(#[from] Cb58Error),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl Id {
    /// The all-zero id.
    pub const EMPTY: Self = Self([0u8; ID_LEN]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds an id from a slice, failing on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        if bytes.len() != ID_LEN {
            return Err(IdError::InvalidLength {
                expected: ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// The SHA-256 hash of `bytes` as an id.
    #[must_use]
    pub fn from_hash(bytes: &[u8]) -> Self {
        Self(hash256(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// True for the all-zero id.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; ID_LEN]
    }

    /// Derives a new id by hashing big-endian `prefixes` followed by this id.
    ///
    /// Deterministic, so the same (prefixes, id) pair always derives the same
    /// id. Used to mint related-but-distinct ids, e.g. the id of a
    /// transaction presenting a transition in a given epoch.
    #[must_use]
    pub fn prefix(&self, prefixes: &[u64]) -> Self {
        let mut buf = Vec::with_capacity(prefixes.len() * 8 + ID_LEN);
        for p in prefixes {
            buf.extend_from_slice(&p.to_be_bytes());
        }
        buf.extend_from_slice(&self.0);
        Self::from_hash(&buf)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", cb58_encode(&self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&cb58_decode(s)?)
    }
}

impl AsRef<[u8]> for Id {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ID_LEN]> for Id {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&cb58_encode(&self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Self::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        assert!(Id::EMPTY.is_empty());
        assert!(!Id::from_bytes([1u8; 32]).is_empty());
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(Id::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            Id::from_slice(&[0u8; 31]),
            Err(IdError::InvalidLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(Id::from_hash(b"a"), Id::from_hash(b"a"));
        assert_ne!(Id::from_hash(b"a"), Id::from_hash(b"b"));
    }

    #[test]
    fn prefix_derivation() {
        let id = Id::from_bytes([3u8; 32]);
        assert_eq!(id.prefix(&[0]), id.prefix(&[0]));
        assert_ne!(id.prefix(&[0]), id.prefix(&[1]));
        assert_ne!(id.prefix(&[0]), id);
    }

    #[test]
    fn ordering_is_bytewise() {
        assert!(Id::from_bytes([0u8; 32]) < Id::from_bytes([1u8; 32]));
    }

    #[test]
    fn json_roundtrip() {
        let id = Id::from_bytes([42u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(id, serde_json::from_str::<Id>(&json).unwrap());
    }
}
