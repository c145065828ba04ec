//! 20-byte address identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::cb58::{cb58_decode, cb58_encode, Cb58Error};
use crate::hashing::{hash160, hash256};
use crate::SHORT_ID_LEN;

/// A 20-byte identifier used for addresses.
///
/// Derived from owner key material as `ripemd160(sha256(bytes))`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ShortId([u8; SHORT_ID_LEN]);

/// Errors from parsing a [`ShortId`].
#[derive(Debug, Error)]
pub enum ShortIdError {
    #[error("cb58 decoding failed: {0}")]
    Cb58(#[from] Cb58Error),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl ShortId {
    /// The all-zero short id.
    pub const EMPTY: Self = Self([0u8; SHORT_ID_LEN]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; SHORT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ShortIdError> {
        if bytes.len() != SHORT_ID_LEN {
            return Err(ShortIdError::InvalidLength {
                expected: SHORT_ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SHORT_ID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Address derivation: `ripemd160(sha256(bytes))`.
    #[must_use]
    pub fn from_key_bytes(bytes: &[u8]) -> Self {
        Self(hash160(&hash256(bytes)))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SHORT_ID_LEN] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; SHORT_ID_LEN]
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", cb58_encode(&self.0))
    }
}

impl fmt::Debug for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortId({self})")
    }
}

impl FromStr for ShortId {
    type Err = ShortIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&cb58_decode(s)?)
    }
}

impl AsRef<[u8]> for ShortId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ShortId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&cb58_encode(&self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for ShortId {
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
    fn from_slice_checks_length() {
        assert!(ShortId::from_slice(&[0u8; 20]).is_ok());
        assert!(ShortId::from_slice(&[0u8; 21]).is_err());
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let a = ShortId::from_key_bytes(b"key material");
        let b = ShortId::from_key_bytes(b"key material");
        assert_eq!(a, b);
        assert_ne!(a, ShortId::from_key_bytes(b"other"));
    }

    #[test]
    fn ordering_is_bytewise() {
        assert!(ShortId::from_bytes([0u8; 20]) < ShortId::from_bytes([1u8; 20]));
    }
}
