//! CB58: Base58 with a trailing 4-byte SHA-256 checksum.

use thiserror::Error;

use crate::hashing::checksum;

const CHECKSUM_LEN: usize = 4;

/// Errors produced while decoding a CB58 string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Cb58Error {
    #[error("base58 decoding failed: {0}")]
    Base58(String),

    #[error("input shorter than the checksum")]
    MissingChecksum,

    #[error("checksum mismatch")]
    BadChecksum,
}

/// Encodes `bytes` as CB58.
#[must_use]
pub fn cb58_encode(bytes: &[u8]) -> String {
    let mut checked = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    checked.extend_from_slice(bytes);
    checked.extend_from_slice(&checksum(bytes, CHECKSUM_LEN));
    bs58::encode(checked).into_string()
}

/// Decodes a CB58 string, verifying its checksum.
pub fn cb58_decode(s: &str) -> Result<Vec<u8>, Cb58Error> {
    let decoded = bs58::decode(s)
        .into_vec()
        .map_err(|e| Cb58Error::Base58(e.to_string()))?;

    if decoded.len() < CHECKSUM_LEN {
        return Err(Cb58Error::MissingChecksum);
    }

    let (payload, provided) = decoded.split_at(decoded.len() - CHECKSUM_LEN);
    if provided != checksum(payload, CHECKSUM_LEN) {
        return Err(Cb58Error::BadChecksum);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for bytes in [&[][..], &[0][..], &[1, 2, 3, 4][..], &[0xff; 32][..]] {
            let encoded = cb58_encode(bytes);
            assert_eq!(cb58_decode(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn rejects_non_base58() {
        assert!(matches!(cb58_decode("0OIl"), Err(Cb58Error::Base58(_))));
    }

    #[test]
    fn rejects_missing_checksum() {
        assert_eq!(cb58_decode("1"), Err(Cb58Error::MissingChecksum));
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut raw = bs58::decode(cb58_encode(&[9, 9, 9])).into_vec().unwrap();
        *raw.last_mut().unwrap() ^= 0xff;
        let corrupted = bs58::encode(raw).into_string();
        assert_eq!(cb58_decode(&corrupted), Err(Cb58Error::BadChecksum));
    }
}
