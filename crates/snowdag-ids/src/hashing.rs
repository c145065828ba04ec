//! Hashing helpers shared by the identifier types.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest.
pub type Hash256 = [u8; 32];

/// A 20-byte RIPEMD-160 digest.
pub type Hash160 = [u8; 20];

/// SHA-256 of `data`.
#[must_use]
pub fn hash256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// RIPEMD-160 of `data`. Used for address derivation only.
#[must_use]
pub fn hash160(data: &[u8]) -> Hash160 {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// The trailing `len` bytes of `sha256(data)`.
///
/// # Panics
///
/// Panics if `len > 32`.
#[must_use]
pub fn checksum(data: &[u8], len: usize) -> Vec<u8> {
    assert!(len <= 32, "checksum length must be <= 32");
    let digest = hash256(data);
    digest[32 - len..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty() {
        let digest = hash256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(digest.as_slice(), expected.as_slice());
    }

    #[test]
    fn ripemd_empty() {
        let digest = hash160(b"");
        let expected = hex::decode("9c1185a5c5e9fc54612808977ee8f548b2258d31").unwrap();
        assert_eq!(digest.as_slice(), expected.as_slice());
    }

    #[test]
    fn checksum_is_hash_suffix() {
        let data = b"snowdag";
        let cs = checksum(data, 4);
        assert_eq!(cs, hash256(data)[28..]);
    }
}
