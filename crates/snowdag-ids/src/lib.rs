//! Identifier types for snowdag.
//!
//! - [`Id`]: 32-byte content-addressed identifier (transactions, transitions,
//!   vertices, chains, assets)
//! - [`ShortId`]: 20-byte identifier used for addresses
//! - [`NodeId`]: 20-byte identifier for validator nodes
//!
//! All of them render as CB58 (Base58 with a 4-byte checksum).

mod cb58;
mod hashing;
mod id;
mod node_id;
mod short;

pub use cb58::{cb58_decode, cb58_encode, Cb58Error};
pub use hashing::{checksum, hash160, hash256, Hash160, Hash256};
pub use id::Id;
pub use node_id::NodeId;
pub use short::ShortId;

/// Byte length of an [`Id`].
pub const ID_LEN: usize = 32;

/// Byte length of a [`ShortId`].
pub const SHORT_ID_LEN: usize = 20;

/// Byte length of a [`NodeId`].
pub const NODE_ID_LEN: usize = SHORT_ID_LEN;

/// Sorts a slice of ids ascending and drops duplicates.
pub fn sort_and_dedup(ids: &mut Vec<Id>) {
    ids.sort_unstable();
    ids.dedup();
}

/// Returns true if the ids are sorted ascending with no duplicates.
pub fn is_sorted_and_unique(ids: &[Id]) -> bool {
    ids.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrips() {
        let id = Id::from_bytes([7u8; ID_LEN]);
        assert_eq!(id, id.to_string().parse::<Id>().unwrap());

        let short = ShortId::from_bytes([7u8; SHORT_ID_LEN]);
        assert_eq!(short, short.to_string().parse::<ShortId>().unwrap());

        let node = NodeId::from_bytes([7u8; NODE_ID_LEN]);
        assert_eq!(node, node.to_string().parse::<NodeId>().unwrap());
    }

    #[test]
    fn sort_and_dedup_orders_and_drops() {
        let a = Id::from_bytes([1u8; 32]);
        let b = Id::from_bytes([2u8; 32]);
        let mut ids = vec![b, a, b];
        sort_and_dedup(&mut ids);
        assert_eq!(ids, vec![a, b]);
        assert!(is_sorted_and_unique(&ids));
        assert!(!is_sorted_and_unique(&[b, a]));
        assert!(!is_sorted_and_unique(&[a, a]));
    }
}
