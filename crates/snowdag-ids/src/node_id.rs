//! 20-byte validator node identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::short::{ShortId, ShortIdError};
use crate::NODE_ID_LEN;

/// Identifies a validator node. Same representation as [`ShortId`], kept as a
/// distinct type so node ids and addresses cannot be confused.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(ShortId);

impl NodeId {
    /// The all-zero node id.
    pub const EMPTY: Self = Self(ShortId::EMPTY);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(ShortId::from_bytes(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ShortIdError> {
        ShortId::from_slice(bytes).map(Self)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        self.0.as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeID-{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for NodeId {
    type Err = ShortIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("NodeID-").unwrap_or(s);
        s.parse().map(Self)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_prefix() {
        let id = NodeId::from_bytes([1u8; 20]);
        let s = id.to_string();
        assert!(s.starts_with("NodeID-"));
        assert_eq!(s.parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn parses_without_prefix() {
        let id = NodeId::from_bytes([1u8; 20]);
        let bare = id.to_string().strip_prefix("NodeID-").unwrap().to_string();
        assert_eq!(bare.parse::<NodeId>().unwrap(), id);
    }
}
