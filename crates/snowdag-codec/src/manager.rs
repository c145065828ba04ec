//! Versioned serialization.

use crate::{Pack, Packer, Unpack, UnpackError, Unpacker};

/// Codec version for values serialized before the epoch fork.
pub const CODEC_VERSION_PRE_FORK: u16 = 0;

/// Codec version for values serialized after the epoch fork.
pub const CODEC_VERSION_POST_FORK: u16 = 1;

/// Wraps serialized values in a 2-byte big-endian version prefix.
///
/// The manager carries the version used for *new* serializations; the engine
/// bumps it when the wall clock crosses the fork time. Unmarshalling accepts
/// any registered version so pre-fork bytes stay readable.
#[derive(Debug, Clone)]
pub struct CodecManager {
    current_version: u16,
    max_version: u16,
}

impl Default for CodecManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecManager {
    /// A manager that serializes with the post-fork version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_version: CODEC_VERSION_POST_FORK,
            max_version: CODEC_VERSION_POST_FORK,
        }
    }

    /// A manager pinned to an explicit serialization version.
    #[must_use]
    pub fn with_version(version: u16) -> Self {
        Self {
            current_version: version,
            max_version: CODEC_VERSION_POST_FORK.max(version),
        }
    }

    #[must_use]
    pub fn current_version(&self) -> u16 {
        self.current_version
    }

    /// Switches the version used for new serializations.
    pub fn set_current_version(&mut self, version: u16) {
        self.current_version = version;
        self.max_version = self.max_version.max(version);
    }

    /// Serializes `value` under the current version.
    pub fn marshal<T: Pack>(&self, value: &T) -> Vec<u8> {
        self.marshal_version(self.current_version, value)
    }

    /// Serializes `value` under an explicit version.
    pub fn marshal_version<T: Pack>(&self, version: u16, value: &T) -> Vec<u8> {
        let mut packer = Packer::new(256);
        packer.pack_short(version);
        value.pack(&mut packer);
        packer.into_bytes()
    }

    /// Deserializes a versioned value, returning the version it was written
    /// under. Fails on unknown versions and on trailing bytes.
    pub fn unmarshal<T: Unpack>(&self, bytes: &[u8]) -> Result<(u16, T), UnpackError> {
        let mut unpacker = Unpacker::new(bytes);
        let version = unpacker.unpack_short()?;
        if version > self.max_version {
            return Err(UnpackError::UnsupportedVersion(version));
        }
        let value = T::unpack(&mut unpacker)?;
        if !unpacker.is_exhausted() {
            return Err(UnpackError::TrailingBytes(unpacker.remaining()));
        }
        Ok((version, value))
    }
}
