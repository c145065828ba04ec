//! Canonical binary serialization.
//!
//! The wire format is content-addressed (ids are hashes of serialized
//! bytes), so the byte layout here is normative:
//!
//! - integers: big-endian, fixed width
//! - `bool`: one byte, 0x00 or 0x01
//! - strings: u16 length prefix + UTF-8 bytes
//! - variable byte slices / lists: u32 length prefix + elements
//! - fixed-width values (ids): raw bytes, no prefix
//!
//! Serialized values carry a 2-byte big-endian codec version prefix managed
//! by [`CodecManager`]: version 0 is the pre-fork layout, version 1 the
//! post-fork layout.

mod manager;
mod packer;

pub use manager::{CodecManager, CODEC_VERSION_POST_FORK, CODEC_VERSION_PRE_FORK};
pub use packer::{PackError, Packer, UnpackError, Unpacker};

use snowdag_ids::{Id, NodeId, ShortId, ID_LEN, NODE_ID_LEN, SHORT_ID_LEN};

/// A value that can be written to a [`Packer`].
pub trait Pack {
    fn pack(&self, packer: &mut Packer);
}

/// A value that can be read from an [`Unpacker`].
pub trait Unpack: Sized {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError>;
}

impl Pack for u8 {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_byte(*self);
    }
}

impl Pack for u16 {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_short(*self);
    }
}

impl Pack for u32 {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_int(*self);
    }
}

impl Pack for u64 {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_long(*self);
    }
}

impl Pack for bool {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_bool(*self);
    }
}

impl Pack for String {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_str(self);
    }
}

impl<T: Pack> Pack for Vec<T> {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_int(self.len() as u32);
        for item in self {
            item.pack(packer);
        }
    }
}

impl Unpack for u8 {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        unpacker.unpack_byte()
    }
}

impl Unpack for u16 {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        unpacker.unpack_short()
    }
}

impl Unpack for u32 {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        unpacker.unpack_int()
    }
}

impl Unpack for u64 {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        unpacker.unpack_long()
    }
}

impl Unpack for bool {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        unpacker.unpack_bool()
    }
}

impl Unpack for String {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        unpacker.unpack_string()
    }
}

impl<T: Unpack> Unpack for Vec<T> {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        let len = unpacker.unpack_int()? as usize;
        let mut vec = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            vec.push(T::unpack(unpacker)?);
        }
        Ok(vec)
    }
}

impl Pack for Id {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_fixed_bytes(self.as_bytes());
    }
}

impl Unpack for Id {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        let bytes: [u8; ID_LEN] = unpacker.unpack_fixed_bytes()?;
        Ok(Id::from_bytes(bytes))
    }
}

impl Pack for ShortId {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_fixed_bytes(self.as_bytes());
    }
}

impl Unpack for ShortId {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        let bytes: [u8; SHORT_ID_LEN] = unpacker.unpack_fixed_bytes()?;
        Ok(ShortId::from_bytes(bytes))
    }
}

impl Pack for NodeId {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_fixed_bytes(self.as_bytes());
    }
}

impl Unpack for NodeId {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        let bytes: [u8; NODE_ID_LEN] = unpacker.unpack_fixed_bytes()?;
        Ok(NodeId::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_roundtrip() {
        let mut packer = Packer::new(64);
        42u8.pack(&mut packer);
        1000u16.pack(&mut packer);
        100_000u32.pack(&mut packer);
        10_000_000_000u64.pack(&mut packer);
        true.pack(&mut packer);

        let bytes = packer.into_bytes();
        let mut unpacker = Unpacker::new(&bytes);
        assert_eq!(u8::unpack(&mut unpacker).unwrap(), 42);
        assert_eq!(u16::unpack(&mut unpacker).unwrap(), 1000);
        assert_eq!(u32::unpack(&mut unpacker).unwrap(), 100_000);
        assert_eq!(u64::unpack(&mut unpacker).unwrap(), 10_000_000_000);
        assert!(bool::unpack(&mut unpacker).unwrap());
    }

    #[test]
    fn ids_roundtrip() {
        let id = Id::from_bytes([42u8; 32]);
        let mut packer = Packer::new(64);
        id.pack(&mut packer);
        let bytes = packer.into_bytes();
        assert_eq!(Id::unpack(&mut Unpacker::new(&bytes)).unwrap(), id);
    }

    #[test]
    fn vec_roundtrip() {
        let mut packer = Packer::new(64);
        vec![1u32, 2, 3].pack(&mut packer);
        let bytes = packer.into_bytes();
        assert_eq!(
            Vec::<u32>::unpack(&mut Unpacker::new(&bytes)).unwrap(),
            vec![1, 2, 3]
        );
    }
}
