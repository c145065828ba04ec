//! UTXOs and owner predicates.

use serde::{Deserialize, Serialize};
use snowdag_codec::{Pack, Packer, Unpack, UnpackError, Unpacker};
use snowdag_ids::{Id, ShortId};

/// Identifies an output of a transition: the producing transition id and the
/// output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtxoId {
    pub tx_id: Id,
    pub output_index: u32,
}

impl UtxoId {
    pub fn new(tx_id: Id, output_index: u32) -> Self {
        Self {
            tx_id,
            output_index,
        }
    }

    /// The opaque input id the consensus core tracks: a hash of the source
    /// reference.
    #[must_use]
    pub fn input_id(&self) -> Id {
        self.tx_id.prefix(&[u64::from(self.output_index)])
    }
}

impl Pack for UtxoId {
    fn pack(&self, packer: &mut Packer) {
        self.tx_id.pack(packer);
        packer.pack_int(self.output_index);
    }
}

impl Unpack for UtxoId {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        Ok(Self {
            tx_id: Id::unpack(unpacker)?,
            output_index: unpacker.unpack_int()?,
        })
    }
}

/// Who may spend an output: any `threshold` of `addresses`, once `locktime`
/// has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutputOwners {
    pub locktime: u64,
    pub threshold: u32,
    pub addresses: Vec<ShortId>,
}

impl OutputOwners {
    pub fn single(address: ShortId) -> Self {
        Self {
            locktime: 0,
            threshold: 1,
            addresses: vec![address],
        }
    }

    /// Structural permission check: the credential must name at least
    /// `threshold` distinct owner addresses, and the output must be unlocked.
    /// Signature verification happens in the crypto collaborator before
    /// transactions reach the ledger.
    #[must_use]
    pub fn authorizes(&self, credential: &Credential, time: u64) -> bool {
        if time < self.locktime {
            return false;
        }
        let mut matched: Vec<&ShortId> = credential
            .addresses
            .iter()
            .filter(|addr| self.addresses.contains(addr))
            .collect();
        matched.dedup();
        matched.len() as u32 >= self.threshold
    }

    #[must_use]
    pub fn contains(&self, address: &ShortId) -> bool {
        self.addresses.contains(address)
    }
}

impl Pack for OutputOwners {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_long(self.locktime);
        packer.pack_int(self.threshold);
        self.addresses.pack(packer);
    }
}

impl Unpack for OutputOwners {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        Ok(Self {
            locktime: unpacker.unpack_long()?,
            threshold: unpacker.unpack_int()?,
            addresses: Vec::<ShortId>::unpack(unpacker)?,
        })
    }
}

/// The addresses whose signatures accompany a transition. The signature
/// bytes themselves are checked upstream; the ledger sees the recovered
/// addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Credential {
    pub addresses: Vec<ShortId>,
}

impl Credential {
    pub fn of(addresses: Vec<ShortId>) -> Self {
        Self { addresses }
    }
}

impl Pack for Credential {
    fn pack(&self, packer: &mut Packer) {
        self.addresses.pack(packer);
    }
}

impl Unpack for Credential {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        Ok(Self {
            addresses: Vec::<ShortId>::unpack(unpacker)?,
        })
    }
}

/// A fungible output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutput {
    pub asset_id: Id,
    pub amount: u64,
    pub owners: OutputOwners,
}

impl Pack for TransferOutput {
    fn pack(&self, packer: &mut Packer) {
        self.asset_id.pack(packer);
        packer.pack_long(self.amount);
        self.owners.pack(packer);
    }
}

impl Unpack for TransferOutput {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        Ok(Self {
            asset_id: Id::unpack(unpacker)?,
            amount: unpacker.unpack_long()?,
            owners: OutputOwners::unpack(unpacker)?,
        })
    }
}

/// An unspent output in chain state.
///
/// Fungible outputs carry an `amount`; NFT outputs carry a zero amount and a
/// `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub utxo_id: UtxoId,
    pub asset_id: Id,
    pub amount: u64,
    pub payload: Vec<u8>,
    pub owners: OutputOwners,
}

impl Utxo {
    /// The id this UTXO is stored and spent under.
    #[must_use]
    pub fn id(&self) -> Id {
        self.utxo_id.input_id()
    }
}

impl Pack for Utxo {
    fn pack(&self, packer: &mut Packer) {
        self.utxo_id.pack(packer);
        self.asset_id.pack(packer);
        packer.pack_long(self.amount);
        packer.pack_bytes(&self.payload);
        self.owners.pack(packer);
    }
}

impl Unpack for Utxo {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        Ok(Self {
            utxo_id: UtxoId::unpack(unpacker)?,
            asset_id: Id::unpack(unpacker)?,
            amount: unpacker.unpack_long()?,
            payload: unpacker.unpack_bytes()?,
            owners: OutputOwners::unpack(unpacker)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snowdag_codec::CodecManager;

    fn addr(byte: u8) -> ShortId {
        ShortId::from_bytes([byte; 20])
    }

    #[test]
    fn input_ids_are_unique_per_output() {
        let tx_id = Id::from_bytes([1; 32]);
        assert_ne!(
            UtxoId::new(tx_id, 0).input_id(),
            UtxoId::new(tx_id, 1).input_id()
        );
        assert_eq!(
            UtxoId::new(tx_id, 0).input_id(),
            UtxoId::new(tx_id, 0).input_id()
        );
    }

    #[test]
    fn threshold_authorization() {
        let owners = OutputOwners {
            locktime: 0,
            threshold: 2,
            addresses: vec![addr(1), addr(2), addr(3)],
        };
        assert!(!owners.authorizes(&Credential::of(vec![addr(1)]), 0));
        assert!(owners.authorizes(&Credential::of(vec![addr(1), addr(3)]), 0));
        // Unknown signers don't help.
        assert!(!owners.authorizes(&Credential::of(vec![addr(1), addr(9)]), 0));
    }

    #[test]
    fn locktime_blocks_spending() {
        let owners = OutputOwners {
            locktime: 100,
            threshold: 1,
            addresses: vec![addr(1)],
        };
        let cred = Credential::of(vec![addr(1)]);
        assert!(!owners.authorizes(&cred, 99));
        assert!(owners.authorizes(&cred, 100));
    }

    #[test]
    fn utxo_roundtrips_through_codec() {
        let utxo = Utxo {
            utxo_id: UtxoId::new(Id::from_bytes([1; 32]), 2),
            asset_id: Id::from_bytes([2; 32]),
            amount: 1000,
            payload: Vec::new(),
            owners: OutputOwners::single(addr(1)),
        };
        let manager = CodecManager::new();
        let bytes = manager.marshal(&utxo);
        let (_, decoded): (u16, Utxo) = manager.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, utxo);
    }
}
