//! Feature-extension operations.
//!
//! The operation kinds a transition may carry beyond plain transfers: asset
//! minting, NFT minting and transfer, and managed-asset status updates. Each
//! variant knows how to verify itself against the outputs it consumes.

use serde::{Deserialize, Serialize};
use snowdag_codec::{Pack, Packer, Unpack, UnpackError, Unpacker};
use snowdag_ids::Id;

use crate::utxo::{Credential, OutputOwners, Utxo, UtxoId};
use crate::{LedgerError, Result};

/// Per-asset managed status: whether transfers are frozen and who manages
/// the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AssetStatus {
    pub frozen: bool,
    pub manager: OutputOwners,
}

impl Pack for AssetStatus {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_bool(self.frozen);
        self.manager.pack(packer);
    }
}

impl Unpack for AssetStatus {
    fn unpack(unpacker: &mut Unpacker) -> std::result::Result<Self, UnpackError> {
        Ok(Self {
            frozen: unpacker.unpack_bool()?,
            manager: OutputOwners::unpack(unpacker)?,
        })
    }
}

/// The stored record for a managed asset. Status changes take effect two
/// epochs after they are accepted: reads in epoch `last_updated_epoch + 1`
/// or earlier still see the previous status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ManagedAssetRecord {
    pub last_updated_epoch: u32,
    pub current: AssetStatus,
    pub previous: AssetStatus,
}

impl ManagedAssetRecord {
    /// The status in effect for a transaction in `epoch`.
    #[must_use]
    pub fn effective(&self, epoch: u32) -> &AssetStatus {
        if epoch <= self.last_updated_epoch + 1 {
            &self.previous
        } else {
            &self.current
        }
    }

    /// Whether an update operation is allowed in `epoch`.
    pub fn check_updatable(&self, epoch: u32) -> Result<()> {
        if epoch < self.last_updated_epoch + 2 {
            return Err(LedgerError::StatusChangeTooSoon {
                epoch,
                last_updated: self.last_updated_epoch,
            });
        }
        Ok(())
    }

    /// The record after applying a status update accepted in `epoch`.
    #[must_use]
    pub fn updated(&self, epoch: u32, status: AssetStatus) -> Self {
        Self {
            last_updated_epoch: epoch,
            previous: self.current.clone(),
            current: status,
        }
    }
}

impl Pack for ManagedAssetRecord {
    fn pack(&self, packer: &mut Packer) {
        packer.pack_int(self.last_updated_epoch);
        self.current.pack(packer);
        self.previous.pack(packer);
    }
}

impl Unpack for ManagedAssetRecord {
    fn unpack(unpacker: &mut Unpacker) -> std::result::Result<Self, UnpackError> {
        Ok(Self {
            last_updated_epoch: unpacker.unpack_int()?,
            current: AssetStatus::unpack(unpacker)?,
            previous: AssetStatus::unpack(unpacker)?,
        })
    }
}

/// An operation on an asset, consuming `consumed_utxos` of that asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub asset_id: Id,
    pub consumed_utxos: Vec<UtxoId>,
    pub kind: OperationKind,
}

/// The operation kinds the ledger understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Mints `amount` new units to `to`.
    Mint { amount: u64, to: OutputOwners },

    /// Mints an NFT in `group_id` carrying `payload`.
    MintNft {
        group_id: u32,
        payload: Vec<u8>,
        to: OutputOwners,
    },

    /// Moves an NFT to a new owner.
    TransferNft {
        group_id: u32,
        payload: Vec<u8>,
        to: OutputOwners,
    },

    /// Replaces a managed asset's status. Takes effect after two epochs.
    UpdateManagedAsset { status: AssetStatus },
}

impl Operation {
    /// Verifies this operation may consume `utxos` under `credential`.
    ///
    /// Epoch-sensitive managed-asset checks happen in the ledger, which
    /// knows the stored record; this validates structure and permissions.
    pub fn verify(&self, utxos: &[Utxo], credential: &Credential, time: u64) -> Result<()> {
        if utxos.len() != self.consumed_utxos.len() {
            return Err(LedgerError::InvalidTx(
                "operation consumed utxo mismatch".to_string(),
            ));
        }
        for utxo in utxos {
            if utxo.asset_id != self.asset_id {
                return Err(LedgerError::InvalidTx(format!(
                    "operation on asset {} consumes utxo of asset {}",
                    self.asset_id, utxo.asset_id
                )));
            }
            if !utxo.owners.authorizes(credential, time) {
                return Err(LedgerError::NoPermission);
            }
        }
        match &self.kind {
            OperationKind::Mint { amount, .. } => {
                if *amount == 0 {
                    return Err(LedgerError::InvalidTx("minting zero units".to_string()));
                }
            }
            OperationKind::MintNft { payload, .. } | OperationKind::TransferNft { payload, .. } => {
                if payload.len() > 1024 {
                    return Err(LedgerError::InvalidTx("nft payload too large".to_string()));
                }
            }
            OperationKind::UpdateManagedAsset { status } => {
                if status.manager.threshold == 0 || status.manager.addresses.is_empty() {
                    return Err(LedgerError::InvalidTx(
                        "managed asset must keep a manager".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

const OP_MINT: u8 = 0;
const OP_MINT_NFT: u8 = 1;
const OP_TRANSFER_NFT: u8 = 2;
const OP_UPDATE_MANAGED: u8 = 3;

impl Pack for Operation {
    fn pack(&self, packer: &mut Packer) {
        self.asset_id.pack(packer);
        self.consumed_utxos.pack(packer);
        match &self.kind {
            OperationKind::Mint { amount, to } => {
                packer.pack_byte(OP_MINT);
                packer.pack_long(*amount);
                to.pack(packer);
            }
            OperationKind::MintNft {
                group_id,
                payload,
                to,
            } => {
                packer.pack_byte(OP_MINT_NFT);
                packer.pack_int(*group_id);
                packer.pack_bytes(payload);
                to.pack(packer);
            }
            OperationKind::TransferNft {
                group_id,
                payload,
                to,
            } => {
                packer.pack_byte(OP_TRANSFER_NFT);
                packer.pack_int(*group_id);
                packer.pack_bytes(payload);
                to.pack(packer);
            }
            OperationKind::UpdateManagedAsset { status } => {
                packer.pack_byte(OP_UPDATE_MANAGED);
                status.pack(packer);
            }
        }
    }
}

impl Unpack for Operation {
    fn unpack(unpacker: &mut Unpacker) -> std::result::Result<Self, UnpackError> {
        let asset_id = Id::unpack(unpacker)?;
        let consumed_utxos = Vec::<UtxoId>::unpack(unpacker)?;
        let kind = match unpacker.unpack_byte()? {
            OP_MINT => OperationKind::Mint {
                amount: unpacker.unpack_long()?,
                to: OutputOwners::unpack(unpacker)?,
            },
            OP_MINT_NFT => OperationKind::MintNft {
                group_id: unpacker.unpack_int()?,
                payload: unpacker.unpack_bytes()?,
                to: OutputOwners::unpack(unpacker)?,
            },
            OP_TRANSFER_NFT => OperationKind::TransferNft {
                group_id: unpacker.unpack_int()?,
                payload: unpacker.unpack_bytes()?,
                to: OutputOwners::unpack(unpacker)?,
            },
            OP_UPDATE_MANAGED => OperationKind::UpdateManagedAsset {
                status: AssetStatus::unpack(unpacker)?,
            },
            other => return Err(UnpackError::InvalidBool(other)),
        };
        Ok(Self {
            asset_id,
            consumed_utxos,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo::UtxoId;
    use snowdag_ids::ShortId;

    fn addr(byte: u8) -> ShortId {
        ShortId::from_bytes([byte; 20])
    }

    fn utxo(asset: Id, owner: ShortId) -> Utxo {
        Utxo {
            utxo_id: UtxoId::new(Id::from_bytes([9; 32]), 0),
            asset_id: asset,
            amount: 1,
            payload: Vec::new(),
            owners: OutputOwners::single(owner),
        }
    }

    #[test]
    fn effective_status_lags_two_epochs() {
        let record = ManagedAssetRecord {
            last_updated_epoch: 5,
            current: AssetStatus {
                frozen: true,
                manager: OutputOwners::single(addr(1)),
            },
            previous: AssetStatus::default(),
        };
        assert!(!record.effective(5).frozen);
        assert!(!record.effective(6).frozen);
        assert!(record.effective(7).frozen);
    }

    #[test]
    fn update_needs_two_epoch_gap() {
        let record = ManagedAssetRecord {
            last_updated_epoch: 5,
            ..Default::default()
        };
        assert!(record.check_updatable(6).is_err());
        assert!(record.check_updatable(7).is_ok());
    }

    #[test]
    fn updated_rotates_statuses() {
        let first = AssetStatus {
            frozen: true,
            manager: OutputOwners::single(addr(1)),
        };
        let record = ManagedAssetRecord::default().updated(3, first.clone());
        assert_eq!(record.last_updated_epoch, 3);
        assert_eq!(record.current, first);
        assert_eq!(record.previous, AssetStatus::default());
    }

    #[test]
    fn operation_checks_asset_and_permission() {
        let asset = Id::from_bytes([1; 32]);
        let op = Operation {
            asset_id: asset,
            consumed_utxos: vec![UtxoId::new(Id::from_bytes([2; 32]), 0)],
            kind: OperationKind::Mint {
                amount: 5,
                to: OutputOwners::single(addr(2)),
            },
        };

        let owned = utxo(asset, addr(1));
        assert!(op
            .verify(&[owned.clone()], &Credential::of(vec![addr(1)]), 0)
            .is_ok());
        assert!(matches!(
            op.verify(&[owned], &Credential::of(vec![addr(9)]), 0),
            Err(LedgerError::NoPermission)
        ));

        let wrong_asset = utxo(Id::from_bytes([3; 32]), addr(1));
        assert!(op
            .verify(&[wrong_asset], &Credential::of(vec![addr(1)]), 0)
            .is_err());
    }

    #[test]
    fn operations_roundtrip() {
        let manager = snowdag_codec::CodecManager::new();
        let op = Operation {
            asset_id: Id::from_bytes([1; 32]),
            consumed_utxos: vec![UtxoId::new(Id::from_bytes([2; 32]), 0)],
            kind: OperationKind::UpdateManagedAsset {
                status: AssetStatus {
                    frozen: true,
                    manager: OutputOwners::single(addr(1)),
                },
            },
        };
        let bytes = manager.marshal(&op);
        let (_, decoded): (u16, Operation) = manager.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, op);
    }
}
