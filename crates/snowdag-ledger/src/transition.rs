//! Ledger transitions.
//!
//! A transition is the semantic effect of a transaction: the UTXOs it
//! consumes, the outputs and operations it performs, and the transitions it
//! depends on. It is presented to consensus by one [`crate::LedgerTx`] per
//! epoch; the transition itself is accepted at most once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use snowdag_codec::{CodecManager, Pack, Packer, Unpack, UnpackError, Unpacker};
use snowdag_consensus::choices::{Status, Transition, TransitionRef};
use snowdag_ids::Id;

use crate::fx::Operation;
use crate::state::ChainState;
use crate::utxo::{Credential, TransferOutput, UtxoId};

/// The serialized body of a transition. The transition id is the hash of
/// these bytes (with their codec-version prefix), so the encoding is
/// canonical.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransitionData {
    pub inputs: Vec<UtxoId>,
    pub outputs: Vec<TransferOutput>,
    pub operations: Vec<Operation>,
    pub dependency_ids: Vec<Id>,
    pub credential: Credential,
}

impl Pack for TransitionData {
    fn pack(&self, packer: &mut Packer) {
        self.inputs.pack(packer);
        self.outputs.pack(packer);
        self.operations.pack(packer);
        self.dependency_ids.pack(packer);
        self.credential.pack(packer);
    }
}

impl Unpack for TransitionData {
    fn unpack(unpacker: &mut Unpacker) -> Result<Self, UnpackError> {
        Ok(Self {
            inputs: Vec::<UtxoId>::unpack(unpacker)?,
            outputs: Vec::<TransferOutput>::unpack(unpacker)?,
            operations: Vec::<Operation>::unpack(unpacker)?,
            dependency_ids: Vec::<Id>::unpack(unpacker)?,
            credential: Credential::unpack(unpacker)?,
        })
    }
}

/// A transition with live decision state.
pub struct LedgerTransition {
    id: Id,
    data: TransitionData,
    dependencies: Vec<TransitionRef>,
    bytes: Vec<u8>,
    status: RwLock<Status>,
    accepted_epoch: RwLock<Option<u32>>,
    presentations: AtomicUsize,
}

impl LedgerTransition {
    /// Wraps parsed data. `bytes` must be the exact serialized form the id
    /// was derived from.
    pub fn new(
        data: TransitionData,
        dependencies: Vec<TransitionRef>,
        bytes: Vec<u8>,
        status: Status,
    ) -> Self {
        Self {
            id: Id::from_hash(&bytes),
            data,
            dependencies,
            bytes,
            status: RwLock::new(status),
            accepted_epoch: RwLock::new(None),
            presentations: AtomicUsize::new(0),
        }
    }

    /// Serializes `data` under the manager's current version and wraps it.
    pub fn from_data(
        data: TransitionData,
        dependencies: Vec<TransitionRef>,
        codec: &CodecManager,
    ) -> Self {
        let bytes = codec.marshal(&data);
        Self::new(data, dependencies, bytes, Status::Processing)
    }

    #[must_use]
    pub fn data(&self) -> &TransitionData {
        &self.data
    }

    #[must_use]
    pub fn inputs(&self) -> &[UtxoId] {
        &self.data.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[TransferOutput] {
        &self.data.outputs
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.data.operations
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.data.credential
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn accepted_epoch(&self) -> Option<u32> {
        *self.accepted_epoch.read()
    }

    /// Notes another transaction presenting this transition.
    pub fn register_presentation(&self) {
        self.presentations.fetch_add(1, Ordering::AcqRel);
    }

    /// Notes a presentation being decided; returns how many remain. The
    /// transition itself is only rejected once the count reaches zero
    /// without an acceptance.
    pub fn presentation_decided(&self) -> usize {
        let prev = self.presentations.fetch_sub(1, Ordering::AcqRel);
        prev.saturating_sub(1)
    }
}

impl Transition for LedgerTransition {
    fn id(&self) -> Id {
        self.id
    }

    fn input_ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.data.inputs.iter().map(UtxoId::input_id).collect();
        ids.extend(
            self.data
                .operations
                .iter()
                .flat_map(|op| op.consumed_utxos.iter().map(UtxoId::input_id)),
        );
        ids
    }

    fn dependencies(&self) -> Vec<TransitionRef> {
        self.dependencies.clone()
    }

    fn status(&self) -> Status {
        *self.status.read()
    }

    fn accept(&self, epoch: u32) -> snowdag_consensus::Result<()> {
        *self.status.write() = Status::Accepted;
        *self.accepted_epoch.write() = Some(epoch);
        Ok(())
    }

    fn reject(&self, _epoch: u32) -> snowdag_consensus::Result<()> {
        let mut status = self.status.write();
        if *status == Status::Processing {
            *status = Status::Rejected;
        }
        Ok(())
    }
}

/// A dependency known only through chain state: its status is whatever the
/// status record says. Produced when a transition references a dependency
/// the ledger is not currently processing.
pub struct StoredTransition {
    id: Id,
    state: Arc<ChainState>,
}

impl StoredTransition {
    pub fn new(id: Id, state: Arc<ChainState>) -> Self {
        Self { id, state }
    }
}

impl Transition for StoredTransition {
    fn id(&self) -> Id {
        self.id
    }

    fn input_ids(&self) -> Vec<Id> {
        Vec::new()
    }

    fn dependencies(&self) -> Vec<TransitionRef> {
        Vec::new()
    }

    fn status(&self) -> Status {
        self.state.status(&self.id).unwrap_or(Status::Unknown)
    }

    fn accept(&self, _epoch: u32) -> snowdag_consensus::Result<()> {
        Err(snowdag_consensus::ConsensusError::op(format!(
            "stored transition {} is decided through its presenting transaction",
            self.id
        )))
    }

    fn reject(&self, _epoch: u32) -> snowdag_consensus::Result<()> {
        Err(snowdag_consensus::ConsensusError::op(format!(
            "stored transition {} is decided through its presenting transaction",
            self.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snowdag_codec::CODEC_VERSION_PRE_FORK;

    #[test]
    fn id_is_hash_of_bytes() {
        let codec = CodecManager::new();
        let a = LedgerTransition::from_data(TransitionData::default(), Vec::new(), &codec);
        let b = LedgerTransition::from_data(TransitionData::default(), Vec::new(), &codec);
        assert_eq!(a.id(), b.id());

        // A different codec version yields different bytes, hence a
        // different id.
        let old_codec = CodecManager::with_version(CODEC_VERSION_PRE_FORK);
        let c = LedgerTransition::from_data(TransitionData::default(), Vec::new(), &old_codec);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn input_ids_cover_operations() {
        let codec = CodecManager::new();
        let op_input = Id::from_bytes([5; 32]);
        let data = TransitionData {
            inputs: vec![UtxoId::new(Id::from_bytes([1; 32]), 0)],
            operations: vec![crate::fx::Operation {
                asset_id: Id::from_bytes([2; 32]),
                consumed_utxos: vec![UtxoId::new(op_input, 7)],
                kind: crate::fx::OperationKind::Mint {
                    amount: 1,
                    to: Default::default(),
                },
            }],
            ..Default::default()
        };
        let transition = LedgerTransition::from_data(data, Vec::new(), &codec);
        let ids = transition.input_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&UtxoId::new(op_input, 7).input_id()));
    }

    #[test]
    fn accept_records_epoch() {
        let codec = CodecManager::new();
        let transition =
            LedgerTransition::from_data(TransitionData::default(), Vec::new(), &codec);
        assert_eq!(transition.status(), Status::Processing);
        transition.accept(3).unwrap();
        assert_eq!(transition.status(), Status::Accepted);
        assert_eq!(transition.accepted_epoch(), Some(3));
    }
}
