//! Ledger transactions: a transition presented in one epoch.

use std::sync::Arc;

use parking_lot::RwLock;
use snowdag_codec::Packer;
use snowdag_consensus::choices::{Decidable, Status, Transition, TransitionRef, Tx};
use snowdag_consensus::ConsensusError;
use snowdag_ids::Id;

use crate::transition::LedgerTransition;
use crate::vm::Ledger;

/// Presents a [`LedgerTransition`] in a specific epoch.
///
/// The transaction id is derived from the transition id and the epoch;
/// presentations of the same transition in different epochs are distinct
/// transactions that consensus decides together.
pub struct LedgerTx {
    id: Id,
    transition: Arc<LedgerTransition>,
    epoch: u32,
    restrictions: Vec<Id>,
    status: RwLock<Status>,
    ledger: Arc<Ledger>,
    bytes: Vec<u8>,
}

impl LedgerTx {
    pub fn new(
        ledger: Arc<Ledger>,
        transition: Arc<LedgerTransition>,
        epoch: u32,
        restrictions: Vec<Id>,
    ) -> Self {
        let id = transition.id().prefix(&[u64::from(epoch)]);

        let mut packer = Packer::new(transition.bytes().len() + 64);
        packer.pack_bytes(transition.bytes());
        packer.pack_int(epoch);
        packer.pack_int(restrictions.len() as u32);
        for restriction in &restrictions {
            packer.pack_fixed_bytes(restriction.as_bytes());
        }

        Self {
            id,
            transition,
            epoch,
            restrictions,
            status: RwLock::new(Status::Processing),
            ledger,
            bytes: packer.into_bytes(),
        }
    }

    #[must_use]
    pub fn ledger_transition(&self) -> &Arc<LedgerTransition> {
        &self.transition
    }
}

impl Decidable for LedgerTx {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        *self.status.read()
    }

    fn accept(&self) -> snowdag_consensus::Result<()> {
        self.transition.presentation_decided();
        self.ledger
            .apply_accept(&self.transition, self.epoch)
            .map_err(ConsensusError::from)?;
        *self.status.write() = Status::Accepted;
        self.transition.accept(self.epoch)
    }

    fn reject(&self) -> snowdag_consensus::Result<()> {
        // Only the last surviving presentation carries the transition down
        // with it; rejecting one epoch's presentation leaves the others
        // undisturbed.
        let last = self.transition.presentation_decided() == 0;
        self.ledger
            .apply_reject(&self.transition, last)
            .map_err(ConsensusError::from)?;
        *self.status.write() = Status::Rejected;
        if last {
            self.transition.reject(self.epoch)
        } else {
            Ok(())
        }
    }
}

impl Tx for LedgerTx {
    fn transition(&self) -> TransitionRef {
        self.transition.clone()
    }

    fn epoch(&self) -> u32 {
        self.epoch
    }

    fn restrictions(&self) -> Vec<Id> {
        self.restrictions.clone()
    }

    fn verify(&self) -> snowdag_consensus::Result<()> {
        self.ledger
            .verify_transition(&self.transition, self.epoch)
            .map_err(ConsensusError::from)
    }

    fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}
