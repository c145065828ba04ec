//! Transaction doubles for consensus tests.
//!
//! Public so downstream crates exercise the engine against the same doubles.

use std::sync::Arc;

use parking_lot::RwLock;
use snowdag_ids::Id;

use crate::choices::{Decidable, Status, Transition, TransitionRef, Tx};
use crate::{ConsensusError, Result};

/// A configurable [`Transition`] double.
pub struct TestTransition {
    id: Id,
    input_ids: Vec<Id>,
    dependencies: Vec<TransitionRef>,
    status: RwLock<Status>,
    accepted_epoch: RwLock<Option<u32>>,
}

impl TestTransition {
    pub fn new(id: Id, input_ids: Vec<Id>) -> Self {
        Self::with_dependencies(id, input_ids, Vec::new())
    }

    pub fn with_dependencies(
        id: Id,
        input_ids: Vec<Id>,
        dependencies: Vec<TransitionRef>,
    ) -> Self {
        Self {
            id,
            input_ids,
            dependencies,
            status: RwLock::new(Status::Processing),
            accepted_epoch: RwLock::new(None),
        }
    }

    /// The epoch this transition was accepted in, if any.
    pub fn accepted_epoch(&self) -> Option<u32> {
        *self.accepted_epoch.read()
    }
}

impl Transition for TestTransition {
    fn id(&self) -> Id {
        self.id
    }

    fn input_ids(&self) -> Vec<Id> {
        self.input_ids.clone()
    }

    fn dependencies(&self) -> Vec<TransitionRef> {
        self.dependencies.clone()
    }

    fn status(&self) -> Status {
        *self.status.read()
    }

    fn accept(&self, epoch: u32) -> Result<()> {
        *self.status.write() = Status::Accepted;
        *self.accepted_epoch.write() = Some(epoch);
        Ok(())
    }

    fn reject(&self, _epoch: u32) -> Result<()> {
        let mut status = self.status.write();
        // Another presentation may already have carried the transition to
        // acceptance.
        if *status == Status::Processing {
            *status = Status::Rejected;
        }
        Ok(())
    }
}

/// A configurable [`Tx`] double presenting a [`TestTransition`] in an epoch.
pub struct TestTx {
    id: Id,
    transition: Arc<TestTransition>,
    epoch: u32,
    restrictions: Vec<Id>,
    status: RwLock<Status>,
    accept_err: Option<String>,
    reject_err: Option<String>,
    verify_err: Option<String>,
    bytes: Vec<u8>,
}

impl TestTx {
    /// A transaction presenting `transition` in `epoch`. The transaction id
    /// is derived from the transition id and the epoch, so presentations in
    /// different epochs get distinct ids.
    pub fn new(transition: Arc<TestTransition>, epoch: u32) -> Self {
        let id = transition.id().prefix(&[u64::from(epoch)]);
        Self::with_id(id, transition, epoch)
    }

    pub fn with_id(id: Id, transition: Arc<TestTransition>, epoch: u32) -> Self {
        Self {
            id,
            transition,
            epoch,
            restrictions: Vec::new(),
            status: RwLock::new(Status::Processing),
            accept_err: None,
            reject_err: None,
            verify_err: None,
            bytes: id.as_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn with_restrictions(mut self, restrictions: Vec<Id>) -> Self {
        self.restrictions = restrictions;
        self
    }

    #[must_use]
    pub fn with_accept_err(mut self, msg: &str) -> Self {
        self.accept_err = Some(msg.to_string());
        self
    }

    #[must_use]
    pub fn with_reject_err(mut self, msg: &str) -> Self {
        self.reject_err = Some(msg.to_string());
        self
    }

    #[must_use]
    pub fn with_verify_err(mut self, msg: &str) -> Self {
        self.verify_err = Some(msg.to_string());
        self
    }

    pub fn test_transition(&self) -> &Arc<TestTransition> {
        &self.transition
    }
}

impl Decidable for TestTx {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        *self.status.read()
    }

    fn accept(&self) -> Result<()> {
        if let Some(msg) = &self.accept_err {
            return Err(ConsensusError::Op(msg.clone()));
        }
        let mut status = self.status.write();
        if *status == Status::Rejected {
            return Err(ConsensusError::Op(format!(
                "accepting {} after rejection",
                self.id
            )));
        }
        *status = Status::Accepted;
        drop(status);
        self.transition.accept(self.epoch)
    }

    fn reject(&self) -> Result<()> {
        if let Some(msg) = &self.reject_err {
            return Err(ConsensusError::Op(msg.clone()));
        }
        let mut status = self.status.write();
        if *status == Status::Accepted {
            return Err(ConsensusError::Op(format!(
                "rejecting {} after acceptance",
                self.id
            )));
        }
        *status = Status::Rejected;
        drop(status);
        self.transition.reject(self.epoch)
    }
}

impl Tx for TestTx {
    fn transition(&self) -> TransitionRef {
        self.transition.clone()
    }

    fn epoch(&self) -> u32 {
        self.epoch
    }

    fn restrictions(&self) -> Vec<Id> {
        self.restrictions.clone()
    }

    fn verify(&self) -> Result<()> {
        match &self.verify_err {
            Some(msg) => Err(ConsensusError::Op(msg.clone())),
            None => Ok(()),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}
