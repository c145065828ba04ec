//! The conflict manager.
//!
//! Pure bookkeeping: which transactions are processing, which inputs they
//! spend, and which dependency events are still pending. Consensus logic
//! lives in [`crate::directed`].

use std::collections::HashMap;

use snowdag_ids::Id;
use snowdag_utils::Set;

use crate::choices::{Decidable, Status, Transition, Tx, TxRef};
use crate::events::{Blocker, FireRule};
use crate::{ConsensusError, Result};

/// Tracks processing transactions and fires dependency events.
///
/// Dependency entries are keyed on transition ids; each transaction's own
/// rejector is additionally keyed on its transaction id so conflicts and
/// engine-initiated rejections can trip it directly.
#[derive(Default)]
pub struct Conflicts {
    /// Currently processing transactions.
    txs: HashMap<Id, TxRef>,

    /// Which processing transactions spend each input.
    utxos: HashMap<Id, Set<Id>>,

    /// Which processing transactions present each transition.
    transitions: HashMap<Id, Set<Id>>,

    /// Acceptors: fire once every unaccepted dependency is accepted.
    pending_accept: Blocker,

    /// Rejectors: fire when the transaction's conflict wins, a dependency
    /// dies, or the engine rejects the transaction outright.
    pending_reject: Blocker,

    acceptable: Vec<TxRef>,
    rejectable: Vec<TxRef>,
}

impl Conflicts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of processing transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    #[must_use]
    pub fn processing(&self, tx_id: &Id) -> bool {
        self.txs.contains_key(tx_id)
    }

    #[must_use]
    pub fn get(&self, tx_id: &Id) -> Option<TxRef> {
        self.txs.get(tx_id).cloned()
    }

    /// Processing transactions presenting `transition_id`.
    #[must_use]
    pub fn presenters(&self, transition_id: &Id) -> Set<Id> {
        self.transitions
            .get(transition_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts a processing transaction: indexes its consumed inputs and its
    /// transition, and registers a rejector that fires if the transaction
    /// itself is rejected or any unaccepted dependency dies.
    pub fn add(&mut self, tx: TxRef) -> Result<()> {
        let tx_id = tx.id();
        if self.txs.contains_key(&tx_id) {
            return Err(ConsensusError::DuplicateTx(tx_id));
        }

        let transition = tx.transition();
        for input_id in transition.input_ids() {
            self.utxos.entry(input_id).or_default().add(tx_id);
        }
        self.transitions
            .entry(transition.id())
            .or_default()
            .add(tx_id);

        // The dependencies can't already be rejected: the transaction is
        // assumed valid when it is added.
        let mut deps = vec![tx_id];
        for dep in transition.dependencies() {
            if dep.status() != Status::Accepted {
                deps.push(dep.id());
            }
        }
        self.pending_reject
            .register(tx_id, deps, FireRule::AnyFulfilled);

        self.txs.insert(tx_id, tx);
        Ok(())
    }

    /// True iff none of the transaction's inputs has a processing spender.
    /// Assumes `tx` has not been added.
    #[must_use]
    pub fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        tx.transition()
            .input_ids()
            .iter()
            .all(|input_id| !self.utxos.contains_key(input_id))
    }

    /// Processing transactions that conflict with `tx` on at least one
    /// input, excluding `tx` itself.
    #[must_use]
    pub fn conflicts(&self, tx: &dyn Tx) -> Set<Id> {
        let tx_id = tx.id();
        let mut conflicts = Set::new();
        for input_id in tx.transition().input_ids() {
            if let Some(spenders) = self.utxos.get(&input_id) {
                conflicts.union(spenders);
            }
        }
        conflicts.remove(&tx_id);
        conflicts
    }

    /// Conditionally accepts `tx_id`: once every unaccepted dependency of
    /// its transition is accepted, the transaction becomes acceptable.
    ///
    /// May only be called while all unaccepted dependencies are still
    /// processing.
    pub fn accept(&mut self, tx_id: Id) -> Result<()> {
        let tx = self
            .txs
            .get(&tx_id)
            .cloned()
            .ok_or(ConsensusError::UnknownTx(tx_id))?;

        let deps: Vec<Id> = tx
            .transition()
            .dependencies()
            .into_iter()
            .filter(|dep| dep.status() != Status::Accepted)
            .map(|dep| dep.id())
            .collect();

        if let Some(fired) = self
            .pending_accept
            .register(tx_id, deps, FireRule::AllFulfilled)
        {
            self.enqueue_acceptable(fired);
        }
        Ok(())
    }

    /// Rejects `tx_id` outright by tripping its rejector. Used by the graph
    /// for epoch-sibling and restriction rejections, which are not visible in
    /// the input index.
    pub fn reject(&mut self, tx_id: Id) {
        for fired in self.pending_reject.fulfill(tx_id) {
            self.enqueue_rejectable(fired);
        }
    }

    /// Drains the acceptable and rejectable queues.
    ///
    /// Every drained transaction is removed from the processing set and the
    /// input/transition indexes, and its dependents are notified. Accepting
    /// or rejecting the returned transactions may make more transactions
    /// updateable, so callers loop until both slices come back empty.
    pub fn updateable(&mut self) -> (Vec<TxRef>, Vec<TxRef>) {
        let acceptable: Vec<TxRef> = std::mem::take(&mut self.acceptable)
            .into_iter()
            .filter(|tx| self.txs.contains_key(&tx.id()))
            .collect();
        for tx in &acceptable {
            self.remove_accepted(tx);
        }

        let rejectable: Vec<TxRef> = std::mem::take(&mut self.rejectable)
            .into_iter()
            .filter(|tx| self.txs.contains_key(&tx.id()))
            .collect();
        for tx in &rejectable {
            self.remove_rejected(tx);
        }

        (acceptable, rejectable)
    }

    fn remove_accepted(&mut self, tx: &TxRef) {
        let tx_id = tx.id();
        let transition = tx.transition();
        let transition_id = transition.id();

        self.unindex(tx);

        // Dependents may progress; nothing can be rejected through this
        // transaction or its transition anymore.
        let fired = self.pending_accept.fulfill(transition_id);
        for id in fired {
            self.enqueue_acceptable(id);
        }
        self.pending_reject.abandon(tx_id);
        self.pending_reject.abandon(transition_id);

        // Every remaining spender of this transaction's inputs loses.
        for conflict_id in self.conflicts(tx.as_ref()).to_vec() {
            for fired in self.pending_reject.fulfill(conflict_id) {
                self.enqueue_rejectable(fired);
            }
        }
    }

    fn remove_rejected(&mut self, tx: &TxRef) {
        let tx_id = tx.id();
        let transition = tx.transition();
        let transition_id = transition.id();

        self.unindex(tx);

        for fired in self.pending_reject.fulfill(tx_id) {
            self.enqueue_rejectable(fired);
        }
        self.pending_accept.abandon(tx_id);

        // The transition itself dies only when its last presentation is
        // rejected without any having been accepted.
        let orphaned = !self.transitions.contains_key(&transition_id)
            && transition.status() != Status::Accepted;
        if orphaned {
            for fired in self.pending_reject.fulfill(transition_id) {
                self.enqueue_rejectable(fired);
            }
            self.pending_accept.abandon(transition_id);
        }
    }

    /// Removes `tx` from the processing set and all indexes, dropping empty
    /// buckets.
    fn unindex(&mut self, tx: &TxRef) {
        let tx_id = tx.id();
        let transition = tx.transition();

        for input_id in transition.input_ids() {
            if let Some(spenders) = self.utxos.get_mut(&input_id) {
                spenders.remove(&tx_id);
                if spenders.is_empty() {
                    self.utxos.remove(&input_id);
                }
            }
        }
        if let Some(presenters) = self.transitions.get_mut(&transition.id()) {
            presenters.remove(&tx_id);
            if presenters.is_empty() {
                self.transitions.remove(&transition.id());
            }
        }
        self.txs.remove(&tx_id);
    }

    fn enqueue_acceptable(&mut self, tx_id: Id) {
        if let Some(tx) = self.txs.get(&tx_id) {
            self.acceptable.push(tx.clone());
        }
    }

    fn enqueue_rejectable(&mut self, tx_id: Id) {
        if let Some(tx) = self.txs.get(&tx_id) {
            self.rejectable.push(tx.clone());
        }
    }

    /// True when an input id has no processing spender. Test hook for the
    /// symmetric-removal invariant.
    #[must_use]
    pub fn input_free(&self, input_id: &Id) -> bool {
        !self.utxos.contains_key(input_id)
    }
}
