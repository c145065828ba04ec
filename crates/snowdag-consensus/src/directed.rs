//! The snowstorm consensus graph.
//!
//! Every processing transaction carries snowball counters. Conflicting
//! transactions are joined by directed edges pointing from the currently
//! losing spender to the winning one; a transaction is preferred iff it has
//! no outbound edge. Poll results bump counters, flip edges, and finalize
//! preferred transactions, which the conflict manager then resolves into
//! accept/reject decisions together with their dependents.

use std::collections::HashMap;
use std::sync::Arc;

use snowdag_ids::Id;
use snowdag_utils::{Bag, Set};
use tracing::debug;

use crate::choices::{Decidable, Transition, Tx, TxRef};
use crate::conflicts::Conflicts;
use crate::metrics::{Counter, Gauge, Registry};
use crate::parameters::Parameters;
use crate::Result;

/// Per-transaction snowball counters.
///
/// `confidence` is the consecutive-successful-poll streak, tracked lazily
/// through the sequence number of the last successful poll. A missed poll
/// restarts the streak; `num_successful_polls` never decreases.
#[derive(Debug, Default)]
struct Snowball {
    num_successful_polls: u64,
    confidence: u64,
    last_vote: u64,
}

impl Snowball {
    fn record_successful_poll(&mut self, poll: u64) {
        if self.last_vote + 1 == poll {
            self.confidence += 1;
        } else {
            self.confidence = 1;
        }
        self.last_vote = poll;
        self.num_successful_polls += 1;
    }

    fn finalized(&self, params: &Parameters, rogue: bool) -> bool {
        let beta = if rogue {
            params.beta_rogue
        } else {
            params.beta_virtuous
        };
        self.confidence >= beta as u64
    }
}

struct TxNode {
    tx: TxRef,
    sb: Snowball,
    /// Sticky: set as soon as the transaction ever had a conflict.
    rogue: bool,
    /// Conditionally accepted; waiting on dependencies in the conflict
    /// manager.
    pending_accept: bool,
    /// Conflicts this transaction currently loses to.
    outs: Set<Id>,
    /// Conflicts currently losing to this transaction.
    ins: Set<Id>,
}

/// The conflict-aware consensus layer.
pub struct DirectedGraph {
    params: Parameters,
    cm: Conflicts,
    txs: HashMap<Id, TxNode>,

    /// Transition id -> processing transactions restricting it.
    restrictions: HashMap<Id, Set<Id>>,

    /// Transactions with no outbound conflict edge.
    preferences: Set<Id>,

    /// Processing transactions with no conflicts at all.
    virtuous: Set<Id>,

    /// Virtuous transactions that still need polls. Emptied by conflicts and
    /// by conditional acceptance; drives [`DirectedGraph::quiesce`].
    virtuous_voting: Set<Id>,

    poll_number: u64,

    num_processing: Arc<Gauge>,
    num_accepted: Arc<Counter>,
    num_rejected: Arc<Counter>,
}

impl DirectedGraph {
    /// Builds a graph over `cm`, registering its metrics under `registry`.
    ///
    /// Fails on invalid parameters or a metric name collision.
    pub fn new(cm: Conflicts, params: Parameters, registry: &Registry) -> Result<Self> {
        params.validate()?;
        let num_processing =
            registry.register_gauge("tx_processing", "transactions currently processing")?;
        let num_accepted =
            registry.register_counter("tx_accepted", "transactions accepted so far")?;
        let num_rejected =
            registry.register_counter("tx_rejected", "transactions rejected so far")?;
        Ok(Self {
            params,
            cm,
            txs: HashMap::new(),
            restrictions: HashMap::new(),
            preferences: Set::new(),
            virtuous: Set::new(),
            virtuous_voting: Set::new(),
            poll_number: 0,
            num_processing,
            num_accepted,
            num_rejected,
        })
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// True iff `tx` has been issued: processing, accepted, or rejected.
    #[must_use]
    pub fn issued(&self, tx: &dyn Tx) -> bool {
        tx.status().decided() || self.txs.contains_key(&tx.id())
    }

    /// True iff some processing transaction presents `transition_id`.
    #[must_use]
    pub fn transition_processing(&self, transition_id: &Id) -> bool {
        !self.cm.presenters(transition_id).is_empty()
    }

    /// Every transaction still processing. Used by the engine to reissue
    /// survivors across an epoch transition.
    #[must_use]
    pub fn processing_txs(&self) -> Vec<TxRef> {
        self.txs.values().map(|node| node.tx.clone()).collect()
    }

    /// The preferred transaction of every conflict set, plus every virtuous
    /// processing transaction.
    #[must_use]
    pub fn preferences(&self) -> &Set<Id> {
        &self.preferences
    }

    /// Processing transactions with no conflicts.
    #[must_use]
    pub fn virtuous(&self) -> &Set<Id> {
        &self.virtuous
    }

    /// Whether `tx` would be (or is) conflict-free.
    #[must_use]
    pub fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        match self.txs.get(&tx.id()) {
            Some(node) => !node.rogue,
            None => self.cm.is_virtuous(tx),
        }
    }

    /// Processing transactions conflicting with `tx` on inputs.
    #[must_use]
    pub fn conflicts(&self, tx: &dyn Tx) -> Set<Id> {
        self.cm.conflicts(tx)
    }

    /// True when no virtuous transaction still needs polls.
    #[must_use]
    pub fn quiesce(&self) -> bool {
        self.virtuous_voting.is_empty()
    }

    /// True when no transaction is processing.
    #[must_use]
    pub fn finalized(&self) -> bool {
        self.txs.is_empty()
    }

    /// Issues `tx` into consensus. Re-issuing an already issued transaction
    /// is a no-op.
    pub fn add(&mut self, tx: TxRef) -> Result<()> {
        if self.issued(tx.as_ref()) {
            return Ok(());
        }

        let tx_id = tx.id();
        let transition = tx.transition();
        let transition_id = transition.id();
        let epoch = tx.epoch();

        // The full conflict set: shared inputs, other presentations of the
        // same transition, and restriction violations in either direction.
        let mut conflicts = self.cm.conflicts(tx.as_ref());
        for sibling in self.cm.presenters(&transition_id).to_vec() {
            conflicts.add(sibling);
        }
        for restricted in tx.restrictions() {
            for other in self.cm.presenters(&restricted).to_vec() {
                if self.epoch_of(&other) > epoch {
                    conflicts.add(other);
                }
            }
            self.restrictions.entry(restricted).or_default().add(tx_id);
        }
        if let Some(restrictors) = self.restrictions.get(&transition_id) {
            for restrictor in restrictors.to_vec() {
                if restrictor != tx_id && self.epoch_of(&restrictor) < epoch {
                    conflicts.add(restrictor);
                }
            }
        }
        conflicts.remove(&tx_id);

        self.cm.add(tx.clone())?;

        let mut node = TxNode {
            tx,
            sb: Snowball::default(),
            rogue: !conflicts.is_empty(),
            pending_accept: false,
            outs: Set::new(),
            ins: Set::new(),
        };

        if conflicts.is_empty() {
            self.virtuous.add(tx_id);
            self.virtuous_voting.add(tx_id);
        } else {
            // The newcomer starts as the loser of every existing conflict.
            for conflict_id in conflicts.to_vec() {
                if let Some(conflict) = self.txs.get_mut(&conflict_id) {
                    conflict.rogue = true;
                    conflict.ins.add(tx_id);
                }
                self.virtuous.remove(&conflict_id);
                self.virtuous_voting.remove(&conflict_id);
                node.outs.add(conflict_id);
            }
        }

        if node.outs.is_empty() {
            self.preferences.add(tx_id);
        }
        self.txs.insert(tx_id, node);
        self.num_processing.inc();
        Ok(())
    }

    /// Applies a poll result.
    ///
    /// Every transaction with at least `alpha` votes in the bag records a
    /// successful poll; edges flip where a transaction overtakes a conflict;
    /// finalized preferred transactions are conditionally accepted; then the
    /// conflict manager is drained to a fixed point, accepting and rejecting
    /// through the collaborator callbacks.
    ///
    /// Returns true iff the preference structure changed or a transaction
    /// was decided. A collaborator error aborts the sweep and is surfaced;
    /// the graph may be left partially updated.
    pub fn record_poll(&mut self, mut votes: Bag<Id>) -> Result<bool> {
        self.poll_number += 1;
        let mut changed = false;

        votes.set_threshold(self.params.alpha);
        for vote_id in votes.threshold().to_vec() {
            // Decided or unknown choices are simply not counted.
            let Some(node) = self.txs.get_mut(&vote_id) else {
                continue;
            };
            node.sb.record_successful_poll(self.poll_number);
            let nsp = node.sb.num_successful_polls;
            let outs = node.outs.to_vec();

            for out_id in outs {
                let out_nsp = match self.txs.get(&out_id) {
                    Some(out) => out.sb.num_successful_polls,
                    None => continue,
                };
                if nsp > out_nsp {
                    self.redirect(vote_id, out_id);
                    changed = true;
                }
            }

            let Some(node) = self.txs.get(&vote_id) else {
                continue;
            };
            if node.outs.is_empty() {
                self.preferences.add(vote_id);
            }
            if !node.pending_accept
                && node.outs.is_empty()
                && node.sb.finalized(&self.params, node.rogue)
            {
                self.cm.accept(vote_id)?;
                if let Some(node) = self.txs.get_mut(&vote_id) {
                    node.pending_accept = true;
                }
                self.virtuous_voting.remove(&vote_id);
            }
        }

        loop {
            let (acceptable, rejectable) = self.cm.updateable();
            if acceptable.is_empty() && rejectable.is_empty() {
                break;
            }
            for tx in acceptable {
                debug!(tx = %tx.id(), "accepting transaction");
                self.remove_on_accept(&tx);
                tx.accept()?;
                self.num_processing.dec();
                self.num_accepted.inc();
                changed = true;
            }
            for tx in rejectable {
                debug!(tx = %tx.id(), "rejecting transaction");
                self.remove_node(&tx.id());
                tx.reject()?;
                self.num_processing.dec();
                self.num_rejected.inc();
                changed = true;
            }
        }

        Ok(changed)
    }

    fn epoch_of(&self, tx_id: &Id) -> u32 {
        self.txs
            .get(tx_id)
            .map(|node| node.tx.epoch())
            .unwrap_or_default()
    }

    /// `winner` has strictly more successful polls than `loser`: the edge
    /// between them now points from `loser` to `winner`.
    fn redirect(&mut self, winner: Id, loser: Id) {
        if let Some(node) = self.txs.get_mut(&winner) {
            node.outs.remove(&loser);
            node.ins.add(loser);
        }
        if let Some(node) = self.txs.get_mut(&loser) {
            node.ins.remove(&winner);
            node.outs.add(winner);
        }
        self.preferences.remove(&loser);
    }

    /// Graph-side consequences of accepting `tx`: every other presentation
    /// of its transition and every restriction violator is rejected through
    /// the conflict manager, then the node is dropped. Input conflicts were
    /// already handled inside the manager.
    fn remove_on_accept(&mut self, tx: &TxRef) {
        let tx_id = tx.id();
        let transition_id = tx.transition().id();
        let epoch = tx.epoch();

        for sibling in self.cm.presenters(&transition_id).to_vec() {
            if sibling != tx_id {
                self.cm.reject(sibling);
            }
        }
        for restricted in tx.restrictions() {
            for other in self.cm.presenters(&restricted).to_vec() {
                if self.epoch_of(&other) > epoch {
                    self.cm.reject(other);
                }
            }
        }
        if let Some(restrictors) = self.restrictions.get(&transition_id) {
            for restrictor in restrictors.to_vec() {
                if restrictor != tx_id && self.epoch_of(&restrictor) < epoch {
                    self.cm.reject(restrictor);
                }
            }
        }

        self.remove_node(&tx_id);
    }

    /// Drops a decided transaction from the graph, rewiring conflict edges.
    /// A conflict that loses its last outbound edge becomes preferred.
    fn remove_node(&mut self, tx_id: &Id) {
        let Some(node) = self.txs.remove(tx_id) else {
            return;
        };
        self.preferences.remove(tx_id);
        self.virtuous.remove(tx_id);
        self.virtuous_voting.remove(tx_id);

        for restricted in node.tx.restrictions() {
            if let Some(restrictors) = self.restrictions.get_mut(&restricted) {
                restrictors.remove(tx_id);
                if restrictors.is_empty() {
                    self.restrictions.remove(&restricted);
                }
            }
        }

        for loser_id in node.ins.to_vec() {
            if let Some(loser) = self.txs.get_mut(&loser_id) {
                loser.outs.remove(tx_id);
                if loser.outs.is_empty() {
                    self.preferences.add(loser_id);
                }
            }
        }
        for winner_id in node.outs.to_vec() {
            if let Some(winner) = self.txs.get_mut(&winner_id) {
                winner.ins.remove(tx_id);
            }
        }
    }
}
