//! The transitive engine.
//!
//! Receives vertices, waits for their dependencies, inserts them into the
//! snowstorm graph, and drives the poll loop: sample validators, push or
//! pull a query, gather the vote bag, feed it to consensus, repoll.
//!
//! All entry points run under the chain lock; collaborators never call back
//! in.

use std::collections::HashMap;
use std::sync::Arc;

use snowdag_consensus::choices::{Decidable, Status, Transition, TransitionRef, Tx};
use snowdag_consensus::{DirectedGraph, TxRef};
use snowdag_ids::{Id, NodeId};
use snowdag_utils::errors::Errors;
use snowdag_utils::{Bag, Set};
use tracing::{debug, info, warn};

use crate::context::ChainContext;
use crate::issuer::Issuer;
use crate::polls::PollSet;
use crate::sender::Sender;
use crate::validators::Validators;
use crate::{EngineError, Result};

/// Transitions batched into one vertex.
pub const BATCH_SIZE: usize = 30;

/// A materialized vertex: canonical bytes plus its parsed transactions.
///
/// The stateless layout lives in [`crate::vertex::Vertex`]; the ledger
/// supplies this view with transactions parsed against chain state.
pub trait DagVertex: Send + Sync {
    fn id(&self) -> Id;

    fn epoch(&self) -> u32;

    fn height(&self) -> u64;

    fn parent_ids(&self) -> Vec<Id>;

    /// The transactions carried by this vertex.
    fn txs(&self) -> Result<Vec<TxRef>>;

    fn bytes(&self) -> Vec<u8>;
}

/// Shared handle to a vertex.
pub type VertexRef = Arc<dyn DagVertex>;

/// Builds new vertices over the current frontier. Collaborator supplied by
/// the ledger.
pub trait VertexBuilder: Send + Sync {
    fn build(
        &self,
        epoch: u32,
        parent_ids: Vec<Id>,
        transitions: Vec<TransitionRef>,
        restrictions: Vec<Id>,
    ) -> Result<VertexRef>;
}

/// The top-level consensus orchestrator for one chain.
pub struct Transitive {
    ctx: ChainContext,
    graph: DirectedGraph,
    validators: Arc<dyn Validators>,
    sender: Arc<dyn Sender>,
    builder: Arc<dyn VertexBuilder>,

    /// Issuer arena. Entries are never removed; `issued`/`abandoned` flags
    /// retire them.
    issuers: Vec<Issuer>,
    /// Vertex id -> arena index, for vertices still waiting.
    pending: HashMap<Id, usize>,
    /// Vertex id -> issuers waiting on it.
    vtx_waiters: HashMap<Id, Vec<usize>>,
    /// Transition id -> issuers waiting on it.
    tr_waiters: HashMap<Id, Vec<usize>>,

    issued_vertices: Set<Id>,
    /// Issued vertices by id, for gossip and re-serving queries.
    vertices: HashMap<Id, VertexRef>,
    /// Issued vertex -> the transaction ids it carries, for widening vertex
    /// votes into transaction votes.
    vertex_txs: HashMap<Id, Vec<Id>>,
    /// Issued vertices without issued children; parents for new batches and
    /// targets for repolls.
    frontier: Set<Id>,

    /// Dependency transitions nobody has presented yet, per epoch.
    missing_transitions: HashMap<u32, Set<Id>>,

    request_id: u32,
    polls: PollSet,
    current_epoch: u32,
    errs: Errors,
}

impl Transitive {
    pub fn new(
        ctx: ChainContext,
        graph: DirectedGraph,
        validators: Arc<dyn Validators>,
        sender: Arc<dyn Sender>,
        builder: Arc<dyn VertexBuilder>,
    ) -> Self {
        let current_epoch = ctx.epoch();
        Self {
            ctx,
            graph,
            validators,
            sender,
            builder,
            issuers: Vec::new(),
            pending: HashMap::new(),
            vtx_waiters: HashMap::new(),
            tr_waiters: HashMap::new(),
            issued_vertices: Set::new(),
            vertices: HashMap::new(),
            vertex_txs: HashMap::new(),
            frontier: Set::new(),
            missing_transitions: HashMap::new(),
            request_id: 0,
            polls: PollSet::new(),
            current_epoch,
            errs: Errors::new(),
        }
    }

    #[must_use]
    pub fn consensus(&self) -> &DirectedGraph {
        &self.graph
    }

    #[must_use]
    pub fn current_epoch(&self) -> u32 {
        self.current_epoch
    }

    #[must_use]
    pub fn errored(&self) -> bool {
        self.errs.errored()
    }

    /// Vertices waiting on dependencies.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn outstanding_polls(&self) -> usize {
        self.polls.len()
    }

    /// Dependency transitions missing in `epoch`.
    #[must_use]
    pub fn missing_transitions(&self, epoch: u32) -> Set<Id> {
        self.missing_transitions
            .get(&epoch)
            .cloned()
            .unwrap_or_default()
    }

    /// Schedules `vertex` for issuance. Returns once the vertex is issued,
    /// queued on missing dependencies, or abandoned.
    pub fn issue(&mut self, vertex: VertexRef) -> Result<()> {
        self.check_halted()?;
        self.issue_internal(vertex, false)?;
        self.check_halted()
    }

    fn issue_internal(&mut self, vertex: VertexRef, updated_epoch: bool) -> Result<()> {
        let vtx_id = vertex.id();
        if self.issued_vertices.contains(&vtx_id) || self.pending.contains_key(&vtx_id) {
            return Ok(());
        }

        let txs = vertex.txs()?;

        let mut vtx_deps = Set::new();
        for parent in vertex.parent_ids() {
            if !self.issued_vertices.contains(&parent) {
                vtx_deps.add(parent);
            }
        }

        let mut unfulfilled = Set::new();
        for tx in &txs {
            for dep in tx.transition().dependencies() {
                if dep.status() == Status::Accepted {
                    continue;
                }
                let dep_id = dep.id();
                if self.graph.transition_processing(&dep_id) {
                    continue;
                }
                unfulfilled.add(dep_id);
                self.missing_transitions
                    .entry(vertex.epoch())
                    .or_default()
                    .add(dep_id);
            }
        }

        let index = self.issuers.len();
        for dep in vtx_deps.iter() {
            self.vtx_waiters.entry(*dep).or_default().push(index);
        }
        for dep in unfulfilled.iter() {
            self.tr_waiters.entry(*dep).or_default().push(index);
        }
        debug!(
            vertex = %vtx_id,
            vtx_deps = vtx_deps.len(),
            tr_deps = unfulfilled.len(),
            "scheduling vertex for issuance"
        );
        self.issuers
            .push(Issuer::new(vertex, txs, updated_epoch, vtx_deps, unfulfilled));
        self.pending.insert(vtx_id, index);

        self.update(index);
        Ok(())
    }

    /// Batches mempool transitions into vertices in the current epoch and
    /// issues them. The mempool drain calls this on flush.
    pub fn issue_transitions(&mut self, transitions: Vec<TransitionRef>) -> Result<()> {
        self.check_halted()?;
        if transitions.is_empty() {
            return Ok(());
        }
        self.batch(self.current_epoch, transitions, Vec::new(), false)?;
        self.check_halted()
    }

    /// A vertex we were waiting on arrived through another path (e.g. state
    /// sync); treat it as issued for dependency purposes.
    pub fn fulfill_vertex(&mut self, vertex_id: Id) {
        let mut work = Vec::new();
        if let Some(waiters) = self.vtx_waiters.remove(&vertex_id) {
            for w in waiters {
                self.issuers[w].fulfill_vtx(&vertex_id);
                work.push(w);
            }
        }
        for index in work {
            self.update(index);
        }
    }

    /// Records one validator's reply to a query. Returns whether consensus
    /// preferences changed.
    pub fn chits(&mut self, request_id: u32, node_id: NodeId, votes: Vec<Id>) -> Result<bool> {
        self.check_halted()?;
        match self.polls.vote(request_id, &node_id, votes) {
            Some(vertex_votes) => self.record_votes(vertex_votes),
            None => Ok(false),
        }
    }

    /// Records a failed query; the poll may complete without that reply.
    pub fn query_failed(&mut self, request_id: u32, node_id: NodeId) -> Result<bool> {
        self.check_halted()?;
        match self.polls.drop(request_id, &node_id) {
            Some(vertex_votes) => self.record_votes(vertex_votes),
            None => Ok(false),
        }
    }

    /// Advances to the current wall-clock epoch, reissuing every surviving
    /// transition into it.
    pub fn advance_epoch(&mut self) -> Result<()> {
        self.check_halted()?;
        let epoch = self.ctx.epoch();
        if epoch <= self.current_epoch {
            return Ok(());
        }
        info!(from = self.current_epoch, to = epoch, "advancing epoch");
        self.current_epoch = epoch;

        let mut surviving: HashMap<Id, TransitionRef> = HashMap::new();
        for tx in self.graph.processing_txs() {
            let transition = tx.transition();
            surviving.entry(transition.id()).or_insert(transition);
        }
        let transitions: Vec<TransitionRef> = surviving.into_values().collect();
        if transitions.is_empty() {
            return Ok(());
        }
        if let Err(err) = self.batch(epoch, transitions, Vec::new(), true) {
            self.errs.add(&err);
            return Err(err);
        }
        self.check_halted()
    }

    /// Gossips a frontier vertex. Driven periodically by the chain router.
    pub fn gossip(&mut self) {
        let Some(vertex_id) = self.frontier.iter().next().copied() else {
            return;
        };
        if let Some(vertex) = self.vertices.get(&vertex_id) {
            self.sender.gossip(vertex_id, &vertex.bytes());
        }
    }

    /// Serves a peer's request for a vertex we have issued.
    #[must_use]
    pub fn get_vertex(&self, vertex_id: &Id) -> Option<VertexRef> {
        self.vertices.get(vertex_id).cloned()
    }

    /// Stops polling. In-flight replies arriving after this are discarded.
    pub fn shutdown(&mut self) {
        self.polls.clear();
        debug!("transitive engine shut down");
    }

    fn check_halted(&self) -> Result<()> {
        if self.errs.errored() {
            return Err(EngineError::Halted(self.errs.to_string()));
        }
        Ok(())
    }

    fn record_votes(&mut self, vertex_votes: Bag<Id>) -> Result<bool> {
        let mut tx_votes = Bag::new();
        for (vertex_id, count) in vertex_votes.iter() {
            if let Some(tx_ids) = self.vertex_txs.get(vertex_id) {
                for tx_id in tx_ids {
                    tx_votes.add_count(*tx_id, count);
                }
            }
        }

        let changed = match self.graph.record_poll(tx_votes) {
            Ok(changed) => changed,
            Err(err) => {
                self.errs.add(&err);
                return Err(err.into());
            }
        };
        self.repoll();
        Ok(changed)
    }

    fn update(&mut self, index: usize) {
        let mut work = vec![index];
        while let Some(i) = work.pop() {
            self.try_issue(i, &mut work);
        }
    }

    fn try_issue(&mut self, i: usize, work: &mut Vec<usize>) {
        if !self.issuers[i].ready() || self.errs.errored() {
            return;
        }
        if self.issued_vertices.contains(&self.issuers[i].vertex.id()) {
            self.issuers[i].issued = true;
            return;
        }
        self.issuers[i].issued = true;

        let vertex = self.issuers[i].vertex.clone();
        let txs = self.issuers[i].txs.clone();
        let updated_epoch = self.issuers[i].updated_epoch;
        let vtx_id = vertex.id();
        self.pending.remove(&vtx_id);

        let mut valid_txs = Vec::with_capacity(txs.len());
        let mut valid_transitions = Vec::with_capacity(txs.len());
        let mut invalid_transitions = Vec::new();
        let mut unissued_transitions = Vec::new();
        for tx in &txs {
            let transition = tx.transition();
            if let Err(err) = tx.verify() {
                debug!(tx = %tx.id(), %err, "transaction failed verification");
                invalid_transitions.push(transition.id());
                continue;
            }
            if transition.status() != Status::Accepted
                && !self.graph.transition_processing(&transition.id())
            {
                unissued_transitions.push(transition.clone());
            }
            valid_txs.push(tx.clone());
            valid_transitions.push(transition);
        }

        // Some transactions were invalid: re-batch the valid remainder and
        // abandon this vertex. Under an epoch change the invalid transitions
        // are restricted into the current epoch so peers can't accept them
        // later.
        if valid_txs.len() != txs.len() {
            debug!(vertex = %vtx_id, "abandoning vertex: transaction verification failed");
            let restrictions = if updated_epoch {
                invalid_transitions
            } else {
                Vec::new()
            };
            if let Err(err) = self.batch(vertex.epoch(), valid_transitions, restrictions, false) {
                self.errs.add(err);
            }
            self.abandon(i);
            return;
        }

        let current_epoch = self.current_epoch;
        // First-time transitions prefer the node's current epoch.
        if vertex.epoch() != current_epoch && !unissued_transitions.is_empty() {
            debug!(
                from = vertex.epoch(),
                to = current_epoch,
                count = unissued_transitions.len(),
                "reissuing transitions into the current epoch"
            );
            if let Err(err) = self.batch(current_epoch, unissued_transitions, Vec::new(), true) {
                self.errs.add(err);
                return;
            }
        }
        if vertex.epoch() > current_epoch {
            debug!(vertex = %vtx_id, epoch = vertex.epoch(), "dropping vertex from a future epoch");
            self.abandon(i);
            return;
        }

        debug!(vertex = %vtx_id, txs = valid_txs.len(), "adding vertex to consensus");
        for tx in &valid_txs {
            if let Err(err) = self.graph.add(tx.clone()) {
                self.errs.add(err);
                return;
            }
        }
        self.issued_vertices.add(vtx_id);
        self.vertices.insert(vtx_id, vertex.clone());
        self.vertex_txs
            .insert(vtx_id, valid_txs.iter().map(|tx| tx.id()).collect());
        for parent in vertex.parent_ids() {
            self.frontier.remove(&parent);
        }
        self.frontier.add(vtx_id);

        self.poll_vertex(&vertex);

        // Wake everything that was waiting on this vertex or its transitions.
        if let Some(waiters) = self.vtx_waiters.remove(&vtx_id) {
            for w in waiters {
                self.issuers[w].fulfill_vtx(&vtx_id);
                work.push(w);
            }
        }
        for tx in &valid_txs {
            self.mark_transition_issued(tx.transition().id(), work);
        }

        self.repoll();
    }

    fn mark_transition_issued(&mut self, transition_id: Id, work: &mut Vec<usize>) {
        self.missing_transitions.retain(|_, missing| {
            missing.remove(&transition_id);
            !missing.is_empty()
        });
        if let Some(waiters) = self.tr_waiters.remove(&transition_id) {
            for w in waiters {
                self.issuers[w].fulfill_tr(&transition_id);
                work.push(w);
            }
        }
    }

    /// Abandons issuer `i` and, transitively, everything waiting on its
    /// vertex.
    fn abandon(&mut self, i: usize) {
        if self.issuers[i].abandoned {
            return;
        }
        self.issuers[i].abandoned = true;
        let vtx_id = self.issuers[i].vertex.id();
        self.pending.remove(&vtx_id);
        if let Some(waiters) = self.vtx_waiters.remove(&vtx_id) {
            for w in waiters {
                self.abandon(w);
            }
        }
    }

    /// Builds vertices over the current frontier and issues them.
    fn batch(
        &mut self,
        epoch: u32,
        transitions: Vec<TransitionRef>,
        restrictions: Vec<Id>,
        force: bool,
    ) -> Result<()> {
        let mut batchable = Vec::new();
        for transition in transitions {
            if !force
                && (transition.status() == Status::Accepted
                    || self.graph.transition_processing(&transition.id()))
            {
                continue;
            }
            batchable.push(transition);
        }
        if batchable.is_empty() && restrictions.is_empty() {
            return Ok(());
        }

        let parents: Vec<Id> = self.frontier.to_vec();
        if batchable.is_empty() {
            let vertex = self.builder.build(epoch, parents, Vec::new(), restrictions)?;
            return self.issue_internal(vertex, true);
        }
        for chunk in batchable.chunks(BATCH_SIZE) {
            let vertex =
                self.builder
                    .build(epoch, parents.clone(), chunk.to_vec(), restrictions.clone())?;
            self.issue_internal(vertex, true)?;
        }
        Ok(())
    }

    /// Samples K validators and push-queries them about `vertex`.
    fn poll_vertex(&mut self, vertex: &VertexRef) {
        let k = self.graph.parameters().k;
        match self.validators.sample(k) {
            Ok(sampled) => {
                self.request_id += 1;
                let polled = Bag::of(sampled.iter().copied());
                if self.polls.add(self.request_id, polled) {
                    self.sender.push_query(
                        &sampled,
                        self.request_id,
                        vertex.id(),
                        &vertex.bytes(),
                    );
                }
            }
            Err(err) => {
                warn!(vertex = %vertex.id(), %err, "query dropped: could not sample validators");
            }
        }
    }

    /// Keeps `concurrent_repolls` pull queries in flight over the frontier.
    fn repoll(&mut self) {
        if self.errs.errored() || self.graph.finalized() {
            return;
        }
        let k = self.graph.parameters().k;
        while self.polls.len() < self.graph.parameters().concurrent_repolls {
            let Some(vertex_id) = self.frontier.iter().next().copied() else {
                return;
            };
            let Ok(sampled) = self.validators.sample(k) else {
                return;
            };
            self.request_id += 1;
            let polled = Bag::of(sampled.iter().copied());
            if self.polls.add(self.request_id, polled) {
                self.sender.pull_query(&sampled, self.request_id, vertex_id);
            }
        }
    }
}
