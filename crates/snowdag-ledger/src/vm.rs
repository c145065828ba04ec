//! The ledger VM.
//!
//! [`Ledger`] holds the verification and application rules over chain state;
//! [`Vm`] adds the mempool, the bootstrap gate, vertex materialization, and
//! the query surface the API serves. Everything mutating runs under the
//! chain lock owned by the caller.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use snowdag_codec::CodecManager;
use snowdag_consensus::choices::{Status, Transition, TransitionRef, TxRef};
use snowdag_db::Database;
use snowdag_engine::transitive::{DagVertex, Transitive, VertexBuilder, VertexRef};
use snowdag_engine::vertex::Vertex;
use snowdag_engine::{ChainContext, EngineError};
use snowdag_ids::{Id, ShortId};
use tracing::{debug, info};

use crate::fx::{AssetStatus, ManagedAssetRecord, OperationKind};
use crate::mempool::{Mempool, BATCH_SIZE, BATCH_TIMEOUT};
use crate::state::ChainState;
use crate::transition::{LedgerTransition, StoredTransition, TransitionData};
use crate::tx::LedgerTx;
use crate::utxo::{Credential, Utxo, UtxoId};
use crate::{LedgerError, Result};

/// Page size cap (and default) for UTXO queries.
pub const MAX_UTXOS_TO_FETCH: usize = 1024;

/// Cross-chain atomic UTXO access, owned by the node.
pub trait SharedMemory: Send + Sync {
    /// Returns serialized UTXOs indexed under `addrs` on `chain_id`,
    /// paginated by the `(start_addr, start_utxo)` cursor, plus the cursor
    /// of the last element scanned.
    fn indexed(
        &self,
        chain_id: Id,
        addrs: &[ShortId],
        start_addr: ShortId,
        start_utxo: Id,
        limit: usize,
    ) -> Result<(Vec<Vec<u8>>, ShortId, Id)>;
}

/// Static VM configuration, populated from the environment.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// The asset transaction fees are burned in.
    pub primary_asset: Id,
    pub tx_fee: u64,
    pub batch_size: usize,
    pub batch_timeout: std::time::Duration,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            primary_asset: Id::EMPTY,
            tx_fee: 0,
            batch_size: BATCH_SIZE,
            batch_timeout: BATCH_TIMEOUT,
        }
    }
}

/// The initial state of the chain.
#[derive(Debug, Clone, Default)]
pub struct Genesis {
    pub utxos: Vec<Utxo>,
    pub managed_assets: Vec<(Id, AssetStatus)>,
}

/// Verification and state-application rules.
pub struct Ledger {
    ctx: ChainContext,
    state: Arc<ChainState>,
    /// Transitions currently processing, by id. Dependency references
    /// resolve through here so their status stays live.
    transitions: RwLock<HashMap<Id, Arc<LedgerTransition>>>,
    primary_asset: Id,
    tx_fee: u64,
}

impl Ledger {
    pub fn new(ctx: ChainContext, state: Arc<ChainState>, config: &VmConfig) -> Self {
        Self {
            ctx,
            state,
            transitions: RwLock::new(HashMap::new()),
            primary_asset: config.primary_asset,
            tx_fee: config.tx_fee,
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<ChainState> {
        &self.state
    }

    /// Parses canonical transition bytes, persisting first-seen transitions
    /// as processing. Re-parsing returns the cached instance so decision
    /// state is shared.
    pub fn parse_transition(&self, bytes: &[u8]) -> Result<Arc<LedgerTransition>> {
        let id = Id::from_hash(bytes);
        if let Some(cached) = self.transitions.read().get(&id) {
            return Ok(cached.clone());
        }

        let (_, data): (u16, TransitionData) = self.state.unmarshal(bytes)?;

        let status = match self.state.status(&id)? {
            Status::Unknown => {
                self.state.put_tx_bytes(&id, bytes)?;
                self.state.set_status(&id, Status::Processing)?;
                self.state.commit()?;
                Status::Processing
            }
            stored => stored,
        };

        let dependencies = data
            .dependency_ids
            .iter()
            .map(|dep_id| self.resolve_dependency(*dep_id))
            .collect();
        let transition = Arc::new(LedgerTransition::new(data, dependencies, bytes.to_vec(), status));
        if status == Status::Processing {
            self.transitions.write().insert(id, transition.clone());
        }
        Ok(transition)
    }

    /// A new locally-created transition.
    pub fn create_transition(&self, data: TransitionData) -> Result<Arc<LedgerTransition>> {
        let bytes = self.state.marshal(&data);
        self.parse_transition(&bytes)
    }

    fn resolve_dependency(&self, id: Id) -> TransitionRef {
        if let Some(transition) = self.transitions.read().get(&id) {
            transition.clone()
        } else {
            Arc::new(StoredTransition::new(id, self.state.clone()))
        }
    }

    /// The canonical bytes of a known transition.
    pub fn transition_bytes(&self, id: &Id) -> Result<Vec<u8>> {
        if let Some(transition) = self.transitions.read().get(id) {
            return Ok(transition.bytes().to_vec());
        }
        self.state
            .tx_bytes(id)?
            .ok_or_else(|| LedgerError::InvalidTx(format!("unknown transition {id}")))
    }

    /// Wraps a transition as a transaction in `epoch`.
    pub fn make_tx(
        self: &Arc<Self>,
        transition: Arc<LedgerTransition>,
        epoch: u32,
        restrictions: Vec<Id>,
    ) -> Arc<LedgerTx> {
        transition.register_presentation();
        Arc::new(LedgerTx::new(
            self.clone(),
            transition,
            epoch,
            restrictions,
        ))
    }

    /// Resolves a consumed output for a transaction in `epoch`.
    ///
    /// An output whose producer was accepted in a later epoch is unusable;
    /// an output of a still-processing producer is read from its pending
    /// outputs; anything else must sit in the UTXO set.
    pub fn get_utxo(&self, utxo_id: &UtxoId, epoch: u32) -> Result<Utxo> {
        let parent_status = self.state.status(&utxo_id.tx_id)?;
        if parent_status == Status::Accepted {
            if let Some(parent_epoch) = self.state.epoch(&utxo_id.tx_id)? {
                if parent_epoch > epoch {
                    return Err(LedgerError::InvalidUtxoEpoch);
                }
            }
        }

        let input_id = utxo_id.input_id();
        if let Some(utxo) = self.state.utxo(&input_id)? {
            return Ok(utxo);
        }

        // Accepted but absent means already consumed; rejected or unknown
        // producers have nothing to consume.
        if parent_status != Status::Processing {
            return Err(LedgerError::UnknownUtxo(input_id));
        }

        let parent_bytes = self
            .state
            .tx_bytes(&utxo_id.tx_id)?
            .ok_or(LedgerError::UnknownUtxo(input_id))?;
        let (_, parent): (u16, TransitionData) = self.state.unmarshal(&parent_bytes)?;
        let output = parent
            .outputs
            .get(utxo_id.output_index as usize)
            .ok_or(LedgerError::InvalidOutputIndex {
                tx_id: utxo_id.tx_id,
                index: utxo_id.output_index,
            })?;
        Ok(Utxo {
            utxo_id: *utxo_id,
            asset_id: output.asset_id,
            amount: output.amount,
            payload: Vec::new(),
            owners: output.owners.clone(),
        })
    }

    /// Checks that `credential` may move `utxo` in `epoch`, honoring
    /// managed-asset status.
    fn verify_transfer(&self, utxo: &Utxo, credential: &Credential, epoch: u32) -> Result<()> {
        let time = self.ctx.time();
        match self.state.managed_asset(&utxo.asset_id)? {
            None => {
                if !utxo.owners.authorizes(credential, time) {
                    return Err(LedgerError::NoPermission);
                }
            }
            Some(record) => {
                let status = record.effective(epoch);
                if status.frozen {
                    return Err(LedgerError::AssetFrozen(utxo.asset_id));
                }
                // Either the owner or the asset manager may authorize.
                if !utxo.owners.authorizes(credential, time)
                    && !status.manager.authorizes(credential, time)
                {
                    return Err(LedgerError::NoPermission);
                }
            }
        }
        Ok(())
    }

    /// Full semantic verification of `transition` as presented in `epoch`.
    pub fn verify_transition(&self, transition: &LedgerTransition, epoch: u32) -> Result<()> {
        let data = transition.data();
        if data.inputs.is_empty() && data.operations.is_empty() {
            return Err(LedgerError::InvalidTx(
                "transition consumes nothing".to_string(),
            ));
        }

        let mut seen_inputs = HashSet::new();
        for id in transition.input_ids() {
            if !seen_inputs.insert(id) {
                return Err(LedgerError::InvalidTx(format!("duplicate input {id}")));
            }
        }

        let credential = transition.credential();
        let mut consumed: HashMap<Id, u64> = HashMap::new();
        let mut produced: HashMap<Id, u64> = HashMap::new();

        for input in transition.inputs() {
            let utxo = self.get_utxo(input, epoch)?;
            self.verify_transfer(&utxo, credential, epoch)?;
            *consumed.entry(utxo.asset_id).or_default() += utxo.amount;
        }
        for output in transition.outputs() {
            *produced.entry(output.asset_id).or_default() += output.amount;
        }

        let time = self.ctx.time();
        for op in transition.operations() {
            let utxos = op
                .consumed_utxos
                .iter()
                .map(|utxo_id| self.get_utxo(utxo_id, epoch))
                .collect::<Result<Vec<_>>>()?;
            op.verify(&utxos, credential, time)?;

            match &op.kind {
                OperationKind::Mint { amount, .. } => {
                    *consumed.entry(op.asset_id).or_default() += amount;
                }
                OperationKind::UpdateManagedAsset { .. } => {
                    let record = self
                        .state
                        .managed_asset(&op.asset_id)?
                        .ok_or(LedgerError::NotManaged(op.asset_id))?;
                    record.check_updatable(epoch)?;
                }
                OperationKind::MintNft { .. } | OperationKind::TransferNft { .. } => {}
            }
        }

        // Every produced unit must be backed; the fee is burned from the
        // primary asset.
        *produced.entry(self.primary_asset).or_default() += self.tx_fee;
        for (asset_id, amount) in &produced {
            if consumed.get(asset_id).copied().unwrap_or(0) < *amount {
                return Err(LedgerError::InsufficientFunds);
            }
        }
        Ok(())
    }

    /// Applies an accepted transition to state and commits atomically.
    pub fn apply_accept(&self, transition: &LedgerTransition, epoch: u32) -> Result<()> {
        let id = transition.id();
        debug!(transition = %id, epoch, "applying accepted transition");

        for input in transition.inputs() {
            self.state.spend_utxo(&input.input_id())?;
        }
        for op in transition.operations() {
            for utxo_id in &op.consumed_utxos {
                self.state.spend_utxo(&utxo_id.input_id())?;
            }
        }

        for (index, output) in transition.outputs().iter().enumerate() {
            self.state.fund_utxo(&Utxo {
                utxo_id: UtxoId::new(id, index as u32),
                asset_id: output.asset_id,
                amount: output.amount,
                payload: Vec::new(),
                owners: output.owners.clone(),
            })?;
        }

        let mut output_index = transition.outputs().len() as u32;
        for op in transition.operations() {
            match &op.kind {
                OperationKind::Mint { amount, to } => {
                    self.state.fund_utxo(&Utxo {
                        utxo_id: UtxoId::new(id, output_index),
                        asset_id: op.asset_id,
                        amount: *amount,
                        payload: Vec::new(),
                        owners: to.clone(),
                    })?;
                    output_index += 1;
                }
                OperationKind::MintNft { payload, to, .. }
                | OperationKind::TransferNft { payload, to, .. } => {
                    self.state.fund_utxo(&Utxo {
                        utxo_id: UtxoId::new(id, output_index),
                        asset_id: op.asset_id,
                        amount: 0,
                        payload: payload.clone(),
                        owners: to.clone(),
                    })?;
                    output_index += 1;
                }
                OperationKind::UpdateManagedAsset { status } => {
                    let record = self
                        .state
                        .managed_asset(&op.asset_id)?
                        .ok_or(LedgerError::NotManaged(op.asset_id))?;
                    self.state
                        .put_managed_asset(&op.asset_id, &record.updated(epoch, status.clone()))?;
                }
            }
        }

        self.state.set_status(&id, Status::Accepted)?;
        self.state.set_epoch(&id, epoch)?;
        self.state.commit()?;
        self.transitions.write().remove(&id);
        info!(transition = %id, epoch, "transition accepted");
        Ok(())
    }

    /// Applies a rejected presentation. Only the last one (`last`) marks the
    /// transition itself rejected.
    pub fn apply_reject(&self, transition: &LedgerTransition, last: bool) -> Result<()> {
        if !last {
            return Ok(());
        }
        let id = transition.id();
        if self.state.status(&id)? != Status::Accepted {
            self.state.set_status(&id, Status::Rejected)?;
            self.state.commit()?;
        }
        self.transitions.write().remove(&id);
        info!(transition = %id, "transition rejected");
        Ok(())
    }
}

/// A vertex with its transactions materialized against this chain.
pub struct LedgerVertex {
    inner: Vertex,
    txs: Vec<TxRef>,
}

impl LedgerVertex {
    #[must_use]
    pub fn vertex(&self) -> &Vertex {
        &self.inner
    }
}

impl DagVertex for LedgerVertex {
    fn id(&self) -> Id {
        self.inner.id()
    }

    fn epoch(&self) -> u32 {
        self.inner.epoch()
    }

    fn height(&self) -> u64 {
        self.inner.height()
    }

    fn parent_ids(&self) -> Vec<Id> {
        self.inner.parent_ids().to_vec()
    }

    fn txs(&self) -> snowdag_engine::Result<Vec<TxRef>> {
        Ok(self.txs.clone())
    }

    fn bytes(&self) -> Vec<u8> {
        self.inner.bytes().to_vec()
    }
}

/// The ledger VM: rules plus mempool, bootstrap gate, and queries.
pub struct Vm {
    ctx: ChainContext,
    ledger: Arc<Ledger>,
    mempool: Mutex<Mempool>,
    bootstrapped: AtomicBool,
    shared_memory: Option<Arc<dyn SharedMemory>>,
    /// Heights of vertices seen, for building over the frontier.
    vertex_heights: RwLock<HashMap<Id, u64>>,
}

impl Vm {
    /// Opens (or initializes) the chain over `db`.
    pub fn new(
        ctx: ChainContext,
        db: Arc<dyn Database>,
        genesis: &Genesis,
        config: VmConfig,
    ) -> Result<Self> {
        let codec = CodecManager::with_version(ctx.codec_version());
        let state = Arc::new(ChainState::new(db, codec));

        if !state.db_initialized()? {
            info!(chain = %ctx.chain_id, utxos = genesis.utxos.len(), "initializing chain state");
            for utxo in &genesis.utxos {
                state.fund_utxo(utxo)?;
            }
            for (asset_id, status) in &genesis.managed_assets {
                state.put_managed_asset(
                    asset_id,
                    &ManagedAssetRecord {
                        last_updated_epoch: 0,
                        current: status.clone(),
                        previous: status.clone(),
                    },
                )?;
            }
            state.set_db_initialized()?;
            state.commit()?;
        }

        let mempool = Mempool::new(config.batch_size, config.batch_timeout);
        let ledger = Arc::new(Ledger::new(ctx.clone(), state, &config));
        Ok(Self {
            ctx,
            ledger,
            mempool: Mutex::new(mempool),
            bootstrapped: AtomicBool::new(false),
            shared_memory: None,
            vertex_heights: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_shared_memory(mut self, shared_memory: Arc<dyn SharedMemory>) -> Self {
        self.shared_memory = Some(shared_memory);
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    /// Called by the engine once bootstrap completes.
    pub fn set_bootstrapped(&self) {
        self.bootstrapped.store(true, Ordering::Release);
    }

    /// Parses, verifies, and queues a transition for issuance. Refused while
    /// bootstrapping.
    pub fn issue_tx(&self, bytes: &[u8]) -> Result<Id> {
        if !self.is_bootstrapped() {
            return Err(LedgerError::Bootstrapping);
        }
        let transition = self.ledger.parse_transition(bytes)?;
        self.ledger
            .verify_transition(&transition, self.ctx.epoch())?;

        let id = transition.id();
        self.mempool
            .lock()
            .push(transition as TransitionRef, Instant::now());
        debug!(transition = %id, "queued transition");
        Ok(id)
    }

    /// When the mempool wants to be flushed.
    #[must_use]
    pub fn mempool_deadline(&self) -> Option<Instant> {
        self.mempool.lock().deadline()
    }

    /// True when the buffer is full or overdue.
    #[must_use]
    pub fn mempool_due(&self) -> bool {
        let mempool = self.mempool.lock();
        mempool.is_full() || mempool.is_due(Instant::now())
    }

    /// Drains the mempool into the engine. If the engine refuses the batch
    /// the transitions go back and the deadline re-arms.
    pub fn flush_pending(&self, engine: &mut Transitive) -> Result<()> {
        let batch = self.mempool.lock().take();
        if batch.is_empty() {
            return Ok(());
        }
        if let Err(err) = engine.issue_transitions(batch.clone()) {
            self.mempool.lock().defer(batch, Instant::now());
            return Err(LedgerError::Engine(err.to_string()));
        }
        Ok(())
    }

    /// Parses a vertex received from the network and materializes its
    /// transactions.
    pub fn parse_vertex(&self, bytes: &[u8]) -> Result<Arc<LedgerVertex>> {
        let inner =
            Vertex::parse(bytes).map_err(|err| LedgerError::InvalidTx(err.to_string()))?;
        if inner.chain_id() != self.ctx.chain_id {
            return Err(LedgerError::WrongChainId {
                expected: self.ctx.chain_id,
                actual: inner.chain_id(),
            });
        }
        self.materialize(inner)
    }

    fn materialize(&self, inner: Vertex) -> Result<Arc<LedgerVertex>> {
        let restrictions = inner.restrictions().to_vec();
        let epoch = inner.epoch();
        let txs = inner
            .transitions()
            .iter()
            .map(|blob| {
                let transition = self.ledger.parse_transition(blob)?;
                Ok(self.ledger.make_tx(transition, epoch, restrictions.clone()) as TxRef)
            })
            .collect::<Result<Vec<_>>>()?;

        self.vertex_heights
            .write()
            .insert(inner.id(), inner.height());
        Ok(Arc::new(LedgerVertex { inner, txs }))
    }

    /// UTXOs referencing any of `addrs`, paginated by the
    /// `(start_addr, start_utxo)` cursor. At most `limit` (capped at
    /// [`MAX_UTXOS_TO_FETCH`]) are returned, along with the cursor of the
    /// last UTXO scanned.
    pub fn get_utxos(
        &self,
        addrs: &[ShortId],
        start_addr: ShortId,
        start_utxo: Id,
        limit: usize,
    ) -> Result<(Vec<Utxo>, ShortId, Id)> {
        let limit = if limit == 0 || limit > MAX_UTXOS_TO_FETCH {
            MAX_UTXOS_TO_FETCH
        } else {
            limit
        };

        // A fixed address order makes the cursor meaningful across calls.
        let mut sorted_addrs = addrs.to_vec();
        sorted_addrs.sort_unstable();
        sorted_addrs.dedup();

        let state = self.ledger.state();
        let mut utxos = Vec::new();
        let mut seen: HashSet<Id> = HashSet::new();
        let mut last_addr = ShortId::EMPTY;
        let mut last_utxo = Id::EMPTY;

        for addr in sorted_addrs {
            if addr < start_addr {
                continue;
            }
            let start = if addr == start_addr {
                start_utxo
            } else {
                Id::EMPTY
            };

            for utxo_id in state.funds(&addr, &start, limit)? {
                // Cursor tracks the last id scanned, found or not.
                last_addr = addr;
                last_utxo = utxo_id;

                if !seen.insert(utxo_id) {
                    continue;
                }
                let utxo = state
                    .utxo(&utxo_id)?
                    .ok_or(LedgerError::UnknownUtxo(utxo_id))?;
                utxos.push(utxo);
                if utxos.len() >= limit {
                    return Ok((utxos, last_addr, last_utxo));
                }
            }
        }
        Ok((utxos, last_addr, last_utxo))
    }

    /// Imported UTXOs from another chain, through shared memory.
    pub fn get_atomic_utxos(
        &self,
        chain_id: Id,
        addrs: &[ShortId],
        start_addr: ShortId,
        start_utxo: Id,
        limit: usize,
    ) -> Result<(Vec<Utxo>, ShortId, Id)> {
        let shared = self
            .shared_memory
            .as_ref()
            .ok_or_else(|| LedgerError::InvalidTx("no shared memory configured".to_string()))?;
        let limit = if limit == 0 || limit > MAX_UTXOS_TO_FETCH {
            MAX_UTXOS_TO_FETCH
        } else {
            limit
        };
        let (blobs, last_addr, last_utxo) =
            shared.indexed(chain_id, addrs, start_addr, start_utxo, limit)?;

        let state = self.ledger.state();
        let mut utxos = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let (_, utxo): (u16, Utxo) = state.unmarshal(&blob)?;
            utxos.push(utxo);
        }
        Ok((utxos, last_addr, last_utxo))
    }

    /// Moves stored serialization to the fork version once the wall clock
    /// crosses the transition. Called alongside the engine's epoch advance.
    pub fn update_codec_version(&self) {
        self.ledger.state().set_codec_version(self.ctx.codec_version());
    }

    /// Commits outstanding writes and closes storage.
    pub fn shutdown(&self) -> Result<()> {
        self.ledger.state().commit()?;
        self.ledger.state().close()?;
        info!(chain = %self.ctx.chain_id, "vm shut down");
        Ok(())
    }
}

impl VertexBuilder for Vm {
    fn build(
        &self,
        epoch: u32,
        parent_ids: Vec<Id>,
        transitions: Vec<TransitionRef>,
        restrictions: Vec<Id>,
    ) -> snowdag_engine::Result<VertexRef> {
        let blobs = transitions
            .iter()
            .map(|transition| self.ledger.transition_bytes(&transition.id()))
            .collect::<Result<Vec<_>>>()
            .map_err(|err| EngineError::Consensus(err.into()))?;

        let height = {
            let heights = self.vertex_heights.read();
            1 + parent_ids
                .iter()
                .filter_map(|parent| heights.get(parent).copied())
                .max()
                .unwrap_or(0)
        };

        let inner = Vertex::build(
            self.ctx.chain_id,
            height,
            epoch,
            parent_ids,
            blobs,
            restrictions,
        )?;
        let vertex = self
            .materialize(inner)
            .map_err(|err| EngineError::Consensus(err.into()))?;
        Ok(vertex as VertexRef)
    }
}
