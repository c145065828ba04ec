//! Pending-vertex issuance state.
//!
//! Issuers live in an arena owned by the transitive engine; waiter maps from
//! vertex and transition ids to arena indices replace the callback cycles of
//! a pointer-based design. The engine drives [`Issuer::ready`] transitions
//! through [`crate::transitive::Transitive`].

use snowdag_consensus::TxRef;
use snowdag_ids::Id;
use snowdag_utils::Set;

use crate::transitive::VertexRef;

/// A vertex waiting to be issued into consensus.
pub(crate) struct Issuer {
    pub(crate) vertex: VertexRef,
    pub(crate) txs: Vec<TxRef>,

    /// Transactions failing verification are restricted into the current
    /// epoch when set; otherwise they are dropped silently.
    pub(crate) updated_epoch: bool,

    pub(crate) issued: bool,
    pub(crate) abandoned: bool,

    /// Parent vertices not yet issued.
    pub(crate) vtx_deps: Set<Id>,

    /// Dependency transitions not yet issued or accepted.
    pub(crate) unfulfilled_trs: Set<Id>,
}

impl Issuer {
    pub(crate) fn new(
        vertex: VertexRef,
        txs: Vec<TxRef>,
        updated_epoch: bool,
        vtx_deps: Set<Id>,
        unfulfilled_trs: Set<Id>,
    ) -> Self {
        Self {
            vertex,
            txs,
            updated_epoch,
            issued: false,
            abandoned: false,
            vtx_deps,
            unfulfilled_trs,
        }
    }

    /// All dependencies met and not already resolved.
    pub(crate) fn ready(&self) -> bool {
        !self.abandoned
            && !self.issued
            && self.vtx_deps.is_empty()
            && self.unfulfilled_trs.is_empty()
    }

    pub(crate) fn fulfill_vtx(&mut self, id: &Id) {
        self.vtx_deps.remove(id);
    }

    pub(crate) fn fulfill_tr(&mut self, id: &Id) {
        self.unfulfilled_trs.remove(id);
    }
}
