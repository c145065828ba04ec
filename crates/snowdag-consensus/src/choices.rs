//! Decision states and the collaborator traits the core decides over.

use std::sync::Arc;

use snowdag_ids::Id;

use crate::Result;

/// Shared handle to a transition.
pub type TransitionRef = Arc<dyn Transition>;

/// Shared handle to a transaction.
pub type TxRef = Arc<dyn Tx>;

/// Decision state of a transaction or transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Never seen, or not yet parsed.
    Unknown,
    /// Issued to consensus, not yet decided.
    Processing,
    Accepted,
    Rejected,
}

impl Status {
    /// True once a final decision has been made.
    #[must_use]
    pub fn decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// True if the item is locally known (anything but [`Status::Unknown`]).
    #[must_use]
    pub fn fetched(&self) -> bool {
        !matches!(self, Status::Unknown)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Unknown => "Unknown",
            Status::Processing => "Processing",
            Status::Accepted => "Accepted",
            Status::Rejected => "Rejected",
        };
        write!(f, "{s}")
    }
}

/// Something consensus can decide on.
///
/// `accept` and `reject` are collaborator callbacks; they run under the chain
/// lock and must not call back into the engine. An error from either is fatal
/// to the current poll.
pub trait Decidable: Send + Sync {
    fn id(&self) -> Id;

    fn status(&self) -> Status;

    fn accept(&self) -> Result<()>;

    fn reject(&self) -> Result<()>;
}

/// The semantic effect of a transaction.
///
/// A transition is independent of the epoch it is presented in; two
/// transactions sharing a transition id re-present the same effect in
/// different epochs. A transition is accepted at most once across all epochs
/// and rejected only when no surviving transaction presents it.
pub trait Transition: Send + Sync {
    fn id(&self) -> Id;

    /// The UTXO identifiers this transition consumes.
    fn input_ids(&self) -> Vec<Id>;

    /// Transitions that must be accepted in the same or an earlier epoch.
    fn dependencies(&self) -> Vec<TransitionRef>;

    fn status(&self) -> Status;

    /// Marks the transition accepted in `epoch`.
    fn accept(&self, epoch: u32) -> Result<()>;

    /// Marks the transition rejected; `epoch` is the epoch of the last
    /// surviving presentation.
    fn reject(&self, epoch: u32) -> Result<()>;
}

/// A concrete presentation of a transition in one epoch.
pub trait Tx: Decidable {
    fn transition(&self) -> TransitionRef;

    fn epoch(&self) -> u32;

    /// Transition ids that, if ever accepted, must be accepted in an epoch
    /// less than or equal to this transaction's epoch.
    fn restrictions(&self) -> Vec<Id>;

    /// Semantic validity against current chain state.
    fn verify(&self) -> Result<()>;

    /// The canonical serialized form.
    fn bytes(&self) -> Vec<u8>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_predicates() {
        assert!(!Status::Processing.decided());
        assert!(Status::Accepted.decided());
        assert!(Status::Rejected.decided());
        assert!(!Status::Unknown.fetched());
        assert!(Status::Processing.fetched());
    }
}
