//! Consensus errors.

use snowdag_ids::Id;
use thiserror::Error;

/// Result alias for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors surfaced by the consensus core.
///
/// Apart from [`ConsensusError::Op`], these are programming errors: the
/// caller aborts the current operation and does not retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("transaction {0} is already processing")]
    DuplicateTx(Id),

    #[error("transaction {0} is not processing")]
    UnknownTx(Id),

    #[error("metric {0} already registered")]
    DuplicateMetric(String),

    /// A collaborator callback (accept, reject, verify) failed. Fatal to the
    /// engine that observes it.
    #[error("{0}")]
    Op(String),
}

impl ConsensusError {
    /// Wraps a collaborator failure.
    pub fn op<E: std::fmt::Display>(err: E) -> Self {
        Self::Op(err.to_string())
    }
}
