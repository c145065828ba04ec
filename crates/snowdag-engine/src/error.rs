//! Engine errors.

use thiserror::Error;

use crate::vertex::VertexError;
use snowdag_consensus::ConsensusError;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the transitive engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Vertex(#[from] VertexError),

    /// No validators to sample from.
    #[error("validator set is empty")]
    EmptyValidatorSet,

    /// A previous fatal error halted the engine.
    #[error("engine halted: {0}")]
    Halted(String),
}
