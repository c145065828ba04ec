//! Ledger errors.

use snowdag_codec::UnpackError;
use snowdag_consensus::ConsensusError;
use snowdag_db::DatabaseError;
use snowdag_ids::Id;
use thiserror::Error;

/// Result alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the ledger VM.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The chain is not ready to serve requests yet.
    #[error("chain is currently bootstrapping")]
    Bootstrapping,

    #[error("wrong chain id: expected {expected}, got {actual}")]
    WrongChainId { expected: Id, actual: Id },

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("the given credential does not authorize spending this utxo")]
    NoPermission,

    #[error("utxo can't be used in the named epoch")]
    InvalidUtxoEpoch,

    #[error("utxo {0} is unknown or already consumed")]
    UnknownUtxo(Id),

    #[error("output {index} of transaction {tx_id} does not exist")]
    InvalidOutputIndex { tx_id: Id, index: u32 },

    #[error("asset {0} is frozen")]
    AssetFrozen(Id),

    #[error("asset {0} is not managed")]
    NotManaged(Id),

    #[error(
        "asset update epoch ({epoch}) must be >= 2 + most recent status update epoch ({last_updated})"
    )]
    StatusChangeTooSoon { epoch: u32, last_updated: u32 },

    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("engine error: {0}")]
    Engine(String),

    /// Fatal: storage failed underneath the chain.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Fatal: stored bytes failed to decode.
    #[error("codec failure: {0}")]
    Codec(#[from] UnpackError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl From<LedgerError> for ConsensusError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Consensus(err) => err,
            other => ConsensusError::op(other),
        }
    }
}
