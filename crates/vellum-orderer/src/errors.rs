//! Orderer error taxonomy.
//!
//! Rejection errors are returned before a transaction enters any batch;
//! ordering errors surface only after the engine exhausted its own retry
//! policy; storage errors are fatal for the affected channel.

use thiserror::Error;
use vellum_consensus::ConsensusError;
use vellum_storage::StorageError;
use vellum_types::CodecError;

#[derive(Debug, Error)]
pub enum OrdererError {
    #[error("transaction signature is invalid")]
    InvalidSignature,

    #[error("channel {0} does not exist")]
    UnknownChannel(String),

    #[error("channel {0} already exists")]
    DuplicateChannel(String),

    #[error("{0} is not a legal channel name")]
    InvalidChannelName(String),

    #[error("invalid channel profile: {0}")]
    InvalidProfile(String),

    #[error("signer is not authorized on channel {0}")]
    NotAuthorized(String),

    #[error("signer is not a system admin")]
    NotSystemAdmin,

    #[error("transaction is already on the chain")]
    DuplicateTx,

    #[error("transaction was not the expected kind of payload: {0}")]
    MalformedPayload(String),

    #[error("block {number} of channel {channel} does not exist")]
    NotFound { channel: String, number: u64 },

    #[error("ordering timed out for channel {0}")]
    Timeout(String),

    #[error("coordinator is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Why a committed transaction failed during system-channel application.
///
/// Carried through the commit hub to the caller that is still waiting on
/// the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitFailure {
    DuplicateChannel(String),
    InvalidProfile(String),
    Failed(String),
}

impl From<CommitFailure> for OrdererError {
    fn from(failure: CommitFailure) -> Self {
        match failure {
            CommitFailure::DuplicateChannel(id) => OrdererError::DuplicateChannel(id),
            CommitFailure::InvalidProfile(reason) => OrdererError::InvalidProfile(reason),
            CommitFailure::Failed(reason) => OrdererError::MalformedPayload(reason),
        }
    }
}
