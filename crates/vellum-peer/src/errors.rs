//! Peer error taxonomy.
//!
//! Execution errors are not here: a failed contract call is recorded in
//! the transaction's status, never surfaced as a pipeline error.

use thiserror::Error;
use vellum_quorum::QuorumError;
use vellum_storage::StorageError;
use vellum_types::CodecError;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("channel {0} is not replicated on this peer")]
    UnknownChannel(String),

    #[error("transaction {tx_id} has no status on channel {channel}")]
    StatusNotFound { channel: String, tx_id: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("block failed verification: {0}")]
    BadBlock(String),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("peer is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Quorum(#[from] QuorumError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
