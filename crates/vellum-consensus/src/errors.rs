//! Consensus error taxonomy.

use thiserror::Error;
use vellum_types::CodecError;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("consensus for channel {0} already exists")]
    ChannelExists(String),

    #[error("consensus for channel {0} does not exist")]
    UnknownChannel(String),

    #[error("transaction is already in the pool")]
    DuplicateTx,

    #[error("block {number} of channel {channel} is not ready")]
    BlockNotReady { channel: String, number: u64 },

    #[error("engine is stopped")]
    Stopped,

    #[error("proposal for channel {0} timed out")]
    ProposalTimeout(String),

    #[error("a membership change is already in flight for channel {0}")]
    ConfChangeInProgress(String),

    #[error("node {0} is already a voter")]
    NodeExists(u64),

    #[error("node {0} is not a voter")]
    UnknownNode(u64),

    #[error("removing node {0} would leave the channel without voters")]
    LastVoter(u64),

    #[error("the {0} engine does not carry a membership set")]
    MembershipUnsupported(&'static str),

    #[error("write-ahead log error: {0}")]
    Wal(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
