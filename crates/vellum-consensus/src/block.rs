//! The block shape engines agree on.

use serde::{Deserialize, Serialize};

/// An ordered batch as produced by a consensus backend.
///
/// Transactions are opaque bytes at this layer; the coordinator decodes
/// them when it assembles the chain block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusBlock {
    pub channel_id: String,
    /// Engine-local sequence number, contiguous from the configured start.
    pub number: u64,
    pub txs: Vec<Vec<u8>>,
}

impl ConsensusBlock {
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}
