//! Per-channel ordering configuration and membership changes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Batching parameters of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// A block is cut as soon as this many transactions are pending.
    pub batch_size: usize,
    /// A smaller block is cut this long after the first pending
    /// transaction opened the batch. An empty pool never cuts.
    pub batch_timeout: Duration,
    /// First block number the engine will emit; raised by log replay.
    pub start_number: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_millis(1000),
            start_number: 0,
        }
    }
}

impl ChannelConfig {
    /// The tighter batching used for the system channels, which carry few
    /// but latency-sensitive transactions.
    pub fn system() -> Self {
        Self {
            batch_timeout: Duration::from_millis(100),
            ..Self::default()
        }
    }
}

/// A committed change to a channel's consensus membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipChange {
    /// Add a Raft voter.
    AddNode { node_id: u64, address: String },
    /// Remove a Raft voter.
    RemoveNode { node_id: u64 },
    /// Set a BFT validator's voting power; zero removes it.
    SetValidator { public_key: Vec<u8>, voting_power: u64 },
}
