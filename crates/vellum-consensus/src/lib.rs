//! # Consensus Engines
//!
//! One envelope, three interchangeable backends:
//!
//! - [`SoloEngine`]: deterministic local ordering for development and
//!   single-node deployments.
//! - [`RaftEngine`]: leader-based replicated ordering; committed entries
//!   are persisted to a write-ahead log so a wiped follower catches up by
//!   replay, and the voter set changes through one conf-change at a time.
//! - [`BftEngine`]: vote-based ordering with a `2f+1`-of-`3f+1` validator
//!   set; set changes take effect at the height after the block that
//!   carried them.
//!
//! Engines order opaque transaction bytes into [`ConsensusBlock`]s; the
//! coordinator above decodes, deduplicates and chains them. The agreement
//! rounds inside Raft/BFT are a sealed box behind this envelope.

pub mod block;
pub mod config;
pub mod errors;

mod bft;
mod raft;
mod registry;
mod sequencer;
mod solo;

pub use bft::BftEngine;
pub use block::ConsensusBlock;
pub use config::{ChannelConfig, MembershipChange};
pub use errors::ConsensusError;
pub use raft::RaftEngine;
pub use solo::SoloEngine;

use async_trait::async_trait;

/// The ordering contract every backend must honor.
///
/// `add_tx` returns once the transaction has been sequenced into a block;
/// `get_block` hands ordered blocks out strictly by number. Membership
/// changes arrive only through `update_membership`, and only after the
/// block that carried the change committed.
#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    /// Start ordering for every registered channel.
    async fn start(&self) -> Result<(), ConsensusError>;

    /// Stop all channel workers.
    async fn stop(&self) -> Result<(), ConsensusError>;

    /// Register a channel; started engines begin ordering it immediately.
    async fn add_channel(&self, channel_id: &str, cfg: ChannelConfig) -> Result<(), ConsensusError>;

    /// Submit transaction bytes, resolving once they are inside a block.
    async fn add_tx(&self, channel_id: &str, tx: Vec<u8>) -> Result<(), ConsensusError>;

    /// Fetch an ordered block, optionally blocking until it exists.
    async fn get_block(
        &self,
        channel_id: &str,
        number: u64,
        blocking: bool,
    ) -> Result<ConsensusBlock, ConsensusError>;

    /// Apply a committed membership change to a channel's node set.
    async fn update_membership(
        &self,
        channel_id: &str,
        change: MembershipChange,
    ) -> Result<(), ConsensusError>;
}
