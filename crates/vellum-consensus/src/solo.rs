//! Single-node ordering: the sequencing core with no replication.

use crate::block::ConsensusBlock;
use crate::config::{ChannelConfig, MembershipChange};
use crate::errors::ConsensusError;
use crate::registry::ChannelSet;
use crate::ConsensusEngine;
use async_trait::async_trait;

/// Deterministic local ordering for development and single-node
/// deployments.
pub struct SoloEngine {
    channels: ChannelSet,
}

impl SoloEngine {
    pub fn new() -> Self {
        Self {
            channels: ChannelSet::new(),
        }
    }
}

impl Default for SoloEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsensusEngine for SoloEngine {
    async fn start(&self) -> Result<(), ConsensusError> {
        self.channels.start_all();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConsensusError> {
        self.channels.stop_all();
        Ok(())
    }

    async fn add_channel(&self, channel_id: &str, cfg: ChannelConfig) -> Result<(), ConsensusError> {
        self.channels.insert(channel_id, cfg, None)?;
        Ok(())
    }

    async fn add_tx(&self, channel_id: &str, tx: Vec<u8>) -> Result<(), ConsensusError> {
        self.channels.get(channel_id)?.add_tx(tx).await?;
        Ok(())
    }

    async fn get_block(
        &self,
        channel_id: &str,
        number: u64,
        blocking: bool,
    ) -> Result<ConsensusBlock, ConsensusError> {
        self.channels.get(channel_id)?.get_block(number, blocking).await
    }

    async fn update_membership(
        &self,
        _channel_id: &str,
        _change: MembershipChange,
    ) -> Result<(), ConsensusError> {
        Err(ConsensusError::MembershipUnsupported("solo"))
    }
}
