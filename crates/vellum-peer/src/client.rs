//! The orderer seam.
//!
//! The peer never assumes how an ordering node is reached; everything it
//! needs is behind [`OrdererClient`]. The in-process adapter serves
//! single-binary deployments and tests; a networked client lives outside
//! this crate. Every call returns `Result` and callers check it before
//! touching the payload.

use crate::errors::PeerError;
use async_trait::async_trait;
use std::sync::Arc;
use vellum_orderer::Coordinator;
use vellum_types::Block;

#[async_trait]
pub trait OrdererClient: Send + Sync {
    /// Fetch one block, optionally parking on the orderer until it
    /// exists. Callers bound the wait.
    async fn fetch_block(
        &self,
        channel_id: &str,
        number: u64,
        blocking: bool,
    ) -> Result<Block, PeerError>;

    /// The orderer's current height for a channel.
    async fn channel_height(&self, channel_id: &str) -> Result<u64, PeerError>;
}

/// Adapter over a coordinator living in the same process.
pub struct InProcessClient {
    coordinator: Arc<Coordinator>,
}

impl InProcessClient {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl OrdererClient for InProcessClient {
    async fn fetch_block(
        &self,
        channel_id: &str,
        number: u64,
        blocking: bool,
    ) -> Result<Block, PeerError> {
        self.coordinator
            .fetch_block(channel_id, number, blocking)
            .await
            .map_err(|err| PeerError::Remote(err.to_string()))
    }

    async fn channel_height(&self, channel_id: &str) -> Result<u64, PeerError> {
        self.coordinator
            .channel_height(channel_id)
            .map_err(|err| PeerError::Remote(err.to_string()))
    }
}
