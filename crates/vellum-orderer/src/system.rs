//! System-channel application.
//!
//! Every committed `_config` block is replayed here to mutate the
//! coordinator's channel registry and, for conf-change transactions, the
//! live consensus membership — strictly *after* the block commits, so
//! membership changes are themselves linearized by consensus.

use crate::coordinator::{member_of, Coordinator};
use crate::errors::{CommitFailure, OrdererError};
use crate::manager::CommitSink;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{info, warn};
use vellum_consensus::MembershipChange;
use vellum_storage::keys;
use vellum_types::{
    codec, Block, ConfigPayload, GlobalPayload, NodeChange, SystemContract, Tx, ValidatorUpdate,
    CONFIG_CHANNEL_ID, GENESIS_PREV_HASH, GLOBAL_CHANNEL_ID,
};

#[async_trait]
impl CommitSink for Coordinator {
    async fn block_committed(&self, block: &Block) -> HashMap<String, CommitFailure> {
        if block.header.channel_id == CONFIG_CHANNEL_ID && !block.is_genesis() {
            return self.apply_config_block(block).await;
        }
        HashMap::new()
    }
}

impl Coordinator {
    /// Record the profiles and system-admin set carried by the `_config`
    /// genesis block. Idempotent; replayed on every bootstrap.
    pub(crate) fn apply_config_genesis(&self, block: &Block) -> Result<(), OrdererError> {
        for tx in &block.transactions {
            let payload: ConfigPayload = codec::from_bytes(&tx.data.payload)?;
            if payload.channel_id.is_empty() {
                // The admin record.
                let bytes = codec::to_bytes(&payload.profile.admins)?;
                self.db().put(&keys::system_admins(), &bytes)?;
            } else {
                let bytes = codec::to_bytes(&payload.profile)?;
                self.db()
                    .put(&keys::channel_profile(&payload.channel_id), &bytes)?;
            }
        }
        Ok(())
    }

    async fn apply_config_block(&self, block: &Block) -> HashMap<String, CommitFailure> {
        let mut failures = HashMap::new();
        for tx in &block.transactions {
            if let Err(failure) = self.apply_config_tx(tx).await {
                warn!(tx = %tx.id, ?failure, "config transaction failed to apply");
                failures.insert(tx.id.clone(), failure);
            }
        }
        failures
    }

    async fn apply_config_tx(&self, tx: &Tx) -> Result<(), CommitFailure> {
        match SystemContract::of(tx.data.recipient) {
            Some(SystemContract::CreateChannel) => self.apply_create_channel(tx).await,
            Some(SystemContract::ValidatorUpdate) => {
                let update: ValidatorUpdate = decode(&tx.data.payload)?;
                self.apply_membership(
                    &update.channel_id.clone(),
                    MembershipChange::SetValidator {
                        public_key: update.public_key,
                        voting_power: update.voting_power,
                    },
                )
                .await
            }
            Some(SystemContract::RaftAddNode) => {
                let change: NodeChange = decode(&tx.data.payload)?;
                self.apply_membership(
                    &change.channel_id.clone(),
                    MembershipChange::AddNode {
                        node_id: change.node_id,
                        address: change.address,
                    },
                )
                .await
            }
            Some(SystemContract::RaftRemoveNode) => {
                let change: NodeChange = decode(&tx.data.payload)?;
                self.apply_membership(
                    &change.channel_id,
                    MembershipChange::RemoveNode {
                        node_id: change.node_id,
                    },
                )
                .await
            }
            _ => Ok(()),
        }
    }

    /// Instantiate a channel from a committed create transaction: engine
    /// slot, genesis block containing the creator tx, manager, registry
    /// entry, and one `_global` height record.
    async fn apply_create_channel(&self, tx: &Tx) -> Result<(), CommitFailure> {
        let payload: ConfigPayload = decode(&tx.data.payload)?;
        let channel_id = payload.channel_id.clone();
        self.validate_new_channel(&payload).map_err(|err| match err {
            OrdererError::DuplicateChannel(id) => CommitFailure::DuplicateChannel(id),
            OrdererError::InvalidProfile(reason) => CommitFailure::InvalidProfile(reason),
            OrdererError::InvalidChannelName(name) => {
                CommitFailure::InvalidProfile(format!("{name} is not a legal channel name"))
            }
            other => CommitFailure::Failed(other.to_string()),
        })?;
        // The creator must administer what it creates.
        let creator = member_of(tx).map_err(|err| CommitFailure::Failed(err.to_string()))?;
        if !payload.profile.is_admin(&creator) {
            return Err(CommitFailure::InvalidProfile(
                "creator is not in the admin list".into(),
            ));
        }

        self.engine()
            .add_channel(&channel_id, self.cfg().user_channel())
            .await
            .map_err(|err| CommitFailure::Failed(err.to_string()))?;

        let manager = self
            .open_manager(&channel_id)
            .map_err(|err| CommitFailure::Failed(err.to_string()))?;
        let genesis = Block::new(&channel_id, 0, GENESIS_PREV_HASH, vec![tx.clone()]);
        let genesis_hash = genesis.hash();
        if !manager.has_genesis() {
            manager
                .commit_block(&genesis)
                .map_err(|err| CommitFailure::Failed(err.to_string()))?;
        }

        let profile_bytes = codec::to_bytes(&payload.profile)
            .map_err(|err| CommitFailure::Failed(err.to_string()))?;
        self.db()
            .put(&keys::channel_profile(&channel_id), &profile_bytes)
            .map_err(|err| CommitFailure::Failed(err.to_string()))?;

        self.insert_manager(Arc::clone(&manager));
        if self.is_started() {
            if let Some(coord) = self.sink() {
                let sink: Weak<dyn CommitSink> = Arc::downgrade(&coord);
                manager.start(sink);
            }
        }
        info!(channel = %channel_id, "created channel");

        // One _global record per channel-creation event.
        let record = GlobalPayload {
            channel_id: channel_id.clone(),
            number: 0,
            hash: genesis_hash,
        };
        match codec::to_bytes(&record)
            .map(|payload| Tx::unsigned(GLOBAL_CHANNEL_ID, payload, 0))
            .and_then(|gtx| codec::to_bytes(&gtx))
        {
            Ok(bytes) => {
                if let Err(err) = self.engine().add_tx(GLOBAL_CHANNEL_ID, bytes).await {
                    warn!(channel = %channel_id, %err, "failed to record creation on _global");
                }
            }
            Err(err) => {
                warn!(channel = %channel_id, %err, "failed to encode _global record");
            }
        }
        Ok(())
    }

    async fn apply_membership(
        &self,
        channel_id: &str,
        change: MembershipChange,
    ) -> Result<(), CommitFailure> {
        if !self.has_channel(channel_id) {
            return Err(CommitFailure::Failed(format!(
                "channel {channel_id} does not exist"
            )));
        }
        match self.engine().update_membership(channel_id, change).await {
            Ok(()) => Ok(()),
            Err(err) => Err(CommitFailure::Failed(err.to_string())),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CommitFailure> {
    codec::from_bytes(bytes).map_err(|err| CommitFailure::Failed(err.to_string()))
}
