//! Vote-based ordering with a weighted validator set.
//!
//! The voting rounds are a sealed box; this engine implements the
//! envelope: a `{public key -> voting power}` set with `2f+1` quorum
//! arithmetic, mutated only through `update_membership` after the
//! carrying block commits, and staged so a change becomes effective at
//! the height *after* that commit — never mid-round.

use crate::block::ConsensusBlock;
use crate::config::{ChannelConfig, MembershipChange};
use crate::errors::ConsensusError;
use crate::registry::ChannelSet;
use crate::sequencer::CommitHook;
use crate::ConsensusEngine;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use vellum_types::codec;

/// Voting power required to commit given the set's total power.
pub fn quorum_power(total_power: u64) -> u64 {
    2 * total_power / 3 + 1
}

struct ValidatorSet {
    /// Effective set, keyed by public key bytes.
    validators: Mutex<HashMap<Vec<u8>, u64>>,
    /// Changes committed but not yet effective; applied at the next cut.
    staged: Mutex<Vec<(Vec<u8>, u64)>>,
    path: PathBuf,
}

impl ValidatorSet {
    fn apply_staged(&self) -> Result<(), ConsensusError> {
        let staged: Vec<_> = self.staged.lock().drain(..).collect();
        if staged.is_empty() {
            return Ok(());
        }
        let mut validators = self.validators.lock();
        for (public_key, voting_power) in staged {
            if voting_power == 0 {
                validators.remove(&public_key);
            } else {
                validators.insert(public_key, voting_power);
            }
        }
        let bytes = codec::to_bytes(&*validators)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn total_power(&self) -> u64 {
        self.validators.lock().values().sum()
    }
}

/// BFT-backed engine: sequencing core + weighted validator set.
pub struct BftEngine {
    dir: PathBuf,
    initial_validators: HashMap<Vec<u8>, u64>,
    channels: ChannelSet,
    sets: RwLock<HashMap<String, Arc<ValidatorSet>>>,
}

impl BftEngine {
    pub fn new(
        dir: impl AsRef<Path>,
        initial_validators: HashMap<Vec<u8>, u64>,
    ) -> Result<Self, ConsensusError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            initial_validators,
            channels: ChannelSet::new(),
            sets: RwLock::new(HashMap::new()),
        })
    }

    /// Effective validator set of a channel.
    pub fn validators(&self, channel_id: &str) -> Result<HashMap<Vec<u8>, u64>, ConsensusError> {
        Ok(self.set(channel_id)?.validators.lock().clone())
    }

    /// Voting power a commit on this channel currently requires.
    pub fn quorum(&self, channel_id: &str) -> Result<u64, ConsensusError> {
        Ok(quorum_power(self.set(channel_id)?.total_power()))
    }

    fn set(&self, channel_id: &str) -> Result<Arc<ValidatorSet>, ConsensusError> {
        self.sets
            .read()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| ConsensusError::UnknownChannel(channel_id.to_string()))
    }

    fn commit_hook(&self, set: Arc<ValidatorSet>) -> CommitHook {
        Box::new(move |_block: &ConsensusBlock| set.apply_staged())
    }
}

#[async_trait]
impl ConsensusEngine for BftEngine {
    async fn start(&self) -> Result<(), ConsensusError> {
        self.channels.start_all();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConsensusError> {
        self.channels.stop_all();
        Ok(())
    }

    async fn add_channel(&self, channel_id: &str, cfg: ChannelConfig) -> Result<(), ConsensusError> {
        let path = self.dir.join(format!("{channel_id}.validators"));
        let validators = if path.exists() {
            codec::from_bytes(&fs::read(&path)?)?
        } else {
            self.initial_validators.clone()
        };
        let set = Arc::new(ValidatorSet {
            validators: Mutex::new(validators),
            staged: Mutex::new(Vec::new()),
            path,
        });
        self.channels
            .insert(channel_id, cfg, Some(self.commit_hook(Arc::clone(&set))))?;
        self.sets.write().insert(channel_id.to_string(), set);
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
        channel_id: &str,
        change: MembershipChange,
    ) -> Result<(), ConsensusError> {
        let set = self.set(channel_id)?;
        match change {
            MembershipChange::SetValidator {
                public_key,
                voting_power,
            } => {
                info!(
                    channel = %channel_id,
                    voting_power,
                    "staged validator update, effective next height"
                );
                set.staged.lock().push((public_key, voting_power));
                Ok(())
            }
            MembershipChange::AddNode { .. } | MembershipChange::RemoveNode { .. } => {
                Err(ConsensusError::MembershipUnsupported("bft"))
            }
        }
    }
}
