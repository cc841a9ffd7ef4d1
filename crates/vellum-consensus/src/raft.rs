//! Leader-based replicated ordering.
//!
//! The agreement protocol is a sealed box; this engine implements the
//! envelope around it: committed entries are appended to a per-channel
//! write-ahead log before they become visible, so a node that lost its
//! state directory catches up by replaying the log, and the voter set is
//! mutated only through `update_membership`, one change at a time, after
//! the block carrying the change has committed.

use crate::block::ConsensusBlock;
use crate::config::{ChannelConfig, MembershipChange};
use crate::errors::ConsensusError;
use crate::registry::ChannelSet;
use crate::sequencer::CommitHook;
use crate::ConsensusEngine;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use vellum_types::codec;

/// Per-channel voter bookkeeping.
struct RaftCluster {
    voters: Mutex<HashMap<u64, String>>,
    /// Guards the one-pending-change-at-a-time protocol.
    changing: Mutex<()>,
    voters_path: PathBuf,
}

impl RaftCluster {
    fn persist(&self, voters: &HashMap<u64, String>) -> Result<(), ConsensusError> {
        let bytes = codec::to_bytes(voters)?;
        fs::write(&self.voters_path, bytes)?;
        Ok(())
    }
}

/// Raft-backed engine: sequencing core + WAL + voter set.
pub struct RaftEngine {
    node_id: u64,
    dir: PathBuf,
    initial_voters: HashMap<u64, String>,
    channels: ChannelSet,
    clusters: RwLock<HashMap<String, Arc<RaftCluster>>>,
}

impl RaftEngine {
    /// `dir` holds one `<channel>.wal` and `<channel>.voters` pair per
    /// channel; `initial_voters` seeds channels that have no persisted set.
    pub fn new(
        node_id: u64,
        dir: impl AsRef<Path>,
        initial_voters: HashMap<u64, String>,
    ) -> Result<Self, ConsensusError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            node_id,
            dir,
            initial_voters,
            channels: ChannelSet::new(),
            clusters: RwLock::new(HashMap::new()),
        })
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Current voter set of a channel.
    pub fn voters(&self, channel_id: &str) -> Result<HashMap<u64, String>, ConsensusError> {
        let clusters = self.clusters.read();
        let cluster = clusters
            .get(channel_id)
            .ok_or_else(|| ConsensusError::UnknownChannel(channel_id.to_string()))?;
        let voters = cluster.voters.lock().clone();
        Ok(voters)
    }

    fn wal_path(&self, channel_id: &str) -> PathBuf {
        self.dir.join(format!("{channel_id}.wal"))
    }

    fn commit_hook(&self, channel_id: &str) -> CommitHook {
        let path = self.wal_path(channel_id);
        Box::new(move |block| append_wal(&path, block))
    }
}

/// Append one committed entry: `[len: u32 BE][canonical block]`, fsynced.
fn append_wal(path: &Path, block: &ConsensusBlock) -> Result<(), ConsensusError> {
    let bytes = codec::to_bytes(block)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&(bytes.len() as u32).to_be_bytes())?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Replay every complete frame; a torn tail frame is discarded.
fn replay_wal(path: &Path) -> Result<Vec<ConsensusBlock>, ConsensusError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    while cursor + 4 <= bytes.len() {
        let len = u32::from_be_bytes(
            bytes[cursor..cursor + 4]
                .try_into()
                .map_err(|_| ConsensusError::Wal("unreadable frame length".into()))?,
        ) as usize;
        cursor += 4;
        if cursor + len > bytes.len() {
            break;
        }
        blocks.push(codec::from_bytes(&bytes[cursor..cursor + len])?);
        cursor += len;
    }
    Ok(blocks)
}

#[async_trait]
impl ConsensusEngine for RaftEngine {
    async fn start(&self) -> Result<(), ConsensusError> {
        self.channels.start_all();
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConsensusError> {
        self.channels.stop_all();
        Ok(())
    }

    async fn add_channel(&self, channel_id: &str, cfg: ChannelConfig) -> Result<(), ConsensusError> {
        let replayed = replay_wal(&self.wal_path(channel_id))?;
        let seq = self
            .channels
            .insert(channel_id, cfg, Some(self.commit_hook(channel_id)))?;
        if !replayed.is_empty() {
            info!(
                channel = %channel_id,
                entries = replayed.len(),
                "caught up from write-ahead log"
            );
            seq.preload(replayed);
        }

        let voters_path = self.dir.join(format!("{channel_id}.voters"));
        let voters = if voters_path.exists() {
            codec::from_bytes(&fs::read(&voters_path)?)?
        } else {
            self.initial_voters.clone()
        };
        self.clusters.write().insert(
            channel_id.to_string(),
            Arc::new(RaftCluster {
                voters: Mutex::new(voters),
                changing: Mutex::new(()),
                voters_path,
            }),
        );
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
        let cluster = {
            let clusters = self.clusters.read();
            clusters
                .get(channel_id)
                .cloned()
                .ok_or_else(|| ConsensusError::UnknownChannel(channel_id.to_string()))?
        };
        let _pending = cluster
            .changing
            .try_lock()
            .ok_or_else(|| ConsensusError::ConfChangeInProgress(channel_id.to_string()))?;

        let mut voters = cluster.voters.lock();
        match change {
            MembershipChange::AddNode { node_id, address } => {
                if voters.contains_key(&node_id) {
                    return Err(ConsensusError::NodeExists(node_id));
                }
                voters.insert(node_id, address.clone());
                info!(channel = %channel_id, node_id, %address, "added raft voter");
            }
            MembershipChange::RemoveNode { node_id } => {
                if !voters.contains_key(&node_id) {
                    return Err(ConsensusError::UnknownNode(node_id));
                }
                if voters.len() == 1 {
                    return Err(ConsensusError::LastVoter(node_id));
                }
                voters.remove(&node_id);
                info!(channel = %channel_id, node_id, "removed raft voter");
            }
            MembershipChange::SetValidator { .. } => {
                return Err(ConsensusError::MembershipUnsupported("raft"));
            }
        }
        cluster.persist(&voters)
    }
}
