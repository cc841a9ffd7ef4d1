//! Channel registry shared by the engine implementations.

use crate::config::ChannelConfig;
use crate::errors::ConsensusError;
use crate::sequencer::{CommitHook, Sequencer};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The map of channel id to sequencer, plus the engine's started flag.
/// Channels registered before `start_all` wait; channels added afterwards
/// begin ordering immediately.
pub(crate) struct ChannelSet {
    channels: RwLock<HashMap<String, Arc<Sequencer>>>,
    started: AtomicBool,
}

impl ChannelSet {
    pub(crate) fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn insert(
        &self,
        channel_id: &str,
        cfg: ChannelConfig,
        commit_hook: Option<CommitHook>,
    ) -> Result<Arc<Sequencer>, ConsensusError> {
        let mut channels = self.channels.write();
        if channels.contains_key(channel_id) {
            return Err(ConsensusError::ChannelExists(channel_id.to_string()));
        }
        let seq = Sequencer::new(channel_id, cfg, commit_hook);
        channels.insert(channel_id.to_string(), Arc::clone(&seq));
        drop(channels);

        if self.started.load(Ordering::SeqCst) {
            seq.start();
        }
        Ok(seq)
    }

    pub(crate) fn get(&self, channel_id: &str) -> Result<Arc<Sequencer>, ConsensusError> {
        self.channels
            .read()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| ConsensusError::UnknownChannel(channel_id.to_string()))
    }

    pub(crate) fn start_all(&self) {
        self.started.store(true, Ordering::SeqCst);
        for seq in self.channels.read().values() {
            seq.start();
        }
    }

    pub(crate) fn stop_all(&self) {
        self.started.store(false, Ordering::SeqCst);
        for seq in self.channels.read().values() {
            seq.stop();
        }
    }
}
