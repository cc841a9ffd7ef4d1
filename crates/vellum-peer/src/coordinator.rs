//! The peer facade.
//!
//! Owns the per-channel sync workers, the executed-state store and the
//! query surface. Channels appear through discovery (`_global` records
//! and `_config` profiles) and are never removed while the process runs.

use crate::client::OrdererClient;
use crate::config::PeerConfig;
use crate::errors::PeerError;
use crate::executor::Executor;
use crate::manager::{ChannelState, SyncWorker};
use crate::vm::ContractVm;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::time::timeout;
use tracing::info;
use vellum_storage::{keys, KeyValueStore};
use vellum_types::{
    codec, event::Hub, is_system_channel, Address, Block, ChannelProfile, Member, TxStatus,
    CONFIG_CHANNEL_ID, GLOBAL_CHANNEL_ID,
};

pub struct Peer {
    cfg: PeerConfig,
    identity: Member,
    db: Arc<dyn KeyValueStore>,
    executor: Executor,
    clients: Vec<Arc<dyn OrdererClient>>,
    /// channel id -> worker; grows through discovery, never shrinks.
    workers: RwLock<HashMap<String, Arc<SyncWorker>>>,
    /// "channel:tx id" -> executed status, for ready-waits.
    statuses: Hub<TxStatus>,
    started: AtomicBool,
    weak: Weak<Peer>,
}

impl Peer {
    pub fn new(
        cfg: PeerConfig,
        identity: Member,
        db: Arc<dyn KeyValueStore>,
        vm: Arc<dyn ContractVm>,
        clients: Vec<Arc<dyn OrdererClient>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            cfg,
            identity,
            executor: Executor::new(Arc::clone(&db), vm),
            db,
            clients,
            workers: RwLock::new(HashMap::new()),
            statuses: Hub::new(),
            started: AtomicBool::new(false),
            weak: weak.clone(),
        })
    }

    /// Begin replication: the system channels always, plus every channel
    /// already known locally (restart resumes from the applied heights).
    pub fn start(&self) -> Result<(), PeerError> {
        self.started.store(true, Ordering::SeqCst);
        self.ensure_worker(GLOBAL_CHANNEL_ID);
        self.ensure_worker(CONFIG_CHANNEL_ID);
        for channel_id in self.known_channels()? {
            self.discover_channel(&channel_id);
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        for worker in self.workers.read().values() {
            worker.stop();
        }
    }

    /// Current lifecycle state of a replicated channel.
    pub fn channel_state(&self, channel_id: &str) -> Option<ChannelState> {
        self.workers.read().get(channel_id).map(|w| w.state())
    }

    /// Channels this peer replicates, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The peer's applied height of a channel.
    pub fn channel_height(&self, channel_id: &str) -> Result<u64, PeerError> {
        match self.db.get(&keys::applied(channel_id))? {
            Some(bytes) => {
                let applied: crate::manager::AppliedState = codec::from_bytes(&bytes)?;
                Ok(applied.next)
            }
            None => Ok(0),
        }
    }

    /// A locally applied block.
    pub fn get_block(&self, channel_id: &str, number: u64) -> Result<Block, PeerError> {
        match self.db.get(&keys::block(channel_id, number))? {
            Some(bytes) => Ok(codec::from_bytes(&bytes)?),
            None => Err(PeerError::Storage(
                vellum_storage::StorageError::NotFound { number },
            )),
        }
    }

    /// Execution status of a transaction. With `wait_until_ready` the
    /// call parks (bounded) until the block containing the transaction
    /// has been executed, instead of reporting absence for an in-flight
    /// transaction.
    pub async fn get_tx_status(
        &self,
        channel_id: &str,
        tx_id: &str,
        wait_until_ready: bool,
    ) -> Result<TxStatus, PeerError> {
        if let Some(bytes) = self.db.get(&keys::tx_status(channel_id, tx_id))? {
            return Ok(codec::from_bytes(&bytes)?);
        }
        if !wait_until_ready {
            return Err(PeerError::StatusNotFound {
                channel: channel_id.to_string(),
                tx_id: tx_id.to_string(),
            });
        }
        let key = status_key(channel_id, tx_id);
        match timeout(self.cfg.status_timeout, self.statuses.watch(&key)).await {
            Ok(status) => Ok(status),
            Err(_) => Err(PeerError::Timeout(format!("status of {tx_id}"))),
        }
    }

    /// Every transaction id one identity has signed, per channel.
    pub fn list_tx_history(
        &self,
        address: &Address,
    ) -> Result<HashMap<String, Vec<String>>, PeerError> {
        let prefix = keys::history_prefix(address);
        let mut history = HashMap::new();
        for (key, value) in self.db.prefix_scan(&prefix)? {
            let Ok(suffix) = String::from_utf8(key[prefix.len()..].to_vec()) else {
                continue;
            };
            let ids: Vec<String> = codec::from_bytes(&value)?;
            history.insert(suffix, ids);
        }
        Ok(history)
    }

    // ---- internals shared with the sync workers ----

    pub(crate) fn cfg(&self) -> &PeerConfig {
        &self.cfg
    }

    pub(crate) fn db(&self) -> &Arc<dyn KeyValueStore> {
        &self.db
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.executor
    }

    pub(crate) fn clients(&self) -> &[Arc<dyn OrdererClient>] {
        &self.clients
    }

    /// Join a discovered channel if its profile admits this peer.
    pub(crate) fn discover_channel(&self, channel_id: &str) {
        if is_system_channel(channel_id) || self.workers.read().contains_key(channel_id) {
            return;
        }
        match self.profile(channel_id) {
            Ok(Some(profile)) if profile.is_member(&self.identity) => {
                info!(channel = %channel_id, "discovered channel");
                self.ensure_worker(channel_id);
            }
            // Membership denied, or the profile has not arrived yet; a
            // later _config block will trigger discovery again.
            _ => {}
        }
    }

    /// Wake status waiters for every transaction of an applied block.
    pub(crate) fn notify_statuses(&self, channel_id: &str, block: &Block) {
        for tx in &block.transactions {
            if let Ok(Some(bytes)) = self.db.get(&keys::tx_status(channel_id, &tx.id)) {
                if let Ok(status) = codec::from_bytes::<TxStatus>(&bytes) {
                    self.statuses.done(&status_key(channel_id, &tx.id), status);
                }
            }
        }
    }

    fn ensure_worker(&self, channel_id: &str) {
        let mut workers = self.workers.write();
        let worker = workers
            .entry(channel_id.to_string())
            .or_insert_with(|| SyncWorker::new(channel_id, self.weak.clone()));
        if self.started.load(Ordering::SeqCst) {
            worker.start();
        }
    }

    fn profile(&self, channel_id: &str) -> Result<Option<ChannelProfile>, PeerError> {
        match self.db.get(&keys::channel_profile(channel_id))? {
            Some(bytes) => Ok(Some(codec::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn known_channels(&self) -> Result<Vec<String>, PeerError> {
        let prefix = keys::channel_prefix();
        Ok(self
            .db
            .prefix_scan(&prefix)?
            .into_iter()
            .filter_map(|(key, _)| String::from_utf8(key[prefix.len()..].to_vec()).ok())
            .filter(|id| !is_system_channel(id))
            .collect())
    }
}

fn status_key(channel_id: &str, tx_id: &str) -> String {
    format!("{channel_id}:{tx_id}")
}
