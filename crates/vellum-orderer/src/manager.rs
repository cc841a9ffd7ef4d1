//! Per-channel manager: the commit loop between the consensus engine and
//! the channel's block log.
//!
//! Exactly one manager exists per channel and it is the only writer of
//! that channel's log. The loop pulls ordered batches from the engine,
//! drops transactions already on the chain, assembles the next linked
//! block, persists it, lets the coordinator apply system side effects,
//! and only then releases the callers parked on `add_tx`.

use crate::errors::{CommitFailure, OrdererError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use vellum_consensus::{ConsensusBlock, ConsensusEngine, ConsensusError};
use vellum_storage::{BatchOp, BlockLog, KeyValueStore};
use vellum_types::{codec, event::Hub, Block, Tx, TxStatus, GENESIS_PREV_HASH};

/// Receives every committed block for system-channel application; returns
/// per-transaction application failures keyed by tx id.
#[async_trait]
pub(crate) trait CommitSink: Send + Sync {
    async fn block_committed(&self, block: &Block) -> HashMap<String, CommitFailure>;
}

/// Marker key recording that a tx id is already ordered on its channel.
fn ordered_key(channel_id: &str, tx_id: &str) -> Vec<u8> {
    format!("ordered:{channel_id}:{tx_id}").into_bytes()
}

pub(crate) struct ChannelManager {
    channel_id: String,
    log: BlockLog,
    db: Arc<dyn KeyValueStore>,
    engine: Arc<dyn ConsensusEngine>,
    submit_timeout: Duration,
    /// tx id -> placement or application failure.
    commits: Hub<Result<(u64, u32), CommitFailure>>,
    /// block number -> committed signal, for blocking fetches.
    ready: Hub<()>,
    /// Next engine block number to pull this process run.
    cursor: Mutex<u64>,
    stop: watch::Sender<bool>,
    started: AtomicBool,
}

impl ChannelManager {
    pub(crate) fn new(
        channel_id: &str,
        dir: impl AsRef<Path>,
        db: Arc<dyn KeyValueStore>,
        engine: Arc<dyn ConsensusEngine>,
        submit_timeout: Duration,
    ) -> Result<Arc<Self>, OrdererError> {
        let log = BlockLog::open(channel_id, dir)?;
        Ok(Arc::new(Self {
            channel_id: channel_id.to_string(),
            log,
            db,
            engine,
            submit_timeout,
            commits: Hub::new(),
            ready: Hub::new(),
            cursor: Mutex::new(0),
            stop: watch::channel(false).0,
            started: AtomicBool::new(false),
        }))
    }

    pub(crate) fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub(crate) fn has_genesis(&self) -> bool {
        self.log.has_genesis()
    }

    pub(crate) fn height(&self) -> u64 {
        self.log.height()
    }

    pub(crate) fn get_block(&self, number: u64) -> Result<Block, OrdererError> {
        self.log.get(number).map_err(|err| match err {
            vellum_storage::StorageError::NotFound { number } => OrdererError::NotFound {
                channel: self.channel_id.clone(),
                number,
            },
            other => other.into(),
        })
    }

    /// Fetch a block, optionally parking until it is committed.
    pub(crate) async fn fetch_block(
        &self,
        number: u64,
        blocking: bool,
    ) -> Result<Block, OrdererError> {
        if blocking && number >= self.height() {
            self.ready.watch(&number.to_string()).await;
        }
        self.get_block(number)
    }

    /// Whether the tx id is already ordered on this channel.
    pub(crate) fn has_tx(&self, tx: &Tx) -> Result<bool, OrdererError> {
        Ok(self.db.exists(&ordered_key(&self.channel_id, &tx.id))?)
    }

    /// Persist a block and its ordered-tx markers; the only append path.
    pub(crate) fn commit_block(&self, block: &Block) -> Result<(), OrdererError> {
        self.log.append(block)?;
        let ops = block
            .transactions
            .iter()
            .map(|tx| {
                BatchOp::put(
                    ordered_key(&self.channel_id, &tx.id),
                    block.header.number.to_be_bytes().to_vec(),
                )
            })
            .collect();
        self.db.write_batch(ops)?;
        self.ready.done(&block.header.number.to_string(), ());
        Ok(())
    }

    /// Submit a transaction and wait until its block is durable, returning
    /// the placement. Synchronous-commit semantics from the caller's view.
    pub(crate) async fn add_tx(&self, tx: &Tx) -> Result<TxStatus, OrdererError> {
        if self.has_tx(tx)? {
            return Err(OrdererError::DuplicateTx);
        }
        let bytes = codec::to_bytes(tx)?;
        match self.engine.add_tx(&self.channel_id, bytes).await {
            Ok(()) => {}
            Err(ConsensusError::DuplicateTx) => return Err(OrdererError::DuplicateTx),
            Err(err) => return Err(err.into()),
        }
        match timeout(self.submit_timeout, self.commits.watch(&tx.id)).await {
            Ok(Ok((block_number, block_index))) => Ok(TxStatus {
                block_number,
                block_index,
                ..Default::default()
            }),
            Ok(Err(failure)) => Err(failure.into()),
            Err(_) => Err(OrdererError::Timeout(self.channel_id.clone())),
        }
    }

    /// Spawn the commit loop; idempotent.
    pub(crate) fn start(self: &Arc<Self>, sink: Weak<dyn CommitSink>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run(sink).await });
    }

    pub(crate) fn stop(&self) {
        let _ = self.stop.send(true);
    }

    async fn run(self: Arc<Self>, sink: Weak<dyn CommitSink>) {
        info!(channel = %self.channel_id, height = self.height(), "channel manager started");
        let mut stop = self.stop.subscribe();
        loop {
            let next = *self.cursor.lock();
            let consensus_block = tokio::select! {
                _ = stop.changed() => return,
                result = self.engine.get_block(&self.channel_id, next, true) => match result {
                    Ok(block) => block,
                    Err(err) => {
                        warn!(channel = %self.channel_id, number = next, %err, "engine fetch failed, retrying");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
            };
            *self.cursor.lock() = next + 1;

            let txs = self.filter_txs(&consensus_block);
            if txs.is_empty() {
                continue;
            }
            let (number, prev_hash) = match self.log.tip() {
                Some((tip, hash)) => (tip + 1, hash),
                None => (0, GENESIS_PREV_HASH),
            };
            let block = Block::new(&self.channel_id, number, prev_hash, txs);
            if let Err(err) = self.commit_block(&block) {
                // A gap or linkage break here is corruption; stop this
                // channel's commits instead of skipping.
                error!(channel = %self.channel_id, number, %err, "failed to persist block, halting channel");
                return;
            }
            debug!(channel = %self.channel_id, number, txs = block.transactions.len(), "committed block");

            let failures = match sink.upgrade() {
                Some(sink) => sink.block_committed(&block).await,
                None => return,
            };
            for (index, tx) in block.transactions.iter().enumerate() {
                let outcome = match failures.get(&tx.id) {
                    Some(failure) => Err(failure.clone()),
                    None => Ok((number, index as u32)),
                };
                self.commits.done(&tx.id, outcome);
            }
        }
    }

    /// Decode an engine batch, dropping undecodable entries, in-batch
    /// duplicates and ids already ordered (log replay after a restart).
    fn filter_txs(&self, consensus_block: &ConsensusBlock) -> Vec<Tx> {
        let mut seen = HashSet::new();
        let mut txs = Vec::with_capacity(consensus_block.txs.len());
        for bytes in &consensus_block.txs {
            let tx: Tx = match codec::from_bytes(bytes) {
                Ok(tx) => tx,
                Err(err) => {
                    warn!(channel = %self.channel_id, %err, "dropping undecodable tx from engine batch");
                    continue;
                }
            };
            if !seen.insert(tx.id.clone()) {
                continue;
            }
            match self.has_tx(&tx) {
                Ok(true) => continue,
                Ok(false) => txs.push(tx),
                Err(err) => {
                    warn!(channel = %self.channel_id, %err, "duplicate check failed, dropping tx");
                }
            }
        }
        txs
    }
}
