//! The per-channel sequencing core shared by every engine.
//!
//! One worker task owns the cut decision for one channel: a block is cut
//! when `batch_size` transactions are pending, or `batch_timeout` after
//! the first pending transaction opened the batch, whichever comes first.
//! An empty pool never cuts. Within a channel, cuts are strictly
//! serialized; across channels, sequencers are independent.

use crate::block::ConsensusBlock;
use crate::config::ChannelConfig;
use crate::errors::ConsensusError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};
use vellum_types::{crypto, event::Hub};

/// Hook invoked with each cut block before it becomes visible; Raft uses
/// it to persist the committed entry.
pub(crate) type CommitHook =
    Box<dyn Fn(&ConsensusBlock) -> Result<(), ConsensusError> + Send + Sync>;

pub(crate) fn tx_digest(tx: &[u8]) -> String {
    hex::encode(crypto::hash(tx))
}

#[derive(Default)]
struct TxPool {
    seen: HashSet<String>,
    pending: Vec<(String, Vec<u8>)>,
}

impl TxPool {
    fn add(&mut self, digest: String, tx: Vec<u8>) -> Result<(), ConsensusError> {
        if !self.seen.insert(digest.clone()) {
            return Err(ConsensusError::DuplicateTx);
        }
        self.pending.push((digest, tx));
        Ok(())
    }

    fn fetch(&mut self, max: usize) -> Vec<(String, Vec<u8>)> {
        let take = self.pending.len().min(max);
        self.pending.drain(..take).collect()
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

pub(crate) struct Sequencer {
    channel_id: String,
    cfg: ChannelConfig,
    pool: Mutex<TxPool>,
    blocks: Mutex<BTreeMap<u64, ConsensusBlock>>,
    next_number: Mutex<u64>,
    /// tx digest -> containing block number.
    batched: Hub<u64>,
    /// block number (as string) -> readiness signal.
    ready: Hub<()>,
    arrived: Notify,
    stop: watch::Sender<bool>,
    started: AtomicBool,
    commit_hook: Option<CommitHook>,
}

impl Sequencer {
    pub(crate) fn new(channel_id: &str, cfg: ChannelConfig, commit_hook: Option<CommitHook>) -> Arc<Self> {
        let start_number = cfg.start_number;
        Arc::new(Self {
            channel_id: channel_id.to_string(),
            cfg,
            pool: Mutex::new(TxPool::default()),
            blocks: Mutex::new(BTreeMap::new()),
            next_number: Mutex::new(start_number),
            batched: Hub::new(),
            ready: Hub::new(),
            arrived: Notify::new(),
            stop: watch::channel(false).0,
            started: AtomicBool::new(false),
            commit_hook,
        })
    }

    /// Seed already-committed blocks (log replay) before starting.
    pub(crate) fn preload(&self, blocks: Vec<ConsensusBlock>) {
        let mut next = self.next_number.lock();
        let mut map = self.blocks.lock();
        for block in blocks {
            *next = (*next).max(block.number + 1);
            for tx in &block.txs {
                self.batched.done(&tx_digest(tx), block.number);
            }
            self.ready.done(&block.number.to_string(), ());
            map.insert(block.number, block);
        }
    }

    /// Spawn the cut worker; idempotent.
    pub(crate) fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(channel = %self.channel_id, "sequencer started");
        let seq = Arc::clone(self);
        tokio::spawn(async move { seq.run().await });
    }

    pub(crate) fn stop(&self) {
        let _ = self.stop.send(true);
    }

    async fn run(&self) {
        let mut stop = self.stop.subscribe();
        if *stop.borrow() {
            return;
        }
        loop {
            // Wait for the batch to open.
            while self.pool_len() == 0 {
                tokio::select! {
                    _ = self.arrived.notified() => {}
                    _ = stop.changed() => return,
                }
            }
            // The batch opened with its first pending tx; arm the deadline.
            let deadline = Instant::now() + self.cfg.batch_timeout;
            while self.pool_len() < self.cfg.batch_size {
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    _ = self.arrived.notified() => {}
                    _ = stop.changed() => return,
                }
            }
            if let Err(err) = self.cut() {
                // Persistence failures are fatal for the channel: stop
                // cutting instead of silently skipping a number.
                error!(channel = %self.channel_id, %err, "cut failed, halting channel");
                self.stop();
                return;
            }
        }
    }

    fn cut(&self) -> Result<(), ConsensusError> {
        let batch = self.pool.lock().fetch(self.cfg.batch_size);
        if batch.is_empty() {
            return Ok(());
        }
        let mut next = self.next_number.lock();
        let number = *next;
        let block = ConsensusBlock {
            channel_id: self.channel_id.clone(),
            number,
            txs: batch.iter().map(|(_, tx)| tx.clone()).collect(),
        };
        if let Some(hook) = &self.commit_hook {
            hook(&block)?;
        }
        *next = number + 1;
        drop(next);

        debug!(channel = %self.channel_id, number, txs = block.txs.len(), "cut block");
        self.blocks.lock().insert(number, block);
        for (digest, _) in &batch {
            self.batched.done(digest, number);
        }
        self.ready.done(&number.to_string(), ());
        Ok(())
    }

    fn pool_len(&self) -> usize {
        self.pool.lock().len()
    }

    /// Enqueue transaction bytes and wait until they are inside a block.
    pub(crate) async fn add_tx(&self, tx: Vec<u8>) -> Result<u64, ConsensusError> {
        if *self.stop.subscribe().borrow() {
            return Err(ConsensusError::Stopped);
        }
        let digest = tx_digest(&tx);
        self.pool.lock().add(digest.clone(), tx)?;
        self.arrived.notify_one();
        Ok(self.batched.watch(&digest).await)
    }

    pub(crate) async fn get_block(
        &self,
        number: u64,
        blocking: bool,
    ) -> Result<ConsensusBlock, ConsensusError> {
        if let Some(block) = self.blocks.lock().get(&number) {
            return Ok(block.clone());
        }
        if !blocking {
            return Err(ConsensusError::BlockNotReady {
                channel: self.channel_id.clone(),
                number,
            });
        }
        self.ready.watch(&number.to_string()).await;
        self.blocks.lock().get(&number).cloned().ok_or_else(|| {
            ConsensusError::BlockNotReady {
                channel: self.channel_id.clone(),
                number,
            }
        })
    }
}
