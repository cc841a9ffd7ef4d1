//! Per-channel sync worker.
//!
//! Each replicated channel runs one worker looping `Syncing ⇄ CaughtUp`
//! forever: fetch the next block from any answering orderer, verify
//! linkage and every signature, apply it atomically, repeat. A block that
//! fails verification is never applied; the fetch is simply retried.

use crate::coordinator::Peer;
use crate::errors::PeerError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vellum_quorum::Collector;
use vellum_storage::{keys, BatchOp};
use vellum_types::{
    codec, crypto::Hash, is_system_channel, Block, ConfigPayload, GlobalPayload, SystemContract,
    Tx, TxStatus, CONFIG_CHANNEL_ID, GENESIS_PREV_HASH, GLOBAL_CHANNEL_ID,
};

/// Lifecycle of a replicated channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Discovered,
    Syncing,
    CaughtUp,
}

/// The peer's durable sync cursor: next block to apply and the hash the
/// next block must link to. Written in the same batch as the block's
/// effects, so a crash never splits them.
#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct AppliedState {
    pub(crate) next: u64,
    pub(crate) tip_hash: Hash,
}

enum FetchOutcome {
    Block(Block),
    AllFailed,
    TimedOut,
    Stopped,
}

pub(crate) struct SyncWorker {
    channel_id: String,
    peer: Weak<Peer>,
    state: Mutex<ChannelState>,
    stop: watch::Sender<bool>,
    started: AtomicBool,
}

impl SyncWorker {
    pub(crate) fn new(channel_id: &str, peer: Weak<Peer>) -> Arc<Self> {
        Arc::new(Self {
            channel_id: channel_id.to_string(),
            peer,
            state: Mutex::new(ChannelState::Discovered),
            stop: watch::channel(false).0,
            started: AtomicBool::new(false),
        })
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub(crate) fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run().await });
    }

    pub(crate) fn stop(&self) {
        let _ = self.stop.send(true);
    }

    async fn run(self: Arc<Self>) {
        info!(channel = %self.channel_id, "sync worker started");
        loop {
            let Some(peer) = self.peer.upgrade() else {
                return;
            };
            let applied = match self.applied_state(&peer) {
                Ok(applied) => applied,
                Err(err) => {
                    warn!(channel = %self.channel_id, %err, "cannot read sync cursor");
                    tokio::time::sleep(peer.cfg().poll_interval).await;
                    continue;
                }
            };
            *self.state.lock() = ChannelState::Syncing;
            match self.fetch_next(&peer, applied.next).await {
                FetchOutcome::Block(block) => {
                    if let Err(err) = self.verify_and_apply(&peer, &applied, &block).await {
                        warn!(
                            channel = %self.channel_id,
                            number = applied.next,
                            %err,
                            "rejected fetched block, refetching"
                        );
                        tokio::time::sleep(peer.cfg().poll_interval).await;
                    }
                }
                FetchOutcome::TimedOut => {
                    // No new block within the bound; confirm against the
                    // majority of orderers before declaring caught up.
                    match self.majority_height(&peer).await {
                        Ok(height) if height > applied.next => {}
                        _ => *self.state.lock() = ChannelState::CaughtUp,
                    }
                }
                FetchOutcome::AllFailed => {
                    warn!(channel = %self.channel_id, "no orderer answered, backing off");
                    tokio::time::sleep(peer.cfg().poll_interval).await;
                }
                FetchOutcome::Stopped => return,
            }
            if *self.stop.subscribe().borrow() {
                return;
            }
        }
    }

    fn applied_state(&self, peer: &Peer) -> Result<AppliedState, PeerError> {
        match peer.db().get(&keys::applied(&self.channel_id))? {
            Some(bytes) => Ok(codec::from_bytes(&bytes)?),
            None => Ok(AppliedState {
                next: 0,
                tip_hash: GENESIS_PREV_HASH,
            }),
        }
    }

    /// Fan the fetch out to every configured orderer; the first answer
    /// wins and stragglers are ignored. Loss of any one replica does not
    /// halt sync while another still answers.
    async fn fetch_next(&self, peer: &Peer, next: u64) -> FetchOutcome {
        let clients = peer.clients();
        if clients.is_empty() {
            return FetchOutcome::AllFailed;
        }
        let (result_tx, mut results) = mpsc::channel(clients.len());
        for client in clients.iter().cloned() {
            let channel_id = self.channel_id.clone();
            let fetch_timeout = peer.cfg().fetch_timeout;
            let result_tx = result_tx.clone();
            tokio::spawn(async move {
                let outcome = timeout(fetch_timeout, client.fetch_block(&channel_id, next, true)).await;
                let _ = result_tx.send(outcome).await;
            });
        }
        drop(result_tx);

        let mut stop = self.stop.subscribe();
        let mut failures = 0;
        let mut timeouts = 0;
        loop {
            tokio::select! {
                _ = stop.changed() => return FetchOutcome::Stopped,
                received = results.recv() => match received {
                    Some(Ok(Ok(block))) => return FetchOutcome::Block(block),
                    Some(Ok(Err(err))) => {
                        debug!(channel = %self.channel_id, %err, "orderer fetch failed");
                        failures += 1;
                    }
                    Some(Err(_)) => timeouts += 1,
                    None => {
                        return if timeouts > 0 {
                            FetchOutcome::TimedOut
                        } else {
                            FetchOutcome::AllFailed
                        };
                    }
                },
            }
            if failures + timeouts == clients.len() {
                return if timeouts > 0 {
                    FetchOutcome::TimedOut
                } else {
                    FetchOutcome::AllFailed
                };
            }
        }
    }

    /// Majority-reconciled remote height of this channel.
    async fn majority_height(&self, peer: &Peer) -> Result<u64, PeerError> {
        let clients = peer.clients();
        let collector = Arc::new(Collector::new(clients.len(), 0));
        for client in clients.iter().cloned() {
            let channel_id = self.channel_id.clone();
            let collector = Arc::clone(&collector);
            tokio::spawn(async move {
                match client.channel_height(&channel_id).await {
                    Ok(height) => collector.add(height),
                    Err(err) => collector.add_error(err.to_string()),
                }
            });
        }
        match timeout(peer.cfg().fetch_timeout, collector.wait()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PeerError::Timeout(format!(
                "height poll of channel {}",
                self.channel_id
            ))),
        }
    }

    async fn verify_and_apply(
        &self,
        peer: &Arc<Peer>,
        applied: &AppliedState,
        block: &Block,
    ) -> Result<(), PeerError> {
        self.verify(applied, block)?;

        let mut ops = Vec::new();
        let mut discovered = Vec::new();
        match self.channel_id.as_str() {
            GLOBAL_CHANNEL_ID => self.apply_global(block, &mut discovered)?,
            CONFIG_CHANNEL_ID => self.apply_config(block, &mut ops, &mut discovered)?,
            _ => ops.extend(peer.executor().execute_block(block)?),
        }

        ops.push(BatchOp::put(
            keys::block(&self.channel_id, block.header.number),
            codec::to_bytes(block)?,
        ));
        ops.push(BatchOp::put(
            keys::applied(&self.channel_id),
            codec::to_bytes(&AppliedState {
                next: block.header.number + 1,
                tip_hash: block.hash(),
            })?,
        ));
        peer.db().write_batch(ops)?;
        debug!(channel = %self.channel_id, number = block.header.number, "applied block");

        for channel_id in discovered {
            peer.discover_channel(&channel_id);
        }
        peer.notify_statuses(&self.channel_id, block);
        Ok(())
    }

    /// Linkage and signature gate; a failure here is fatal for the block.
    fn verify(&self, applied: &AppliedState, block: &Block) -> Result<(), PeerError> {
        if block.header.number != applied.next {
            return Err(PeerError::BadBlock(format!(
                "expected block {}, received {}",
                applied.next, block.header.number
            )));
        }
        if block.header.prev_block != applied.tip_hash {
            return Err(PeerError::BadBlock(format!(
                "block {} does not link to the local tip",
                block.header.number
            )));
        }
        for tx in &block.transactions {
            match &tx.data.sig {
                Some(_) => {
                    if !tx.verify() {
                        return Err(PeerError::BadBlock(format!(
                            "transaction {} failed signature verification",
                            tx.id
                        )));
                    }
                }
                None => {
                    // Zero signatures are permitted only on genesis
                    // payloads and coordinator-made system records.
                    if !block.is_genesis() && !is_system_channel(&self.channel_id) {
                        return Err(PeerError::BadBlock(format!(
                            "unsigned transaction {} outside genesis",
                            tx.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_global(
        &self,
        block: &Block,
        discovered: &mut Vec<String>,
    ) -> Result<(), PeerError> {
        for tx in &block.transactions {
            let record: GlobalPayload = codec::from_bytes(&tx.data.payload)?;
            if !is_system_channel(&record.channel_id) {
                discovered.push(record.channel_id);
            }
        }
        Ok(())
    }

    fn apply_config(
        &self,
        block: &Block,
        ops: &mut Vec<BatchOp>,
        discovered: &mut Vec<String>,
    ) -> Result<(), PeerError> {
        for (index, tx) in block.transactions.iter().enumerate() {
            let mut status = TxStatus {
                block_number: block.header.number,
                block_index: index as u32,
                ..Default::default()
            };
            match self.apply_config_tx(tx, ops, discovered) {
                Ok(()) => {}
                Err(err) => status.err = err,
            }
            ops.push(BatchOp::put(
                keys::tx_status(&self.channel_id, &tx.id),
                codec::to_bytes(&status)?,
            ));
        }
        Ok(())
    }

    fn apply_config_tx(
        &self,
        tx: &Tx,
        ops: &mut Vec<BatchOp>,
        discovered: &mut Vec<String>,
    ) -> Result<(), String> {
        if SystemContract::of(tx.data.recipient) != Some(SystemContract::CreateChannel) {
            return Ok(());
        }
        let payload: ConfigPayload =
            codec::from_bytes(&tx.data.payload).map_err(|err| err.to_string())?;
        if payload.channel_id.is_empty() || is_system_channel(&payload.channel_id) {
            return Ok(());
        }
        let profile_bytes = codec::to_bytes(&payload.profile).map_err(|err| err.to_string())?;
        ops.push(BatchOp::put(
            keys::channel_profile(&payload.channel_id),
            profile_bytes,
        ));
        discovered.push(payload.channel_id);
        Ok(())
    }
}
