//! Block execution against per-channel contract state.
//!
//! One executor instance is the single writer for its channel. Every
//! transaction produces exactly one [`TxStatus`]; execution failures are
//! recorded there and never roll back the block or its neighbours. All
//! effects of one block — account mutations, statuses, history entries —
//! land in a single atomic batch.

use crate::errors::PeerError;
use crate::vm::ContractVm;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use vellum_storage::{keys, BatchOp, KeyValueStore};
use vellum_types::{codec, crypto, Address, Block, SystemContract, TokenPayload, Tx, TxStatus};

/// A ledger account: token balance plus deployed code, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: u64,
    pub code: Vec<u8>,
}

/// Where a deployment lands: derived from the channel, the sender and the
/// code digest — independent of the nonce, so resubmitting an identical
/// deploy reaches the same address and reports a duplicate.
pub fn derive_contract_address(channel_id: &str, sender: Address, payload: &[u8]) -> Address {
    let mut buf = Vec::with_capacity(channel_id.len() + 20 + 32 + 7);
    buf.extend_from_slice(b"deploy:");
    buf.extend_from_slice(channel_id.as_bytes());
    buf.extend_from_slice(sender.as_bytes());
    buf.extend_from_slice(&crypto::hash(payload));
    Address::from_slice(&crypto::hash(&buf))
}

/// Read-through write cache so transactions within a block observe each
/// other's effects before anything hits the store.
struct BlockCache<'a> {
    db: &'a dyn KeyValueStore,
    pending: HashMap<Vec<u8>, Vec<u8>>,
}

impl<'a> BlockCache<'a> {
    fn new(db: &'a dyn KeyValueStore) -> Self {
        Self {
            db,
            pending: HashMap::new(),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PeerError> {
        if let Some(value) = self.pending.get(key) {
            return Ok(Some(value.clone()));
        }
        Ok(self.db.get(key)?)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending.insert(key, value);
    }

    fn account(&self, address: &Address) -> Result<Option<Account>, PeerError> {
        match self.get(&keys::account(address))? {
            Some(bytes) => Ok(Some(codec::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_account(&mut self, address: &Address, account: &Account) -> Result<(), PeerError> {
        self.put(keys::account(address), codec::to_bytes(account)?);
        Ok(())
    }

    fn into_ops(self) -> Vec<BatchOp> {
        self.pending
            .into_iter()
            .map(|(key, value)| BatchOp::put(key, value))
            .collect()
    }
}

pub struct Executor {
    db: Arc<dyn KeyValueStore>,
    vm: Arc<dyn ContractVm>,
}

impl Executor {
    pub fn new(db: Arc<dyn KeyValueStore>, vm: Arc<dyn ContractVm>) -> Self {
        Self { db, vm }
    }

    /// Run every transaction of an application-channel block in order,
    /// returning the block's atomic effect batch.
    pub fn execute_block(&self, block: &Block) -> Result<Vec<BatchOp>, PeerError> {
        let channel_id = &block.header.channel_id;
        let mut cache = BlockCache::new(&*self.db);
        for (index, tx) in block.transactions.iter().enumerate() {
            let mut status = TxStatus {
                block_number: block.header.number,
                block_index: index as u32,
                ..Default::default()
            };
            self.execute_tx(channel_id, tx, &mut cache, &mut status)?;
            record_status(&mut cache, channel_id, tx, &status)?;
        }
        debug!(channel = %channel_id, number = block.header.number, "executed block");
        Ok(cache.into_ops())
    }

    fn execute_tx(
        &self,
        channel_id: &str,
        tx: &Tx,
        cache: &mut BlockCache<'_>,
        status: &mut TxStatus,
    ) -> Result<(), PeerError> {
        match SystemContract::of(tx.data.recipient) {
            Some(SystemContract::TokenIssue) => {
                status.contract_address = tx.data.recipient.to_string();
                if let Err(err) = issue(cache, tx) {
                    status.err = err;
                }
            }
            Some(SystemContract::TokenTransfer) => {
                status.contract_address = tx.data.recipient.to_string();
                if let Err(err) = transfer(cache, tx) {
                    status.err = err;
                }
            }
            Some(SystemContract::TokenExchange) => {
                status.contract_address = tx.data.recipient.to_string();
                if let Err(err) = exchange(cache, channel_id, tx) {
                    status.err = err;
                }
            }
            Some(_) => {
                // Ledger-management contracts; their effects are applied
                // by the system-channel path, the status just records them.
                status.contract_address = tx.data.recipient.to_string();
            }
            None if tx.data.recipient.is_zero() => self.deploy(channel_id, tx, cache, status)?,
            None => self.call(tx, cache, status)?,
        }
        Ok(())
    }

    fn deploy(
        &self,
        channel_id: &str,
        tx: &Tx,
        cache: &mut BlockCache<'_>,
        status: &mut TxStatus,
    ) -> Result<(), PeerError> {
        let address = derive_contract_address(channel_id, tx.sender(), &tx.data.payload);
        if matches!(cache.account(&address)?, Some(account) if !account.code.is_empty()) {
            status.err = "Duplicate address".to_string();
            return Ok(());
        }
        match self.vm.deploy(&tx.data.payload) {
            Ok(output) => {
                cache.set_account(
                    &address,
                    &Account {
                        balance: 0,
                        code: tx.data.payload.clone(),
                    },
                )?;
                status.output = output;
                status.contract_address = address.to_string();
            }
            Err(err) => status.err = err.to_string(),
        }
        Ok(())
    }

    fn call(
        &self,
        tx: &Tx,
        cache: &mut BlockCache<'_>,
        status: &mut TxStatus,
    ) -> Result<(), PeerError> {
        match cache.account(&tx.data.recipient)? {
            Some(account) if !account.code.is_empty() => {
                match self.vm.call(&account.code, &tx.data.payload) {
                    Ok(output) => status.output = output,
                    Err(err) => status.err = err.to_string(),
                }
            }
            _ => status.err = "Invalid Address".to_string(),
        }
        Ok(())
    }
}

/// Append the status and the sender's history entry to the block batch.
fn record_status(
    cache: &mut BlockCache<'_>,
    channel_id: &str,
    tx: &Tx,
    status: &TxStatus,
) -> Result<(), PeerError> {
    cache.put(
        keys::tx_status(channel_id, &tx.id),
        codec::to_bytes(status)?,
    );
    let sender = tx.sender();
    if !sender.is_zero() {
        let key = keys::history(&sender, channel_id);
        let mut history: Vec<String> = match cache.get(&key)? {
            Some(bytes) => codec::from_bytes(&bytes)?,
            None => Vec::new(),
        };
        history.push(tx.id.clone());
        cache.put(key, codec::to_bytes(&history)?);
    }
    Ok(())
}

fn token_payload(tx: &Tx) -> Result<TokenPayload, String> {
    codec::from_bytes(&tx.data.payload).map_err(|err| err.to_string())
}

/// Token issue: the first issuer latches the asset-admin role; everyone
/// else is refused.
fn issue(cache: &mut BlockCache<'_>, tx: &Tx) -> Result<(), String> {
    let payload = token_payload(tx)?;
    let issuer = tx
        .data
        .sig
        .as_ref()
        .map(|sig| sig.pk.clone())
        .ok_or_else(|| "unsigned issue".to_string())?;
    match cache.get(&keys::asset_admin()).map_err(|e| e.to_string())? {
        None => cache.put(keys::asset_admin(), issuer),
        Some(admin) if admin == issuer => {}
        Some(_) => return Err("issue authentication failed".to_string()),
    }
    if tx.data.value == 0 {
        return Ok(());
    }
    let recipient = payload.recipient();
    let mut account = cache
        .account(&recipient)
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    account.balance = account
        .balance
        .checked_add(tx.data.value)
        .ok_or_else(|| "balance overflow".to_string())?;
    cache.set_account(&recipient, &account).map_err(|e| e.to_string())
}

fn transfer(cache: &mut BlockCache<'_>, tx: &Tx) -> Result<(), String> {
    let payload = token_payload(tx)?;
    move_balance(cache, tx.sender(), payload.recipient(), tx.data.value)
}

fn move_balance(
    cache: &mut BlockCache<'_>,
    from: Address,
    to: Address,
    value: u64,
) -> Result<(), String> {
    if value == 0 {
        return Ok(());
    }
    let mut sender = cache
        .account(&from)
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    sender.balance = sender
        .balance
        .checked_sub(value)
        .ok_or_else(|| "insufficient balance".to_string())?;
    let mut recipient = cache
        .account(&to)
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    recipient.balance = recipient
        .balance
        .checked_add(value)
        .ok_or_else(|| "balance overflow".to_string())?;
    cache.set_account(&from, &sender).map_err(|e| e.to_string())?;
    cache.set_account(&to, &recipient).map_err(|e| e.to_string())
}

/// Token exchange: move balance to the channel account and credit the
/// sender with that channel's tokens.
fn exchange(cache: &mut BlockCache<'_>, channel_id: &str, tx: &Tx) -> Result<(), String> {
    let payload = token_payload(tx)?;
    let recipient = payload.recipient();
    move_balance(cache, tx.sender(), recipient, tx.data.value)?;
    let key = keys::token(channel_id, &tx.sender());
    let current = match cache.get(&key).map_err(|e| e.to_string())? {
        Some(bytes) => u64::from_be_bytes(bytes.try_into().map_err(|_| "corrupt token balance")?),
        None => 0,
    };
    let updated = current
        .checked_add(tx.data.value)
        .ok_or_else(|| "token overflow".to_string())?;
    cache.put(key, updated.to_be_bytes().to_vec());
    Ok(())
}
