//! The channel/consensus coordinator.
//!
//! Owns one [`ChannelManager`] (and its slot in the consensus engine) per
//! channel, bootstraps the two system channels, and fronts the four
//! ordering operations: `add_channel`, `add_tx`, `list_channels` and
//! `fetch_block`. Every accepted transaction ends up in exactly one
//! position of exactly one block, or is rejected with a categorized error
//! before it enters any batch.

use crate::config::ChainConfig;
use crate::errors::OrdererError;
use crate::genesis;
use crate::manager::{ChannelManager, CommitSink};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::info;
use vellum_consensus::ConsensusEngine;
use vellum_storage::{keys, KeyValueStore};
use vellum_types::{
    address::CREATE_CHANNEL_ADDRESS, codec, is_system_channel, is_valid_channel_name, Block,
    ChannelInfo, ChannelProfile, ConfigPayload, GlobalPayload, Identity, Member, SystemContract,
    Tx, TxStatus, CONFIG_CHANNEL_ID, GLOBAL_CHANNEL_ID,
};

pub struct Coordinator {
    cfg: ChainConfig,
    db: Arc<dyn KeyValueStore>,
    engine: Arc<dyn ConsensusEngine>,
    /// channel id -> manager, system channels included. Entries are added
    /// at bootstrap or on channel creation and never removed while the
    /// process runs.
    managers: RwLock<HashMap<String, Arc<ChannelManager>>>,
    started: AtomicBool,
    weak: Weak<Coordinator>,
}

impl Coordinator {
    /// Open the chain directory, bootstrapping `_config` and `_global`
    /// when absent and reloading every known user channel.
    pub async fn new(
        cfg: ChainConfig,
        db: Arc<dyn KeyValueStore>,
        engine: Arc<dyn ConsensusEngine>,
    ) -> Result<Arc<Self>, OrdererError> {
        let coord = Arc::new_cyclic(|weak| Self {
            cfg,
            db,
            engine,
            managers: RwLock::new(HashMap::new()),
            started: AtomicBool::new(false),
            weak: weak.clone(),
        });

        let config_manager = coord.open_manager(CONFIG_CHANNEL_ID)?;
        if !config_manager.has_genesis() {
            info!("creating genesis block of channel {CONFIG_CHANNEL_ID}");
            let block = genesis::config_genesis(&coord.cfg.system_admins)?;
            config_manager.commit_block(&block)?;
        }
        coord.apply_config_genesis(&config_manager.get_block(0)?)?;

        let global_manager = coord.open_manager(GLOBAL_CHANNEL_ID)?;
        if !global_manager.has_genesis() {
            info!("creating genesis block of channel {GLOBAL_CHANNEL_ID}");
            let config_genesis_block = config_manager.get_block(0)?;
            let block = genesis::global_genesis(&[GlobalPayload {
                channel_id: CONFIG_CHANNEL_ID.to_string(),
                number: 0,
                hash: config_genesis_block.hash(),
            }])?;
            global_manager.commit_block(&block)?;
        }

        coord.insert_manager(config_manager);
        coord.insert_manager(global_manager);
        coord
            .engine
            .add_channel(CONFIG_CHANNEL_ID, coord.cfg.system_channel())
            .await?;
        coord
            .engine
            .add_channel(GLOBAL_CHANNEL_ID, coord.cfg.system_channel())
            .await?;

        for channel_id in coord.registered_channels()? {
            if is_system_channel(&channel_id) {
                continue;
            }
            let manager = coord.open_manager(&channel_id)?;
            coord.insert_manager(manager);
            coord
                .engine
                .add_channel(&channel_id, coord.cfg.user_channel())
                .await?;
        }
        Ok(coord)
    }

    /// Start the engine and every channel's commit loop.
    pub async fn start(&self) -> Result<(), OrdererError> {
        self.engine.start().await?;
        self.started.store(true, Ordering::SeqCst);
        let coord = self.sink().ok_or(OrdererError::ShuttingDown)?;
        let sink: Weak<dyn CommitSink> = Arc::downgrade(&coord);
        for manager in self.managers.read().values() {
            manager.start(sink.clone());
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), OrdererError> {
        self.started.store(false, Ordering::SeqCst);
        for manager in self.managers.read().values() {
            manager.stop();
        }
        self.engine.stop().await?;
        Ok(())
    }

    /// Validate and order a channel-creation transaction, returning once
    /// the new channel exists. Creation itself is ordered by `_config`'s
    /// consensus round, so concurrent creators serialize there.
    pub async fn add_channel(&self, tx: Tx) -> Result<ChannelInfo, OrdererError> {
        if !tx.verify() {
            return Err(OrdererError::InvalidSignature);
        }
        if tx.data.recipient != CREATE_CHANNEL_ADDRESS {
            return Err(OrdererError::MalformedPayload(
                "recipient is not the create-channel contract".into(),
            ));
        }
        if tx.data.channel_id != CONFIG_CHANNEL_ID {
            return Err(OrdererError::MalformedPayload(
                "channel-creation transactions target _config".into(),
            ));
        }
        let payload: ConfigPayload = codec::from_bytes(&tx.data.payload)
            .map_err(|err| OrdererError::MalformedPayload(err.to_string()))?;
        self.validate_new_channel(&payload)?;

        let config_manager = self.channel_manager(CONFIG_CHANNEL_ID)?;
        config_manager.add_tx(&tx).await?;

        let manager = self.channel_manager(&payload.channel_id)?;
        let identity = if payload.profile.is_admin(&member_of(&tx)?) {
            Identity::Admin
        } else {
            Identity::Member
        };
        Ok(ChannelInfo {
            channel_id: payload.channel_id,
            is_system: false,
            block_height: manager.height(),
            identity,
        })
    }

    /// Validate, authorize and order a transaction, returning its block
    /// placement once the batch containing it has committed.
    pub async fn add_tx(&self, tx: Tx) -> Result<TxStatus, OrdererError> {
        if !tx.verify() {
            return Err(OrdererError::InvalidSignature);
        }
        if tx.data.channel_id == GLOBAL_CHANNEL_ID {
            // _global is maintained by the coordinator itself.
            return Err(OrdererError::NotAuthorized(GLOBAL_CHANNEL_ID.to_string()));
        }
        let manager = self.channel_manager(&tx.data.channel_id)?;
        self.authorize(&tx)?;
        manager.add_tx(&tx).await
    }

    /// Point-in-time channel listing for one caller; a local read, no
    /// consensus round.
    pub fn list_channels(
        &self,
        member: &Member,
        include_system: bool,
    ) -> Result<Vec<ChannelInfo>, OrdererError> {
        let mut infos = Vec::new();
        let managers = self.managers.read();
        for (channel_id, manager) in managers.iter() {
            if is_system_channel(channel_id) {
                if include_system {
                    infos.push(ChannelInfo {
                        channel_id: channel_id.clone(),
                        is_system: true,
                        block_height: manager.height(),
                        identity: Identity::Member,
                    });
                }
                continue;
            }
            let profile = self.profile(channel_id)?;
            if !profile.is_member(member) {
                continue;
            }
            let identity = if profile.is_admin(member) {
                Identity::Admin
            } else {
                Identity::Member
            };
            infos.push(ChannelInfo {
                channel_id: channel_id.clone(),
                is_system: false,
                block_height: manager.height(),
                identity,
            });
        }
        infos.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        Ok(infos)
    }

    /// Fetch a committed block; with `blocking` the call parks until the
    /// block exists (the caller bounds the wait).
    pub async fn fetch_block(
        &self,
        channel_id: &str,
        number: u64,
        blocking: bool,
    ) -> Result<Block, OrdererError> {
        self.channel_manager(channel_id)?
            .fetch_block(number, blocking)
            .await
    }

    /// Current height of a channel.
    pub fn channel_height(&self, channel_id: &str) -> Result<u64, OrdererError> {
        Ok(self.channel_manager(channel_id)?.height())
    }

    pub fn is_system_admin(&self, member: &Member) -> bool {
        self.system_admins()
            .map(|admins| admins.contains(member))
            .unwrap_or(false)
    }

    // ---- internals shared with system.rs ----

    pub(crate) fn channel_dir(&self, channel_id: &str) -> PathBuf {
        self.cfg.path.join(channel_id)
    }

    pub(crate) fn open_manager(&self, channel_id: &str) -> Result<Arc<ChannelManager>, OrdererError> {
        ChannelManager::new(
            channel_id,
            self.channel_dir(channel_id),
            Arc::clone(&self.db),
            Arc::clone(&self.engine),
            self.cfg.submit_timeout,
        )
    }

    pub(crate) fn insert_manager(&self, manager: Arc<ChannelManager>) {
        self.managers
            .write()
            .insert(manager.channel_id().to_string(), manager);
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn sink(&self) -> Option<Arc<Coordinator>> {
        self.weak.upgrade()
    }

    pub(crate) fn cfg(&self) -> &ChainConfig {
        &self.cfg
    }

    pub(crate) fn db(&self) -> &Arc<dyn KeyValueStore> {
        &self.db
    }

    pub(crate) fn engine(&self) -> &Arc<dyn ConsensusEngine> {
        &self.engine
    }

    pub(crate) fn has_channel(&self, channel_id: &str) -> bool {
        self.managers.read().contains_key(channel_id)
    }

    pub(crate) fn channel_manager(
        &self,
        channel_id: &str,
    ) -> Result<Arc<ChannelManager>, OrdererError> {
        self.managers
            .read()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| OrdererError::UnknownChannel(channel_id.to_string()))
    }

    pub(crate) fn validate_new_channel(&self, payload: &ConfigPayload) -> Result<(), OrdererError> {
        let channel_id = &payload.channel_id;
        if is_system_channel(channel_id) || self.has_channel(channel_id) {
            return Err(OrdererError::DuplicateChannel(channel_id.clone()));
        }
        if !is_valid_channel_name(channel_id) {
            return Err(OrdererError::InvalidChannelName(channel_id.clone()));
        }
        let profile = &payload.profile;
        if profile.admins.is_empty() {
            return Err(OrdererError::InvalidProfile("admin list is empty".into()));
        }
        if !profile.public {
            if profile.members.is_empty() {
                return Err(OrdererError::InvalidProfile(
                    "private channel has no members".into(),
                ));
            }
            for admin in &profile.admins {
                if !profile.members.contains(admin) {
                    return Err(OrdererError::InvalidProfile(
                        "private channel admins must be members".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn authorize(&self, tx: &Tx) -> Result<(), OrdererError> {
        let member = member_of(tx)?;
        let profile = self.profile(&tx.data.channel_id)?;
        if !profile.is_member(&member) {
            return Err(OrdererError::NotAuthorized(tx.data.channel_id.clone()));
        }
        if let Some(contract) = SystemContract::of(tx.data.recipient) {
            if contract.is_membership_change() && !self.is_system_admin(&member) {
                return Err(OrdererError::NotSystemAdmin);
            }
        }
        Ok(())
    }

    pub(crate) fn profile(&self, channel_id: &str) -> Result<ChannelProfile, OrdererError> {
        match self.db.get(&keys::channel_profile(channel_id))? {
            Some(bytes) => Ok(codec::from_bytes(&bytes)?),
            None if is_system_channel(channel_id) => Ok(ChannelProfile {
                public: true,
                ..Default::default()
            }),
            None => Err(OrdererError::UnknownChannel(channel_id.to_string())),
        }
    }

    fn system_admins(&self) -> Result<Vec<Member>, OrdererError> {
        match self.db.get(&keys::system_admins())? {
            Some(bytes) => Ok(codec::from_bytes(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn registered_channels(&self) -> Result<Vec<String>, OrdererError> {
        let prefix = keys::channel_prefix();
        Ok(self
            .db
            .prefix_scan(&prefix)?
            .into_iter()
            .filter_map(|(key, _)| {
                String::from_utf8(key[prefix.len()..].to_vec()).ok()
            })
            .collect())
    }
}

/// The member identity of a signed transaction.
pub(crate) fn member_of(tx: &Tx) -> Result<Member, OrdererError> {
    let sig = tx.data.sig.as_ref().ok_or(OrdererError::InvalidSignature)?;
    Ok(Member::new(sig.pk.clone(), ""))
}
