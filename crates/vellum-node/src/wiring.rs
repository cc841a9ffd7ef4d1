//! Subsystem wiring: config in, running node out.

use crate::config::{Backend, NodeConfig, Role};
use anyhow::{bail, Context};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vellum_consensus::{BftEngine, ConsensusEngine, RaftEngine, SoloEngine};
use vellum_orderer::{ChainConfig, Coordinator};
use vellum_peer::{HashVm, InProcessClient, OrdererClient, Peer, PeerConfig};
use vellum_storage::{KeyValueStore, RocksKvStore};
use vellum_types::{Keypair, Member};

/// A wired node: the orderer side, the peer side, or both.
pub struct Node {
    pub coordinator: Option<Arc<Coordinator>>,
    pub peer: Option<Arc<Peer>>,
}

impl Node {
    pub async fn stop(&self) {
        if let Some(peer) = &self.peer {
            peer.stop();
        }
        if let Some(coordinator) = &self.coordinator {
            if let Err(err) = coordinator.stop().await {
                warn!(%err, "orderer shutdown reported an error");
            }
        }
    }
}

fn build_engine(config: &NodeConfig) -> anyhow::Result<Arc<dyn ConsensusEngine>> {
    let consensus = &config.orderer.consensus;
    let dir = config.data_dir.join("consensus");
    Ok(match consensus.backend {
        Backend::Solo => Arc::new(SoloEngine::new()),
        Backend::Raft => Arc::new(
            RaftEngine::new(consensus.node_id, dir, consensus.voters.clone())
                .context("building raft engine")?,
        ),
        Backend::Bft => {
            let mut validators = HashMap::new();
            for entry in &consensus.validators {
                let key = hex::decode(&entry.public_key)
                    .context("validator public key is not hex")?;
                validators.insert(key, entry.power);
            }
            Arc::new(BftEngine::new(dir, validators).context("building bft engine")?)
        }
    })
}

fn system_admins(config: &NodeConfig) -> anyhow::Result<Vec<Member>> {
    config
        .orderer
        .system_admins
        .iter()
        .map(|hex_key| {
            let key = hex::decode(hex_key).context("system admin key is not hex")?;
            Ok(Member::new(key, "SystemAdmin"))
        })
        .collect()
}

/// Load the configured signing key, or generate an ephemeral one.
pub fn load_keypair(config: &NodeConfig) -> anyhow::Result<Keypair> {
    match &config.key_seed {
        Some(seed_hex) => {
            let seed = hex::decode(seed_hex).context("key seed is not hex")?;
            Ok(Keypair::from_secret_bytes(&seed)
                .map_err(|err| anyhow::anyhow!("invalid key seed: {err}"))?)
        }
        None => {
            warn!("no key seed configured, generating an ephemeral identity");
            Ok(Keypair::generate())
        }
    }
}

/// Build and start the subsystems selected by the configured role.
pub async fn build(config: &NodeConfig) -> anyhow::Result<Node> {
    let keypair = load_keypair(config)?;
    let identity = Member::new(keypair.public_key(), "");

    let coordinator = match config.role {
        Role::Orderer | Role::Both => {
            let engine = build_engine(config)?;
            let db: Arc<dyn KeyValueStore> = Arc::new(
                RocksKvStore::open(config.data_dir.join("index"))
                    .context("opening orderer index store")?,
            );
            let mut chain_cfg = ChainConfig::new(config.data_dir.join("chain"));
            chain_cfg.batch_size = config.orderer.batch_size;
            chain_cfg.batch_timeout = config.batch_timeout();
            chain_cfg.system_admins = system_admins(config)?;
            let coordinator = Coordinator::new(chain_cfg, db, engine)
                .await
                .context("bootstrapping coordinator")?;
            coordinator.start().await.context("starting coordinator")?;
            info!("orderer started");
            Some(coordinator)
        }
        Role::Peer => None,
    };

    let peer = match config.role {
        Role::Peer | Role::Both => {
            let Some(coordinator) = coordinator.clone() else {
                // The networked orderer client is a transport adapter
                // provided by the deployment; without one, a peer can only
                // follow an orderer in the same process.
                bail!("peer role requires a co-located orderer");
            };
            let db: Arc<dyn KeyValueStore> = Arc::new(
                RocksKvStore::open(config.data_dir.join("peer-index"))
                    .context("opening peer index store")?,
            );
            let clients: Vec<Arc<dyn OrdererClient>> =
                vec![Arc::new(InProcessClient::new(coordinator))];
            let peer_cfg = PeerConfig {
                poll_interval: Duration::from_millis(config.peer.poll_interval_ms),
                fetch_timeout: Duration::from_millis(config.peer.fetch_timeout_ms),
                status_timeout: Duration::from_millis(config.peer.status_timeout_ms),
            };
            let peer = Peer::new(peer_cfg, identity, db, Arc::new(HashVm), clients);
            peer.start().context("starting peer")?;
            info!("peer started");
            Some(peer)
        }
        Role::Orderer => None,
    };

    Ok(Node { coordinator, peer })
}

/// Run until interrupted.
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let node = build(&config).await?;
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    node.stop().await;
    Ok(())
}
