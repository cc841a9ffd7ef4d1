//! Shared fixtures for the integration scenarios.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vellum_consensus::{ConsensusEngine, SoloEngine};
use vellum_orderer::{ChainConfig, Coordinator};
use vellum_peer::{HashVm, InProcessClient, OrdererClient, Peer, PeerConfig};
use vellum_storage::{KeyValueStore, MemoryKvStore};
use vellum_types::{
    address::CREATE_CHANNEL_ADDRESS, codec, ChannelProfile, ConfigPayload, Keypair, Member, Tx,
    CONFIG_CHANNEL_ID,
};

/// An orderer with its backing stores kept alive.
pub struct OrdererFixture {
    pub dir: TempDir,
    pub db: Arc<dyn KeyValueStore>,
    pub coordinator: Arc<Coordinator>,
    pub admin: Arc<Keypair>,
}

pub fn chain_config(dir: &TempDir, admin: &Keypair) -> ChainConfig {
    let mut cfg = ChainConfig::new(dir.path());
    cfg.batch_size = 10;
    cfg.batch_timeout = Duration::from_millis(80);
    cfg.submit_timeout = Duration::from_secs(10);
    cfg.system_admins = vec![Member::new(admin.public_key(), "SystemAdmin")];
    cfg
}

/// Start a solo-backed orderer in a fresh directory.
pub async fn start_orderer() -> OrdererFixture {
    start_orderer_with(Arc::new(SoloEngine::new())).await
}

pub async fn start_orderer_with(engine: Arc<dyn ConsensusEngine>) -> OrdererFixture {
    let dir = TempDir::new().unwrap();
    let admin = Arc::new(Keypair::generate());
    let db: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let coordinator = Coordinator::new(chain_config(&dir, &admin), Arc::clone(&db), engine)
        .await
        .unwrap();
    coordinator.start().await.unwrap();
    OrdererFixture {
        dir,
        db,
        coordinator,
        admin,
    }
}

/// A peer with its own store, following the given orderer clients.
pub struct PeerFixture {
    pub db: Arc<dyn KeyValueStore>,
    pub peer: Arc<Peer>,
    pub identity: Arc<Keypair>,
}

pub fn peer_config() -> PeerConfig {
    PeerConfig {
        poll_interval: Duration::from_millis(50),
        fetch_timeout: Duration::from_millis(300),
        status_timeout: Duration::from_secs(5),
    }
}

pub fn start_peer(clients: Vec<Arc<dyn OrdererClient>>) -> PeerFixture {
    let identity = Arc::new(Keypair::generate());
    start_peer_as(clients, Arc::clone(&identity))
}

pub fn start_peer_as(clients: Vec<Arc<dyn OrdererClient>>, identity: Arc<Keypair>) -> PeerFixture {
    let db: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let peer = Peer::new(
        peer_config(),
        Member::new(identity.public_key(), ""),
        Arc::clone(&db),
        Arc::new(HashVm),
        clients,
    );
    peer.start().unwrap();
    PeerFixture { db, peer, identity }
}

/// Start an orderer over existing state (restart scenarios).
pub async fn start_orderer_in(
    dir: &TempDir,
    db: Arc<dyn KeyValueStore>,
    engine: Arc<dyn ConsensusEngine>,
    admin: Arc<Keypair>,
) -> Arc<Coordinator> {
    let coordinator = Coordinator::new(chain_config(dir, &admin), db, engine)
        .await
        .unwrap();
    coordinator.start().await.unwrap();
    coordinator
}

/// Start a peer over an existing store (restart scenarios).
pub fn start_peer_with_db(
    clients: Vec<Arc<dyn OrdererClient>>,
    db: Arc<dyn KeyValueStore>,
    identity: Arc<Keypair>,
) -> Arc<Peer> {
    let peer = Peer::new(
        peer_config(),
        Member::new(identity.public_key(), ""),
        db,
        Arc::new(HashVm),
        clients,
    );
    peer.start().unwrap();
    peer
}

pub fn client_of(orderer: &OrdererFixture) -> Arc<dyn OrdererClient> {
    Arc::new(InProcessClient::new(Arc::clone(&orderer.coordinator)))
}

/// A channel-creation transaction whose signer administers the channel.
pub fn create_channel_tx(channel_id: &str, creator: &Keypair, public: bool) -> Tx {
    let admins = vec![Member::new(creator.public_key(), "admin")];
    let profile = ChannelProfile {
        public,
        members: if public { Vec::new() } else { admins.clone() },
        admins,
    };
    let payload = ConfigPayload {
        channel_id: channel_id.to_string(),
        profile,
        version: 1,
    };
    Tx::new(
        CONFIG_CHANNEL_ID,
        CREATE_CHANNEL_ADDRESS,
        codec::to_bytes(&payload).unwrap(),
        0,
        creator,
    )
    .unwrap()
}

/// Poll `probe` until it returns true or the deadline passes.
pub async fn wait_until<F, Fut>(what: &str, deadline: Duration, mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if probe().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}
