//! Coordinator tests over a solo engine and in-memory index store.

use crate::config::ChainConfig;
use crate::coordinator::Coordinator;
use crate::errors::OrdererError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vellum_consensus::SoloEngine;
use vellum_storage::{KeyValueStore, MemoryKvStore};
use vellum_types::{
    address::{CREATE_CHANNEL_ADDRESS, RAFT_ADD_NODE_ADDRESS},
    codec, Address, ChannelProfile, ConfigPayload, Identity, Keypair, Member, NodeChange, Tx,
    CONFIG_CHANNEL_ID, GLOBAL_CHANNEL_ID,
};

struct Fixture {
    dir: TempDir,
    db: Arc<dyn KeyValueStore>,
    admin: Keypair,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            db: Arc::new(MemoryKvStore::new()),
            admin: Keypair::generate(),
        }
    }

    fn chain_config(&self) -> ChainConfig {
        let mut cfg = ChainConfig::new(self.dir.path());
        cfg.batch_timeout = Duration::from_millis(50);
        cfg.submit_timeout = Duration::from_secs(5);
        cfg.system_admins = vec![Member::new(self.admin.public_key(), "SystemAdmin")];
        cfg
    }

    async fn coordinator(&self) -> Arc<Coordinator> {
        let coord = Coordinator::new(
            self.chain_config(),
            Arc::clone(&self.db),
            Arc::new(SoloEngine::new()),
        )
        .await
        .unwrap();
        coord.start().await.unwrap();
        coord
    }
}

fn create_channel_tx(channel_id: &str, keypair: &Keypair, public: bool) -> Tx {
    let mut profile = ChannelProfile {
        public,
        admins: vec![Member::new(keypair.public_key(), "admin")],
        members: Vec::new(),
    };
    if !public {
        profile.members = profile.admins.clone();
    }
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
        keypair,
    )
    .unwrap()
}

#[tokio::test]
async fn test_bootstrap_creates_system_channels() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    assert_eq!(coord.channel_height(CONFIG_CHANNEL_ID).unwrap(), 1);
    assert_eq!(coord.channel_height(GLOBAL_CHANNEL_ID).unwrap(), 1);

    let global_genesis = coord.fetch_block(GLOBAL_CHANNEL_ID, 0, false).await.unwrap();
    assert!(global_genesis.is_genesis());
    assert_eq!(global_genesis.transactions.len(), 1);
}

#[tokio::test]
async fn test_create_channel_and_submit() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;

    let info = coord
        .add_channel(create_channel_tx("test", &fixture.admin, true))
        .await
        .unwrap();
    assert_eq!(info.channel_id, "test");
    assert_eq!(info.identity, Identity::Admin);
    assert_eq!(info.block_height, 1);

    let tx = Tx::new("test", Address::ZERO, b"deploy".to_vec(), 0, &fixture.admin).unwrap();
    let status = coord.add_tx(tx).await.unwrap();
    assert_eq!(status.block_number, 1);
    assert_eq!(status.block_index, 0);

    // The chain links.
    let genesis = coord.fetch_block("test", 0, false).await.unwrap();
    let block = coord.fetch_block("test", 1, false).await.unwrap();
    assert_eq!(block.header.prev_block, genesis.hash());
}

#[tokio::test]
async fn test_duplicate_channel_rejected() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    coord
        .add_channel(create_channel_tx("test", &fixture.admin, true))
        .await
        .unwrap();
    assert!(matches!(
        coord
            .add_channel(create_channel_tx("test", &fixture.admin, true))
            .await,
        Err(OrdererError::DuplicateChannel(_))
    ));
}

#[tokio::test]
async fn test_concurrent_creators_one_winner() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let coord = Arc::clone(&coord);
            let tx = create_channel_tx("race", &Keypair::generate(), true);
            tokio::spawn(async move { coord.add_channel(tx).await })
        })
        .collect();
    let mut created = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(OrdererError::DuplicateChannel(_)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(duplicates, 3);
}

#[tokio::test]
async fn test_invalid_signature_rejected_before_batching() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    coord
        .add_channel(create_channel_tx("test", &fixture.admin, true))
        .await
        .unwrap();

    let mut tx = Tx::new("test", Address::ZERO, b"x".to_vec(), 0, &fixture.admin).unwrap();
    if let Some(sig) = tx.data.sig.as_mut() {
        sig.sig[3] ^= 0x40;
    }
    assert!(matches!(
        coord.add_tx(tx).await,
        Err(OrdererError::InvalidSignature)
    ));
    // Nothing was ordered.
    assert_eq!(coord.channel_height("test").unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_channel_rejected() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    let tx = Tx::new("ghost", Address::ZERO, b"x".to_vec(), 0, &fixture.admin).unwrap();
    assert!(matches!(
        coord.add_tx(tx).await,
        Err(OrdererError::UnknownChannel(_))
    ));
}

#[tokio::test]
async fn test_private_channel_authorization() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    coord
        .add_channel(create_channel_tx("private", &fixture.admin, false))
        .await
        .unwrap();

    let outsider = Keypair::generate();
    let tx = Tx::new("private", Address::ZERO, b"x".to_vec(), 0, &outsider).unwrap();
    assert!(matches!(
        coord.add_tx(tx).await,
        Err(OrdererError::NotAuthorized(_))
    ));

    let tx = Tx::new("private", Address::ZERO, b"x".to_vec(), 0, &fixture.admin).unwrap();
    coord.add_tx(tx).await.unwrap();
}

#[tokio::test]
async fn test_membership_tx_requires_system_admin() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    coord
        .add_channel(create_channel_tx("test", &fixture.admin, true))
        .await
        .unwrap();

    let intruder = Keypair::generate();
    let change = NodeChange {
        channel_id: "test".into(),
        node_id: 2,
        address: "127.0.0.1:7002".into(),
    };
    let tx = Tx::new(
        "test",
        RAFT_ADD_NODE_ADDRESS,
        codec::to_bytes(&change).unwrap(),
        0,
        &intruder,
    )
    .unwrap();
    assert!(matches!(
        coord.add_tx(tx).await,
        Err(OrdererError::NotSystemAdmin)
    ));
}

#[tokio::test]
async fn test_invalid_profile_rejected() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    let payload = ConfigPayload {
        channel_id: "noadmins".into(),
        profile: ChannelProfile {
            public: true,
            ..Default::default()
        },
        version: 1,
    };
    let tx = Tx::new(
        CONFIG_CHANNEL_ID,
        CREATE_CHANNEL_ADDRESS,
        codec::to_bytes(&payload).unwrap(),
        0,
        &fixture.admin,
    )
    .unwrap();
    assert!(matches!(
        coord.add_channel(tx).await,
        Err(OrdererError::InvalidProfile(_))
    ));
}

#[tokio::test]
async fn test_illegal_channel_name_rejected() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    assert!(matches!(
        coord
            .add_channel(create_channel_tx("Not-Legal!", &fixture.admin, true))
            .await,
        Err(OrdererError::InvalidChannelName(_))
    ));
}

#[tokio::test]
async fn test_batch_size_bound() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    coord
        .add_channel(create_channel_tx("test", &fixture.admin, true))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..25u8)
        .map(|i| {
            let coord = Arc::clone(&coord);
            let tx = Tx::new("test", Address::ZERO, vec![i], 0, &fixture.admin).unwrap();
            tokio::spawn(async move { coord.add_tx(tx).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let height = coord.channel_height("test").unwrap();
    let mut total = 0;
    for number in 1..height {
        let block = coord.fetch_block("test", number, false).await.unwrap();
        assert!(block.transactions.len() <= 10);
        total += block.transactions.len();
    }
    assert_eq!(total, 25);
}

#[tokio::test]
async fn test_restart_reloads_channels() {
    let fixture = Fixture::new();
    {
        let coord = fixture.coordinator().await;
        coord
            .add_channel(create_channel_tx("persisted", &fixture.admin, true))
            .await
            .unwrap();
        let tx =
            Tx::new("persisted", Address::ZERO, b"data".to_vec(), 0, &fixture.admin).unwrap();
        coord.add_tx(tx).await.unwrap();
        coord.stop().await.unwrap();
        // Let the commit loops observe the stop and release the log locks.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let coord = fixture.coordinator().await;
    assert_eq!(coord.channel_height("persisted").unwrap(), 2);
    let member = Member::new(fixture.admin.public_key(), "");
    let infos = coord.list_channels(&member, false).unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].channel_id, "persisted");
    assert_eq!(infos[0].block_height, 2);
}

#[tokio::test]
async fn test_fetch_block_blocking_waits_for_commit() {
    let fixture = Fixture::new();
    let coord = fixture.coordinator().await;
    coord
        .add_channel(create_channel_tx("test", &fixture.admin, true))
        .await
        .unwrap();

    let waiter = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.fetch_block("test", 1, true).await })
    };
    let tx = Tx::new("test", Address::ZERO, b"later".to_vec(), 0, &fixture.admin).unwrap();
    coord.add_tx(tx.clone()).await.unwrap();
    let block = waiter.await.unwrap().unwrap();
    assert_eq!(block.transactions[0].id, tx.id);
}
