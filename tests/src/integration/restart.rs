//! Crash, wipe and resume scenarios.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use vellum_consensus::{RaftEngine, SoloEngine};
    use vellum_peer::InProcessClient;
    use vellum_storage::{KeyValueStore, MemoryKvStore};
    use vellum_types::{Address, Member, Tx};

    #[tokio::test]
    async fn test_orderer_restart_resumes_chains() {
        let orderer = start_orderer().await;
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();
        let tx = Tx::new("test", Address::ZERO, b"before".to_vec(), 0, &orderer.admin).unwrap();
        orderer.coordinator.add_tx(tx).await.unwrap();
        let height_before = orderer.coordinator.channel_height("test").unwrap();

        orderer.coordinator.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(orderer.coordinator);

        let coordinator = start_orderer_in(
            &orderer.dir,
            Arc::clone(&orderer.db),
            Arc::new(SoloEngine::new()),
            Arc::clone(&orderer.admin),
        )
        .await;
        assert_eq!(
            coordinator.channel_height("test").unwrap(),
            height_before
        );

        // And the restarted orderer keeps ordering on the same chain.
        let tx = Tx::new("test", Address::ZERO, b"after".to_vec(), 0, &orderer.admin).unwrap();
        let status = coordinator.add_tx(tx).await.unwrap();
        assert_eq!(status.block_number, height_before);
    }

    #[tokio::test]
    async fn test_peer_restart_resumes_without_reexecution() {
        let orderer = start_orderer().await;
        let identity = Arc::new(vellum_types::Keypair::generate());
        let peer_db: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let peer = start_peer_with_db(
            vec![client_of(&orderer)],
            Arc::clone(&peer_db),
            Arc::clone(&identity),
        );

        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();
        let submitter = vellum_types::Keypair::generate();
        let tx = Tx::new("test", Address::ZERO, b"once".to_vec(), 0, &submitter).unwrap();
        orderer.coordinator.add_tx(tx.clone()).await.unwrap();
        peer.get_tx_status("test", &tx.id, true).await.unwrap();
        let applied_height = peer.channel_height("test").unwrap();
        peer.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A new pipeline over the same store resumes at the applied
        // height; the history index shows no double execution.
        let peer = start_peer_with_db(vec![client_of(&orderer)], peer_db, identity);
        assert_eq!(peer.channel_height("test").unwrap(), applied_height);

        let follow_up = Tx::new("test", Address::ZERO, b"twice".to_vec(), 0, &submitter).unwrap();
        orderer.coordinator.add_tx(follow_up.clone()).await.unwrap();
        peer.get_tx_status("test", &follow_up.id, true).await.unwrap();

        let address = Address::of_public_key(&submitter.public_key());
        let history = peer.list_tx_history(&address).unwrap();
        assert_eq!(history.get("test").unwrap(), &vec![tx.id, follow_up.id]);
    }

    /// A node that lost everything except the consensus log must rebuild
    /// an identical channel listing by replay.
    #[tokio::test]
    async fn test_raft_node_rebuilds_from_wal_after_wipe() {
        let engine_dir = TempDir::new().unwrap();
        let voters = HashMap::from([(1, "127.0.0.1:7001".to_string())]);

        let orderer = start_orderer_with(Arc::new(
            RaftEngine::new(1, engine_dir.path(), voters.clone()).unwrap(),
        ))
        .await;
        let client = Arc::new(vellum_types::Keypair::generate());
        for i in 0..8 {
            orderer
                .coordinator
                .add_channel(create_channel_tx(&format!("chan{i}"), &client, true))
                .await
                .unwrap();
        }
        let member = Member::new(client.public_key(), "");
        let original = orderer.coordinator.list_channels(&member, false).unwrap();
        assert_eq!(original.len(), 8);

        orderer.coordinator.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(orderer);

        // Wiped chain directory and index store, intact write-ahead log.
        let wiped_dir = TempDir::new().unwrap();
        let wiped_db: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let rebuilt = start_orderer_in(
            &wiped_dir,
            wiped_db,
            Arc::new(RaftEngine::new(1, engine_dir.path(), voters).unwrap()),
            Arc::new(vellum_types::Keypair::generate()),
        )
        .await;

        wait_until("wiped node to rebuild all channels", Duration::from_secs(10), || {
            let rebuilt = Arc::clone(&rebuilt);
            let member = member.clone();
            let original = original.clone();
            async move {
                rebuilt
                    .list_channels(&member, false)
                    .map(|infos| infos == original)
                    .unwrap_or(false)
            }
        })
        .await;

        // A fresh peer following the rebuilt node replicates everything.
        let peer = start_peer(vec![Arc::new(InProcessClient::new(Arc::clone(&rebuilt)))]);
        wait_until("peer to replicate rebuilt channels", Duration::from_secs(10), || {
            let peer = Arc::clone(&peer.peer);
            async move { peer.channels().len() == 10 }
        })
        .await;
    }
}
