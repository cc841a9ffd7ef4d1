//! End-to-end: submit through the orderer, execute on peers, query back.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use std::sync::Arc;
    use std::time::Duration;
    use vellum_types::{Address, Keypair, Tx};

    #[tokio::test]
    async fn test_deploy_execute_and_query() {
        let orderer = start_orderer().await;
        let peer = start_peer(vec![client_of(&orderer)]);

        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();

        let deploy = Tx::new(
            "test",
            Address::ZERO,
            b"contract code".to_vec(),
            0,
            &orderer.admin,
        )
        .unwrap();
        orderer.coordinator.add_tx(deploy.clone()).await.unwrap();

        let status = peer
            .peer
            .get_tx_status("test", &deploy.id, true)
            .await
            .unwrap();
        assert_eq!(status.err, "");
        assert!(!status.contract_address.is_empty());
        assert_eq!(status.block_number, 1);

        // An identical deploy (same code, fresh nonce) lands on the same
        // derived address and is refused there.
        let duplicate = Tx::new(
            "test",
            Address::ZERO,
            b"contract code".to_vec(),
            0,
            &orderer.admin,
        )
        .unwrap();
        orderer.coordinator.add_tx(duplicate.clone()).await.unwrap();
        let status = peer
            .peer
            .get_tx_status("test", &duplicate.id, true)
            .await
            .unwrap();
        assert_eq!(status.err, "Duplicate address");
    }

    #[tokio::test]
    async fn test_wait_until_ready_blocks_for_inflight_tx() {
        let orderer = start_orderer().await;
        let peer = start_peer(vec![client_of(&orderer)]);
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();

        let tx = Tx::new("test", Address::ZERO, b"late".to_vec(), 0, &orderer.admin).unwrap();
        // Start the status query before the transaction is even submitted.
        let waiter = {
            let peer = Arc::clone(&peer.peer);
            let tx_id = tx.id.clone();
            tokio::spawn(async move { peer.get_tx_status("test", &tx_id, true).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        orderer.coordinator.add_tx(tx).await.unwrap();

        let status = waiter.await.unwrap().unwrap();
        assert_eq!(status.err, "");
    }

    #[tokio::test]
    async fn test_tx_history_per_identity() {
        let orderer = start_orderer().await;
        let peer = start_peer(vec![client_of(&orderer)]);
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();

        let submitter = Keypair::generate();
        let mut ids = Vec::new();
        for payload in [b"one".to_vec(), b"two".to_vec()] {
            let tx = Tx::new("test", Address::ZERO, payload, 0, &submitter).unwrap();
            ids.push(tx.id.clone());
            orderer.coordinator.add_tx(tx).await.unwrap();
        }
        peer.peer
            .get_tx_status("test", &ids[1], true)
            .await
            .unwrap();

        let address = Address::of_public_key(&submitter.public_key());
        let history = peer.peer.list_tx_history(&address).unwrap();
        assert_eq!(history.get("test").unwrap(), &ids);
    }

    #[tokio::test]
    async fn test_two_peers_execute_identically() {
        let orderer = start_orderer().await;
        let peer_a = start_peer(vec![client_of(&orderer)]);
        let peer_b = start_peer(vec![client_of(&orderer)]);

        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();
        let mut txs = Vec::new();
        for i in 0..5u8 {
            let tx = Tx::new("test", Address::ZERO, vec![i; 8], 0, &orderer.admin).unwrap();
            txs.push(tx.clone());
            orderer.coordinator.add_tx(tx).await.unwrap();
        }

        for tx in &txs {
            let a = peer_a.peer.get_tx_status("test", &tx.id, true).await.unwrap();
            let b = peer_b.peer.get_tx_status("test", &tx.id, true).await.unwrap();
            assert_eq!(a, b);
            assert_eq!(a.err, "");
        }
        assert_eq!(
            peer_a.peer.channel_height("test").unwrap(),
            peer_b.peer.channel_height("test").unwrap()
        );
    }

    #[tokio::test]
    async fn test_private_channel_invisible_to_outsider_peer() {
        let orderer = start_orderer().await;
        let insider = start_peer_as(
            vec![client_of(&orderer)],
            Arc::new(Keypair::generate()),
        );
        // The channel admits only the insider.
        let creator = insider.identity.clone();
        orderer
            .coordinator
            .add_channel(create_channel_tx("private", &creator, false))
            .await
            .unwrap();
        let outsider = start_peer(vec![client_of(&orderer)]);

        wait_until("insider to join the private channel", Duration::from_secs(5), || {
            let peer = Arc::clone(&insider.peer);
            async move { peer.channels().contains(&"private".to_string()) }
        })
        .await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!outsider.peer.channels().contains(&"private".to_string()));
    }
}
