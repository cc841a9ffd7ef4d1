//! Peers must keep syncing while at least one orderer replica answers.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use vellum_peer::{OrdererClient, PeerError};
    use vellum_types::{Address, Block, Tx};

    /// A replica that dropped off the network.
    struct DeadClient;

    #[async_trait]
    impl OrdererClient for DeadClient {
        async fn fetch_block(
            &self,
            _channel_id: &str,
            _number: u64,
            _blocking: bool,
        ) -> Result<Block, PeerError> {
            Err(PeerError::Remote("connection refused".into()))
        }

        async fn channel_height(&self, _channel_id: &str) -> Result<u64, PeerError> {
            Err(PeerError::Remote("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_sync_survives_dead_orderer() {
        let orderer = start_orderer().await;
        let peer = start_peer(vec![
            Arc::new(DeadClient),
            client_of(&orderer),
            Arc::new(DeadClient),
        ]);

        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();
        let tx = Tx::new("test", Address::ZERO, b"payload".to_vec(), 0, &orderer.admin).unwrap();
        orderer.coordinator.add_tx(tx.clone()).await.unwrap();

        let status = peer.peer.get_tx_status("test", &tx.id, true).await.unwrap();
        assert_eq!(status.err, "");
    }

    #[tokio::test]
    async fn test_all_orderers_dead_then_recovering() {
        let orderer = start_orderer().await;
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();
        let tx = Tx::new("test", Address::ZERO, b"payload".to_vec(), 0, &orderer.admin).unwrap();
        orderer.coordinator.add_tx(tx.clone()).await.unwrap();

        // The peer starts with only dead replicas; nothing arrives.
        let stranded = start_peer(vec![Arc::new(DeadClient), Arc::new(DeadClient)]);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(stranded.peer.channel_height("test").unwrap(), 0);
        stranded.peer.stop();

        // A peer with one live replica catches up fully.
        let recovered = start_peer(vec![Arc::new(DeadClient), client_of(&orderer)]);
        let status = recovered
            .peer
            .get_tx_status("test", &tx.id, true)
            .await
            .unwrap();
        assert_eq!(status.err, "");
        wait_until("recovered peer catch-up", Duration::from_secs(5), || {
            let peer = Arc::clone(&recovered.peer);
            let want = orderer.coordinator.channel_height("test").unwrap();
            async move { peer.channel_height("test").unwrap() == want }
        })
        .await;
    }
}
