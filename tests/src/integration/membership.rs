//! Conf-change transactions applied through ordered `_config` commits.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vellum_consensus::{BftEngine, RaftEngine};
    use vellum_types::{
        address::{RAFT_ADD_NODE_ADDRESS, RAFT_REMOVE_NODE_ADDRESS, VALIDATOR_UPDATE_ADDRESS},
        codec, Keypair, NodeChange, Tx, ValidatorUpdate, CONFIG_CHANNEL_ID,
    };

    fn raft_seed() -> HashMap<u64, String> {
        HashMap::from([(1, "127.0.0.1:7001".to_string())])
    }

    #[tokio::test]
    async fn test_raft_conf_change_applied_after_commit() {
        let engine_dir = TempDir::new().unwrap();
        let engine = Arc::new(RaftEngine::new(1, engine_dir.path(), raft_seed()).unwrap());
        let orderer = start_orderer_with(engine.clone()).await;
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();

        let add = NodeChange {
            channel_id: "test".into(),
            node_id: 2,
            address: "127.0.0.1:7002".into(),
        };
        let tx = Tx::new(
            CONFIG_CHANNEL_ID,
            RAFT_ADD_NODE_ADDRESS,
            codec::to_bytes(&add).unwrap(),
            0,
            &orderer.admin,
        )
        .unwrap();
        orderer.coordinator.add_tx(tx).await.unwrap();
        assert_eq!(engine.voters("test").unwrap().len(), 2);

        let remove = NodeChange {
            channel_id: "test".into(),
            node_id: 1,
            address: String::new(),
        };
        let tx = Tx::new(
            CONFIG_CHANNEL_ID,
            RAFT_REMOVE_NODE_ADDRESS,
            codec::to_bytes(&remove).unwrap(),
            0,
            &orderer.admin,
        )
        .unwrap();
        orderer.coordinator.add_tx(tx).await.unwrap();
        let voters = engine.voters("test").unwrap();
        assert_eq!(voters.len(), 1);
        assert!(voters.contains_key(&2));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_change_membership() {
        let engine_dir = TempDir::new().unwrap();
        let engine = Arc::new(RaftEngine::new(1, engine_dir.path(), raft_seed()).unwrap());
        let orderer = start_orderer_with(engine.clone()).await;
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();

        let change = NodeChange {
            channel_id: "test".into(),
            node_id: 9,
            address: "10.0.0.9:7009".into(),
        };
        let intruder = Keypair::generate();
        let tx = Tx::new(
            CONFIG_CHANNEL_ID,
            RAFT_ADD_NODE_ADDRESS,
            codec::to_bytes(&change).unwrap(),
            0,
            &intruder,
        )
        .unwrap();
        assert!(orderer.coordinator.add_tx(tx).await.is_err());
        assert_eq!(engine.voters("test").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bft_validator_update_through_config() {
        let engine_dir = TempDir::new().unwrap();
        let validators: HashMap<Vec<u8>, u64> = (0u8..4).map(|i| (vec![i], 1)).collect();
        let engine = Arc::new(BftEngine::new(engine_dir.path(), validators).unwrap());
        let orderer = start_orderer_with(engine.clone()).await;
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();

        let update = ValidatorUpdate {
            channel_id: "test".into(),
            public_key: vec![7; 32],
            voting_power: 2,
        };
        let tx = Tx::new(
            CONFIG_CHANNEL_ID,
            VALIDATOR_UPDATE_ADDRESS,
            codec::to_bytes(&update).unwrap(),
            0,
            &orderer.admin,
        )
        .unwrap();
        orderer.coordinator.add_tx(tx).await.unwrap();

        // Effective at the next height: cut one more block.
        let filler = Tx::new(
            "test",
            vellum_types::Address::from_slice(b"some contract"),
            b"call".to_vec(),
            0,
            &orderer.admin,
        )
        .unwrap();
        orderer.coordinator.add_tx(filler).await.unwrap();

        let validators = engine.validators("test").unwrap();
        assert_eq!(validators.get(&vec![7u8; 32]), Some(&2));
        assert_eq!(engine.quorum("test").unwrap(), 2 * 6 / 3 + 1);
    }
}
