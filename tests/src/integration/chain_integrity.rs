//! Chain linkage, gaplessness and batching bounds across channels.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use std::sync::Arc;
    use vellum_types::{Address, Tx, CONFIG_CHANNEL_ID, GENESIS_PREV_HASH, GLOBAL_CHANNEL_ID};

    /// Every channel's chain must link block to block, gapless from 0.
    async fn assert_chain_integrity(
        coordinator: &vellum_orderer::Coordinator,
        channel_id: &str,
    ) {
        let height = coordinator.channel_height(channel_id).unwrap();
        assert!(height > 0, "channel {channel_id} has no blocks");
        let mut prev_hash = GENESIS_PREV_HASH;
        for number in 0..height {
            let block = coordinator
                .fetch_block(channel_id, number, false)
                .await
                .unwrap();
            assert_eq!(block.header.number, number);
            assert_eq!(
                block.header.prev_block, prev_hash,
                "channel {channel_id} block {number} broke the chain"
            );
            prev_hash = block.hash();
        }
    }

    #[tokio::test]
    async fn test_all_channels_link_and_are_gapless() {
        let orderer = start_orderer().await;
        for name in ["alpha", "beta"] {
            orderer
                .coordinator
                .add_channel(create_channel_tx(name, &orderer.admin, true))
                .await
                .unwrap();
        }
        let mut submissions = Vec::new();
        for i in 0..12u8 {
            let channel = if i % 2 == 0 { "alpha" } else { "beta" };
            let tx = Tx::new(channel, Address::ZERO, vec![i], 0, &orderer.admin).unwrap();
            let coordinator = Arc::clone(&orderer.coordinator);
            submissions.push(tokio::spawn(async move { coordinator.add_tx(tx).await }));
        }
        for submission in submissions {
            submission.await.unwrap().unwrap();
        }

        for channel in ["alpha", "beta", CONFIG_CHANNEL_ID, GLOBAL_CHANNEL_ID] {
            assert_chain_integrity(&orderer.coordinator, channel).await;
        }
    }

    #[tokio::test]
    async fn test_no_block_exceeds_batch_size() {
        let orderer = start_orderer().await;
        orderer
            .coordinator
            .add_channel(create_channel_tx("test", &orderer.admin, true))
            .await
            .unwrap();

        let submissions: Vec<_> = (0..40u8)
            .map(|i| {
                let coordinator = Arc::clone(&orderer.coordinator);
                let tx = Tx::new("test", Address::ZERO, vec![i], 0, &orderer.admin).unwrap();
                tokio::spawn(async move { coordinator.add_tx(tx).await })
            })
            .collect();
        for submission in submissions {
            submission.await.unwrap().unwrap();
        }

        let height = orderer.coordinator.channel_height("test").unwrap();
        let mut total = 0;
        for number in 1..height {
            let block = orderer
                .coordinator
                .fetch_block("test", number, false)
                .await
                .unwrap();
            assert!(block.transactions.len() <= 10);
            total += block.transactions.len();
        }
        assert_eq!(total, 40);
    }

    #[tokio::test]
    async fn test_global_records_every_created_channel() {
        let orderer = start_orderer().await;
        for name in ["one", "two", "three"] {
            orderer
                .coordinator
                .add_channel(create_channel_tx(name, &orderer.admin, true))
                .await
                .unwrap();
        }
        wait_until("creation records on _global", std::time::Duration::from_secs(5), || {
            let coordinator = Arc::clone(&orderer.coordinator);
            async move {
                let height = coordinator.channel_height(GLOBAL_CHANNEL_ID).unwrap();
                let mut recorded = Vec::new();
                for number in 0..height {
                    let block = coordinator
                        .fetch_block(GLOBAL_CHANNEL_ID, number, false)
                        .await
                        .unwrap();
                    for tx in &block.transactions {
                        let record: vellum_types::GlobalPayload =
                            vellum_types::codec::from_bytes(&tx.data.payload).unwrap();
                        recorded.push(record.channel_id);
                    }
                }
                ["one", "two", "three"]
                    .iter()
                    .all(|name| recorded.iter().any(|r| r == name))
            }
        })
        .await;
    }
}
