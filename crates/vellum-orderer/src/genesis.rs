//! Genesis blocks of the system channels.
//!
//! `_config` block 0 carries the profiles of both system channels plus one
//! payload with an empty channel id recording the system-admin member set.
//! `_global` block 0 carries one height record per bootstrap channel.

use vellum_types::{
    codec, Block, ChannelProfile, CodecError, ConfigPayload, GlobalPayload, Member, Tx,
    CONFIG_CHANNEL_ID, GENESIS_PREV_HASH, GLOBAL_CHANNEL_ID,
};

const PAYLOAD_VERSION: i32 = 1;

fn public_profile() -> ChannelProfile {
    ChannelProfile {
        public: true,
        ..Default::default()
    }
}

/// Build the `_config` genesis block.
pub fn config_genesis(system_admins: &[Member]) -> Result<Block, CodecError> {
    let payloads = vec![
        ConfigPayload {
            channel_id: CONFIG_CHANNEL_ID.to_string(),
            profile: public_profile(),
            version: PAYLOAD_VERSION,
        },
        ConfigPayload {
            channel_id: GLOBAL_CHANNEL_ID.to_string(),
            profile: public_profile(),
            version: PAYLOAD_VERSION,
        },
        // The admin record: an empty channel id marks the system-admin set.
        ConfigPayload {
            channel_id: String::new(),
            profile: ChannelProfile {
                public: true,
                admins: system_admins.to_vec(),
                members: Vec::new(),
            },
            version: PAYLOAD_VERSION,
        },
    ];
    let mut txs = Vec::with_capacity(payloads.len());
    for (nonce, payload) in payloads.iter().enumerate() {
        let bytes = codec::to_bytes(payload)?;
        txs.push(Tx::unsigned(CONFIG_CHANNEL_ID, bytes, nonce as u64));
    }
    Ok(Block::new(CONFIG_CHANNEL_ID, 0, GENESIS_PREV_HASH, txs))
}

/// Build the `_global` genesis block from the bootstrap height records.
pub fn global_genesis(records: &[GlobalPayload]) -> Result<Block, CodecError> {
    let mut txs = Vec::with_capacity(records.len());
    for (nonce, record) in records.iter().enumerate() {
        let bytes = codec::to_bytes(record)?;
        txs.push(Tx::unsigned(GLOBAL_CHANNEL_ID, bytes, nonce as u64));
    }
    Ok(Block::new(GLOBAL_CHANNEL_ID, 0, GENESIS_PREV_HASH, txs))
}
