//! Payload schemas of the system channels and built-in contracts.

use crate::address::Address;
use crate::crypto::Hash;
use crate::entities::ChannelProfile;
use serde::{Deserialize, Serialize};

/// Carried by create-channel transactions and replayed from `_config`
/// blocks to rebuild channel profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub channel_id: String,
    pub profile: ChannelProfile,
    pub version: i32,
}

/// One `_global` record: a channel reached the given height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPayload {
    pub channel_id: String,
    pub number: u64,
    pub hash: Hash,
}

/// Token issue/transfer/exchange target. An absent address routes the
/// amount to the channel's own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub address: Option<Address>,
    pub channel_id: String,
}

impl TokenPayload {
    /// The concrete recipient account of a token operation.
    pub fn recipient(&self) -> Address {
        self.address
            .unwrap_or_else(|| Address::of_channel(&self.channel_id))
    }
}

/// Raft voter-set change: the node to add to or remove from a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeChange {
    pub channel_id: String,
    pub node_id: u64,
    pub address: String,
}

/// BFT validator-set change; zero voting power removes the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub channel_id: String,
    pub public_key: Vec<u8>,
    pub voting_power: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_token_payload_defaults_to_channel_account() {
        let explicit = TokenPayload {
            address: Some(Address::from_slice(b"abc")),
            channel_id: "test".into(),
        };
        assert_eq!(explicit.recipient(), Address::from_slice(b"abc"));

        let implicit = TokenPayload {
            address: None,
            channel_id: "test".into(),
        };
        assert_eq!(implicit.recipient(), Address::of_channel("test"));
    }

    #[test]
    fn test_config_payload_roundtrip() {
        let payload = ConfigPayload {
            channel_id: "orders".into(),
            profile: ChannelProfile {
                public: true,
                ..Default::default()
            },
            version: 1,
        };
        let bytes = codec::to_bytes(&payload).unwrap();
        let back: ConfigPayload = codec::from_bytes(&bytes).unwrap();
        assert_eq!(payload, back);
    }
}
