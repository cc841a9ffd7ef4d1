//! Key layout of the index store.
//!
//! Every key carries its channel or address in the prefix, so workers for
//! different channels write disjoint ranges of the same store.

use vellum_types::Address;

/// `tx:<channel>:<tx id>` -> TxStatus
pub fn tx_status(channel_id: &str, tx_id: &str) -> Vec<u8> {
    format!("tx:{channel_id}:{tx_id}").into_bytes()
}

/// `history:<address>:<channel>` -> Vec<tx id>
pub fn history(address: &Address, channel_id: &str) -> Vec<u8> {
    format!("history:{address}:{channel_id}").into_bytes()
}

/// Scan prefix over one identity's whole history.
pub fn history_prefix(address: &Address) -> Vec<u8> {
    format!("history:{address}:").into_bytes()
}

/// `acct:<address>` -> Account
pub fn account(address: &Address) -> Vec<u8> {
    format!("acct:{address}").into_bytes()
}

/// `channel:<id>` -> ChannelProfile
pub fn channel_profile(channel_id: &str) -> Vec<u8> {
    format!("channel:{channel_id}").into_bytes()
}

/// Scan prefix over the channel registry.
pub fn channel_prefix() -> Vec<u8> {
    b"channel:".to_vec()
}

/// `token:<channel>:<address>` -> u64 token balance
pub fn token(channel_id: &str, address: &Address) -> Vec<u8> {
    format!("token:{channel_id}:{address}").into_bytes()
}

/// `block:<channel>:<number>` -> Block (peer replica)
pub fn block(channel_id: &str, number: u64) -> Vec<u8> {
    format!("block:{channel_id}:{number:020}").into_bytes()
}

/// `applied:<channel>` -> the peer's last-applied height and tip hash.
pub fn applied(channel_id: &str) -> Vec<u8> {
    format!("applied:{channel_id}").into_bytes()
}

/// The system-admin member set recorded at bootstrap.
pub fn system_admins() -> Vec<u8> {
    b"system:admins".to_vec()
}

/// The identity latched as asset admin by the first token issue.
pub fn asset_admin() -> Vec<u8> {
    b"system:assetadmin".to_vec()
}
