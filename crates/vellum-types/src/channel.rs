//! Channel identifiers.

/// Registry of every channel's current block height, one block per event.
pub const GLOBAL_CHANNEL_ID: &str = "_global";

/// State machine for admin, membership and validator-set changes.
pub const CONFIG_CHANNEL_ID: &str = "_config";

/// Whether the id names one of the implicitly created system channels.
pub fn is_system_channel(channel_id: &str) -> bool {
    channel_id == GLOBAL_CHANNEL_ID || channel_id == CONFIG_CHANNEL_ID
}

/// Whether the id is a legal application channel name: lowercase
/// alphanumeric, 1 to 32 characters.
pub fn is_valid_channel_name(channel_id: &str) -> bool {
    !channel_id.is_empty()
        && channel_id.len() <= 32
        && channel_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}
