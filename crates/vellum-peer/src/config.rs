//! Peer pipeline configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Backoff between retries when every orderer failed.
    pub poll_interval: Duration,
    /// Bound on one blocking block fetch; hitting it means caught up.
    pub fetch_timeout: Duration,
    /// Bound on a `wait_until_ready` status query.
    pub status_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(5),
            status_timeout: Duration::from_secs(10),
        }
    }
}
