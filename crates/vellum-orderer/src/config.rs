//! Coordinator configuration.

use std::path::PathBuf;
use std::time::Duration;
use vellum_consensus::ChannelConfig;
use vellum_types::Member;

/// Validated configuration handed to the coordinator by the node wiring.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Root directory; each channel's block log lives in a subdirectory.
    pub path: PathBuf,
    /// Cut a block once this many transactions are pending.
    pub batch_size: usize,
    /// Cut a smaller block this long after the first pending transaction.
    pub batch_timeout: Duration,
    /// Upper bound on a synchronous `add_tx` wait.
    pub submit_timeout: Duration,
    /// Members holding the system-admin role at bootstrap.
    pub system_admins: Vec<Member>,
}

impl ChainConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_size: 10,
            batch_timeout: Duration::from_millis(1000),
            submit_timeout: Duration::from_secs(30),
            system_admins: Vec::new(),
        }
    }

    /// Batching parameters of an application channel.
    pub fn user_channel(&self) -> ChannelConfig {
        ChannelConfig {
            batch_size: self.batch_size,
            batch_timeout: self.batch_timeout,
            start_number: 0,
        }
    }

    /// Batching parameters of the system channels: same size bound,
    /// tighter timeout, since their traffic is sparse but latency-gating.
    pub fn system_channel(&self) -> ChannelConfig {
        ChannelConfig {
            batch_size: self.batch_size,
            batch_timeout: self.batch_timeout.min(Duration::from_millis(100)),
            start_number: 0,
        }
    }
}
