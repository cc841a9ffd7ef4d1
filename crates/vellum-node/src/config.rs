//! Node configuration: a validated YAML file.
//!
//! Transport endpoints, TLS and key generation are deployment concerns;
//! this file only carries what the coordinator and peer constructors need.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {0}: {1}")]
    Unreadable(PathBuf, std::io::Error),

    #[error("cannot parse config file: {0}")]
    Unparseable(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Orderer,
    Peer,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Solo,
    Raft,
    Bft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorEntry {
    /// Hex-encoded public key.
    pub public_key: String,
    pub power: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSection {
    pub backend: Backend,
    #[serde(default = "default_node_id")]
    pub node_id: u64,
    /// Raft voter seed: node id -> address.
    #[serde(default)]
    pub voters: HashMap<u64, String>,
    /// BFT validator seed.
    #[serde(default)]
    pub validators: Vec<ValidatorEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdererSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    pub consensus: ConsensusSection,
    /// Hex-encoded public keys holding the system-admin role.
    #[serde(default)]
    pub system_admins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            status_timeout_ms: default_status_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub role: Role,
    pub data_dir: PathBuf,
    /// Hex-encoded 32-byte signing seed; an ephemeral key is generated
    /// when absent.
    #[serde(default)]
    pub key_seed: Option<String>,
    pub orderer: OrdererSection,
    #[serde(default)]
    pub peer: PeerSection,
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Unreadable(path.to_path_buf(), err))?;
        let config: NodeConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orderer.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.orderer.batch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "batch_timeout_ms must be positive".into(),
            ));
        }
        match self.orderer.consensus.backend {
            Backend::Raft if self.orderer.consensus.voters.is_empty() => Err(
                ConfigError::Invalid("raft backend needs at least one voter".into()),
            ),
            Backend::Bft if self.orderer.consensus.validators.is_empty() => Err(
                ConfigError::Invalid("bft backend needs at least one validator".into()),
            ),
            _ => Ok(()),
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.orderer.batch_timeout_ms)
    }
}

fn default_node_id() -> u64 {
    1
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_status_timeout_ms() -> u64 {
    10_000
}
