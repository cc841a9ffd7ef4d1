//! # Peer Synchronization & Execution Pipeline
//!
//! Maintains a locally-executed, queryable replica of every channel this
//! peer is admitted to, without participating in ordering.
//!
//! ## Architecture
//!
//! - **Peer**: worker registry, discovery, query surface
//! - **SyncWorker**: per-channel fetch / verify / apply loop
//! - **Executor**: transaction execution against local contract state
//! - **client**: the orderer seam with an in-process adapter
//! - **vm**: the contract-VM seam with a deterministic built-in

pub mod client;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod executor;
pub mod vm;

mod manager;

pub use client::{InProcessClient, OrdererClient};
pub use config::PeerConfig;
pub use coordinator::Peer;
pub use errors::PeerError;
pub use executor::{derive_contract_address, Account, Executor};
pub use manager::ChannelState;
pub use vm::{ContractVm, HashVm, VmError};
