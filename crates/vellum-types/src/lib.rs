//! # Core Domain Types
//!
//! Defines the entities shared by every Vellum subsystem.
//!
//! ## Clusters
//!
//! - **Chain**: [`Block`], [`BlockHeader`], [`Tx`], [`TxStatus`]
//! - **Identity & Access**: [`Member`], [`ChannelProfile`], [`Address`]
//! - **System channels**: [`ConfigPayload`], [`GlobalPayload`] and the
//!   reserved contract addresses in [`address`]
//! - **Plumbing**: canonical [`codec`], [`crypto`] helpers and the keyed
//!   [`event::Hub`] used for synchronous-commit waits

pub mod address;
pub mod channel;
pub mod codec;
pub mod crypto;
pub mod entities;
pub mod event;
pub mod payloads;

pub use address::{Address, SystemContract, ADDRESS_LENGTH};
pub use channel::{is_system_channel, is_valid_channel_name, CONFIG_CHANNEL_ID, GLOBAL_CHANNEL_ID};
pub use codec::CodecError;
pub use crypto::{hash, CryptoError, Hash, Keypair, HASH_LENGTH};
pub use entities::{
    Block, BlockHeader, ChannelInfo, ChannelProfile, Identity, Member, Tx, TxData, TxSig, TxStatus,
    GENESIS_PREV_HASH,
};
pub use payloads::{ConfigPayload, GlobalPayload, NodeChange, TokenPayload, ValidatorUpdate};
