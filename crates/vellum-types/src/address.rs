//! 20-byte account addresses and the reserved system contracts.
//!
//! The address space is partitioned: ordinary addresses designate deployed
//! contracts or key-derived accounts, while a small block at the top of the
//! space routes to built-in ledger-management contracts. Dispatch is by
//! exact match, checked before any generic execution.

use crate::crypto;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// A 20-byte account address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address; the deploy recipient and genesis placeholder.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Build an address from raw bytes. Longer input is cropped from the
    /// left, shorter input is left-padded with zeros.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; ADDRESS_LENGTH];
        if bytes.len() >= ADDRESS_LENGTH {
            out.copy_from_slice(&bytes[bytes.len() - ADDRESS_LENGTH..]);
        } else {
            out[ADDRESS_LENGTH - bytes.len()..].copy_from_slice(bytes);
        }
        Address(out)
    }

    /// Parse a `0x`-prefixed (or bare) hex address.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != ADDRESS_LENGTH {
            return None;
        }
        Some(Self::from_slice(&bytes))
    }

    /// The account address of a public key: the low 20 bytes of its hash.
    pub fn of_public_key(public_key: &[u8]) -> Self {
        Self::from_slice(&crypto::hash(public_key))
    }

    /// The ledger account that holds a channel's own balance.
    pub fn of_channel(channel_id: &str) -> Self {
        Self::from_slice(channel_id.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

const fn reserved(last: u8) -> Address {
    let mut bytes = [0xffu8; ADDRESS_LENGTH];
    bytes[ADDRESS_LENGTH - 1] = last;
    Address(bytes)
}

/// Create a channel.
pub const CREATE_CHANNEL_ADDRESS: Address = reserved(0xff);
/// Update the validator set of a BFT channel.
pub const VALIDATOR_UPDATE_ADDRESS: Address = reserved(0xfe);
/// Add a node to a Raft channel's voter set.
pub const RAFT_ADD_NODE_ADDRESS: Address = reserved(0xfd);
/// Remove a node from a Raft channel's voter set.
pub const RAFT_REMOVE_NODE_ADDRESS: Address = reserved(0xfc);
/// Issue tokens to an account.
pub const TOKEN_ISSUE_ADDRESS: Address = reserved(0xfb);
/// Transfer tokens between accounts.
pub const TOKEN_TRANSFER_ADDRESS: Address = reserved(0xfa);
/// Exchange tokens against a channel account.
pub const TOKEN_EXCHANGE_ADDRESS: Address = reserved(0xf9);

/// The built-in contracts reachable through reserved recipient addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemContract {
    CreateChannel,
    ValidatorUpdate,
    RaftAddNode,
    RaftRemoveNode,
    TokenIssue,
    TokenTransfer,
    TokenExchange,
}

impl SystemContract {
    /// Resolve a recipient address to a system contract, if reserved.
    pub fn of(address: Address) -> Option<Self> {
        match address {
            CREATE_CHANNEL_ADDRESS => Some(Self::CreateChannel),
            VALIDATOR_UPDATE_ADDRESS => Some(Self::ValidatorUpdate),
            RAFT_ADD_NODE_ADDRESS => Some(Self::RaftAddNode),
            RAFT_REMOVE_NODE_ADDRESS => Some(Self::RaftRemoveNode),
            TOKEN_ISSUE_ADDRESS => Some(Self::TokenIssue),
            TOKEN_TRANSFER_ADDRESS => Some(Self::TokenTransfer),
            TOKEN_EXCHANGE_ADDRESS => Some(Self::TokenExchange),
            _ => None,
        }
    }

    /// The reserved address this contract answers on.
    pub fn address(self) -> Address {
        match self {
            Self::CreateChannel => CREATE_CHANNEL_ADDRESS,
            Self::ValidatorUpdate => VALIDATOR_UPDATE_ADDRESS,
            Self::RaftAddNode => RAFT_ADD_NODE_ADDRESS,
            Self::RaftRemoveNode => RAFT_REMOVE_NODE_ADDRESS,
            Self::TokenIssue => TOKEN_ISSUE_ADDRESS,
            Self::TokenTransfer => TOKEN_TRANSFER_ADDRESS,
            Self::TokenExchange => TOKEN_EXCHANGE_ADDRESS,
        }
    }

    /// Whether this contract mutates consensus membership and therefore
    /// requires the signer to hold the system-admin role.
    pub fn is_membership_change(self) -> bool {
        matches!(
            self,
            Self::ValidatorUpdate | Self::RaftAddNode | Self::RaftRemoveNode
        )
    }
}
