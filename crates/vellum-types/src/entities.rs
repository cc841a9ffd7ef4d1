//! Chain entities: transactions, blocks, members and channel profiles.
//!
//! Hashing rules live here and nowhere else. A transaction's signing hash
//! covers everything except the signature; its id is the hex of the hash
//! including the signature. Wall-clock times are carried for display but
//! excluded from every digest, since clock skew must never split consensus.

use crate::address::Address;
use crate::crypto::{self, CryptoError, Hash};
use crate::Keypair;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The well-known previous hash of every genesis block.
pub const GENESIS_PREV_HASH: Hash = [0u8; crypto::HASH_LENGTH];

const ENTITY_VERSION: i32 = 1;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Append a length-prefixed field to a digest buffer.
fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// A signature together with the public key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSig {
    pub pk: Vec<u8>,
    pub sig: Vec<u8>,
}

/// The signed body of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    /// Target channel.
    pub channel_id: String,
    /// Random anti-collision nonce; two otherwise-identical submissions
    /// get distinct ids.
    pub nonce: u64,
    /// Recipient address; zero deploys a contract, reserved addresses
    /// route to system contracts.
    pub recipient: Address,
    /// Opaque contract payload.
    pub payload: Vec<u8>,
    /// Token amount moved by the transaction.
    pub value: u64,
    pub version: i32,
    /// Absent only on genesis transactions.
    pub sig: Option<TxSig>,
}

impl TxData {
    fn digest(&self, with_sig: bool) -> Hash {
        let mut buf = Vec::with_capacity(64 + self.payload.len());
        put_bytes(&mut buf, self.channel_id.as_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
        put_bytes(&mut buf, &self.payload);
        buf.extend_from_slice(&self.value.to_be_bytes());
        buf.extend_from_slice(&self.version.to_be_bytes());
        if with_sig {
            if let Some(sig) = &self.sig {
                put_bytes(&mut buf, &sig.pk);
                put_bytes(&mut buf, &sig.sig);
            }
        }
        crypto::hash(&buf)
    }
}

/// A ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// Hex of the transaction hash, signature included.
    pub id: String,
    pub data: TxData,
    /// Submission time in unix millis; informational only.
    pub time: i64,
}

impl Tx {
    /// Build and sign a transaction.
    pub fn new(
        channel_id: &str,
        recipient: Address,
        payload: Vec<u8>,
        value: u64,
        keypair: &Keypair,
    ) -> Result<Tx, CryptoError> {
        let mut tx = Tx {
            id: String::new(),
            data: TxData {
                channel_id: channel_id.to_string(),
                nonce: rand::random(),
                recipient,
                payload,
                value,
                version: ENTITY_VERSION,
                sig: None,
            },
            time: now_millis(),
        };
        let sig = keypair.sign(&tx.signing_hash());
        tx.data.sig = Some(TxSig {
            pk: keypair.public_key(),
            sig,
        });
        tx.id = hex::encode(tx.hash());
        Ok(tx)
    }

    /// Build an unsigned transaction; permitted only inside genesis blocks.
    pub fn unsigned(channel_id: &str, payload: Vec<u8>, nonce: u64) -> Tx {
        let mut tx = Tx {
            id: String::new(),
            data: TxData {
                channel_id: channel_id.to_string(),
                nonce,
                recipient: Address::ZERO,
                payload,
                value: 0,
                version: ENTITY_VERSION,
                sig: None,
            },
            time: now_millis(),
        };
        tx.id = hex::encode(tx.hash());
        tx
    }

    /// Hash over the full transaction, signature included.
    pub fn hash(&self) -> Hash {
        self.data.digest(true)
    }

    /// Hash over the signable fields.
    pub fn signing_hash(&self) -> Hash {
        self.data.digest(false)
    }

    /// Whether the id matches the content and the signature verifies.
    pub fn verify(&self) -> bool {
        if self.id != hex::encode(self.hash()) {
            return false;
        }
        let Some(sig) = &self.data.sig else {
            return false;
        };
        crypto::verify(&sig.pk, &self.signing_hash(), &sig.sig)
    }

    /// The signer's account address; zero for unsigned genesis entries.
    pub fn sender(&self) -> Address {
        match &self.data.sig {
            Some(sig) => Address::of_public_key(&sig.pk),
            None => Address::ZERO,
        }
    }
}

/// The header of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub channel_id: String,
    /// 0-based, contiguous per channel.
    pub number: u64,
    /// Hash of the previous block; all zeros on genesis.
    pub prev_block: Hash,
    /// Merkle root over the transaction hashes.
    pub merkle_root: Hash,
    /// Cut time in unix millis; informational only.
    pub time: i64,
}

/// One element of a channel's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Tx>,
}

impl Block {
    /// Assemble a block linked to `prev_block`.
    pub fn new(channel_id: &str, number: u64, prev_block: Hash, transactions: Vec<Tx>) -> Block {
        let tx_hashes: Vec<Hash> = transactions.iter().map(Tx::hash).collect();
        Block {
            header: BlockHeader {
                version: ENTITY_VERSION,
                channel_id: channel_id.to_string(),
                number,
                prev_block,
                merkle_root: merkle_root(&tx_hashes),
                time: now_millis(),
            },
            transactions,
        }
    }

    /// The block hash: version, number, prev hash and merkle root.
    ///
    /// Channel binding comes from the genesis lineage, and time is
    /// excluded so that replicas agree on the digest.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(4 + 8 + 2 * crypto::HASH_LENGTH);
        buf.extend_from_slice(&self.header.version.to_be_bytes());
        buf.extend_from_slice(&self.header.number.to_be_bytes());
        buf.extend_from_slice(&self.header.prev_block);
        buf.extend_from_slice(&self.header.merkle_root);
        crypto::hash(&buf)
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn is_genesis(&self) -> bool {
        self.header.number == 0
    }
}

/// Pairwise SHA-256 merkle root; an odd leaf is paired with itself, the
/// empty set hashes to zero.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return [0u8; crypto::HASH_LENGTH];
    }
    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 2 * crypto::HASH_LENGTH];
                buf[..crypto::HASH_LENGTH].copy_from_slice(&pair[0]);
                buf[crypto::HASH_LENGTH..].copy_from_slice(pair.get(1).unwrap_or(&pair[0]));
                crypto::hash(&buf)
            })
            .collect();
    }
    level[0]
}

/// A channel participant: a public key with a role label.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Member {
    pub public_key: Vec<u8>,
    pub name: String,
}

impl Member {
    pub fn new(public_key: Vec<u8>, name: &str) -> Self {
        Self {
            public_key,
            name: name.to_string(),
        }
    }

    pub fn address(&self) -> Address {
        Address::of_public_key(&self.public_key)
    }
}

impl PartialEq for Member {
    /// Identity is the key; the role label is presentation only.
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

/// Access profile of a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProfile {
    /// Public channels ignore the member list for reads; admins still hold.
    pub public: bool,
    pub admins: Vec<Member>,
    pub members: Vec<Member>,
}

impl ChannelProfile {
    pub fn is_member(&self, member: &Member) -> bool {
        self.public || self.members.contains(member) || self.is_admin(member)
    }

    pub fn is_admin(&self, member: &Member) -> bool {
        self.admins.contains(member)
    }
}

/// Caller's standing within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    Member,
    Admin,
}

/// Point-in-time description of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub is_system: bool,
    pub block_height: u64,
    pub identity: Identity,
}

/// Execution outcome of a transaction, derived once its block has run.
///
/// Write-once: the only transition is absent to present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub block_number: u64,
    pub block_index: u32,
    /// Empty on success; execution errors are data, not control flow.
    pub err: String,
    pub output: Vec<u8>,
    /// Populated by deploys.
    pub contract_address: String,
}
