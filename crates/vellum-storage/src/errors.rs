//! Storage error taxonomy.
//!
//! Sequence gaps and hash mismatches indicate a protocol violation or
//! corruption; callers must stop the affected channel rather than skip.

use thiserror::Error;
use vellum_types::CodecError;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Appended block number is not tip + 1.
    #[error("channel {channel}: expected block {expected}, received {received}")]
    SequenceGap {
        channel: String,
        expected: u64,
        received: u64,
    },

    /// Appended block does not reference the stored tip's hash.
    #[error("channel {channel}: block {number} does not extend the stored tip")]
    HashMismatch { channel: String, number: u64 },

    /// Genesis blocks must carry the well-known zero previous hash.
    #[error("channel {channel}: genesis block carries a non-zero previous hash")]
    BadGenesis { channel: String },

    /// Requested block is above the tip.
    #[error("block {number} does not exist")]
    NotFound { number: u64 },

    /// Another process holds the store directory.
    #[error("store directory {0} is locked by another process")]
    Locked(String),

    /// On-disk state is unreadable or inconsistent.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
