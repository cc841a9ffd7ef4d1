//! Canonical byte encoding.
//!
//! Every hash, signature and persisted record is computed over the bincode
//! encoding of its value. The same bytes must re-verify identically on
//! every node, so nothing else in the workspace is allowed to hash a
//! hand-rolled serialization.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Encoding or decoding failure of a canonical value.
#[derive(Debug, Error)]
#[error("codec error: {0}")]
pub struct CodecError(String);

/// Encode a value into its canonical bytes.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError(e.to_string()))
}

/// Decode a value from its canonical bytes.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError(e.to_string()))
}
