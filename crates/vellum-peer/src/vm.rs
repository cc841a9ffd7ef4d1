//! The contract virtual machine seam.
//!
//! Instruction semantics are an external concern; the pipeline only needs
//! an `execute -> output | error` oracle. [`HashVm`] is the built-in
//! deterministic implementation: replaying the same chain on two peers
//! yields bit-identical outputs.

use thiserror::Error;
use vellum_types::crypto;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("contract error: {0}")]
    Revert(String),
}

pub trait ContractVm: Send + Sync {
    /// Run a deployment, returning the constructor output.
    fn deploy(&self, code: &[u8]) -> Result<Vec<u8>, VmError>;

    /// Invoke deployed code with the given input.
    fn call(&self, code: &[u8], input: &[u8]) -> Result<Vec<u8>, VmError>;
}

/// Digest-based stand-in VM: outputs are content hashes of what ran.
pub struct HashVm;

impl ContractVm for HashVm {
    fn deploy(&self, code: &[u8]) -> Result<Vec<u8>, VmError> {
        if code.is_empty() {
            return Err(VmError::Revert("empty contract code".into()));
        }
        Ok(crypto::hash(code).to_vec())
    }

    fn call(&self, code: &[u8], input: &[u8]) -> Result<Vec<u8>, VmError> {
        let mut buf = Vec::with_capacity(code.len() + input.len());
        buf.extend_from_slice(code);
        buf.extend_from_slice(input);
        Ok(crypto::hash(&buf).to_vec())
    }
}
