//! Hashing and signing primitives.
//!
//! All content hashes are SHA-256; signatures are Ed25519. Key material is
//! carried as raw bytes in the wire types so that verification never needs
//! more than the transaction itself.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

/// Length of a content hash in bytes.
pub const HASH_LENGTH: usize = 32;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; HASH_LENGTH];

/// Errors raised by key handling and signature checks.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid signature bytes")]
    InvalidSignature,

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Compute the SHA-256 digest of `data`.
pub fn hash(data: &[u8]) -> Hash {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// An Ed25519 keypair used to sign transactions.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a keypair from a 32-byte secret key.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self {
            signing: SigningKey::from_bytes(&secret),
        })
    }

    /// The 32-byte secret key.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// The 32-byte public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.signing.verifying_key().to_bytes().to_vec()
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

/// Verify an Ed25519 signature over `message` with the given public key.
///
/// Malformed keys or signatures simply fail verification; callers treat the
/// transaction as unsigned rather than propagating a parse error.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    vk.verify(message, &sig).is_ok()
}
