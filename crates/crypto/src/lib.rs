// Path: crates/crypto/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]
//! Cryptographic primitives used across the Kaon node: SHA-256 digests,
//! Ed25519 keypairs, and base58 encoding for the RPC surface.

use ed25519_dalek::{Signer as _, Verifier as _};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// A fixed-size, 32-byte digest. Block head hashes, transaction hashes, and
/// state snapshot tags are all values of this type.
pub type Hash = [u8; 32];

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The signature failed cryptographic verification.
    #[error("signature verification failed")]
    VerificationFailed,
    /// The provided key material is malformed for the algorithm.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// The provided signature bytes are malformed for the algorithm.
    #[error("invalid signature format: {0}")]
    InvalidSignature(String),
    /// A base58 string could not be decoded.
    #[error("invalid base58 string: {0}")]
    InvalidBase58(String),
}

/// Computes the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Encodes bytes as a base58 string.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decodes a base58 string into bytes.
pub fn base58_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| CryptoError::InvalidBase58(e.to_string()))
}

/// An Ed25519 signing keypair. Witness identities are derived from the
/// base58 encoding of the public key.
#[derive(Clone)]
pub struct KeyPair {
    signing: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generates a fresh keypair from the OS entropy source.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing: ed25519_dalek::SigningKey::generate(&mut rng),
        }
    }

    /// Reconstructs a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("seed must be 32 bytes".into()))?;
        Ok(Self {
            signing: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }

    /// Reconstructs a keypair from a base58-encoded 32-byte seed.
    pub fn from_base58_seed(s: &str) -> Result<Self, CryptoError> {
        Self::from_seed(&base58_decode(s)?)
    }

    /// Returns the raw public key bytes.
    pub fn public_key(&self) -> Vec<u8> {
        self.signing.verifying_key().to_bytes().to_vec()
    }

    /// Returns the base58 encoding of the public key. This doubles as the
    /// account identity string for witnesses.
    pub fn id(&self) -> String {
        base58_encode(&self.signing.verifying_key().to_bytes())
    }

    /// Signs `message`, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("id", &self.id()).finish()
    }
}

/// Verifies an Ed25519 signature over `message` with the given raw public key.
pub fn verify(pubkey: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = pubkey
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes".into()))?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature("signature must be 64 bytes".into()))?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    key.verify(message, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Derives the account identity string for a raw public key.
pub fn account_id_from_pubkey(pubkey: &[u8]) -> String {
    base58_encode(pubkey)
}

/// Resolves an account identity string back to raw public key bytes.
pub fn pubkey_from_account_id(id: &str) -> Result<Vec<u8>, CryptoError> {
    base58_decode(id)
}
