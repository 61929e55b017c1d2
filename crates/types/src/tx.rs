// Path: crates/types/src/tx.rs
//! Transactions and their signatures.

use crate::codec;
use crate::error::BlockError;
use crate::Hash;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A single contract invocation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Action {
    /// The target contract id (e.g. `token.kaon`).
    pub contract: String,
    /// The method name on the contract.
    pub name: String,
    /// JSON-encoded call arguments.
    pub data: String,
}

impl Action {
    /// Creates a new action.
    pub fn new(
        contract: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            contract: contract.into(),
            name: name.into(),
            data: data.into(),
        }
    }
}

/// An Ed25519 signature together with the public key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Signature {
    /// The raw public key bytes.
    pub pubkey: Vec<u8>,
    /// The raw signature bytes.
    pub sig: Vec<u8>,
}

impl Signature {
    /// Verifies this signature over `message`.
    pub fn verify(&self, message: &[u8]) -> bool {
        kaon_crypto::verify(&self.pubkey, message, &self.sig).is_ok()
    }
}

/// A transaction. Mutable only before admission; hashing excludes every
/// signature field so signing does not perturb identity.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Tx {
    /// The ordered list of actions to execute.
    pub actions: Vec<Action>,
    /// Creation time, nanoseconds since epoch.
    pub time: i64,
    /// Expiration time, nanoseconds since epoch. Must exceed `time`.
    pub expiration: i64,
    /// The gas limit for the whole transaction.
    pub gas_limit: i64,
    /// The gas price multiplier (100 = 1.00x).
    pub gas_ratio: i64,
    /// Hash of the original delayed tx, set only on the materialization of
    /// a deferred transaction.
    pub referred_tx: Option<Hash>,
    /// Delay in nanoseconds, set (non-zero) only on a tx that schedules a
    /// deferred execution of itself.
    pub delay: i64,
    /// The publisher account that pays for gas.
    pub publisher: String,
    /// Signatures by the action signers.
    pub signatures: Vec<Signature>,
    /// The publisher's signature over the base hash.
    pub publish_signatures: Vec<Signature>,
}

impl Tx {
    /// Creates an unsigned transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actions: Vec<Action>,
        time: i64,
        expiration: i64,
        gas_limit: i64,
        gas_ratio: i64,
        delay: i64,
    ) -> Self {
        Self {
            actions,
            time,
            expiration,
            gas_limit,
            gas_ratio,
            referred_tx: None,
            delay,
            publisher: String::new(),
            signatures: Vec::new(),
            publish_signatures: Vec::new(),
        }
    }

    /// The canonical signing payload: the transaction with all signature
    /// fields cleared.
    fn base_bytes(&self) -> Vec<u8> {
        let mut stripped = self.clone();
        stripped.signatures = Vec::new();
        stripped.publish_signatures = Vec::new();
        codec::to_bytes_canonical(&stripped)
    }

    /// The deterministic transaction hash: SHA-256 over the canonical
    /// encoding excluding signatures.
    pub fn hash(&self) -> Hash {
        kaon_crypto::sha256(&self.base_bytes())
    }

    /// Signs the transaction as its publisher, setting the publisher id
    /// from the keypair.
    pub fn sign_as_publisher(&mut self, key: &kaon_crypto::KeyPair) {
        self.publisher = key.id();
        let payload = self.base_bytes();
        self.publish_signatures = vec![Signature {
            pubkey: key.public_key(),
            sig: key.sign(&payload),
        }];
    }

    /// Adds an action-signer signature.
    pub fn sign_as_signer(&mut self, key: &kaon_crypto::KeyPair) {
        let payload = self.base_bytes();
        self.signatures.push(Signature {
            pubkey: key.public_key(),
            sig: key.sign(&payload),
        });
    }

    /// True when this tx is the materialization of a deferred transaction.
    pub fn is_defer(&self) -> bool {
        self.referred_tx.is_some()
    }

    /// True when this tx schedules a future deferred execution.
    pub fn is_delay(&self) -> bool {
        self.delay > 0
    }

    /// True once `now` has passed the expiration.
    pub fn is_expired(&self, now_ns: i64) -> bool {
        self.expiration <= now_ns
    }

    /// Structural validity: expiration after creation, and at most one of
    /// the defer fields set.
    pub fn check_format(&self) -> Result<(), String> {
        if self.expiration <= self.time {
            return Err("expiration must be after creation time".into());
        }
        if self.is_defer() && self.is_delay() {
            return Err("referred_tx and delay are mutually exclusive".into());
        }
        if self.actions.is_empty() && !self.is_defer() {
            return Err("transaction has no actions".into());
        }
        Ok(())
    }

    /// Verifies every signature against the base payload, and that the
    /// publisher matches the publish key.
    pub fn verify_self(&self) -> Result<(), String> {
        self.check_format()?;
        let payload = self.base_bytes();
        let publish = self
            .publish_signatures
            .first()
            .ok_or_else(|| "missing publisher signature".to_string())?;
        if kaon_crypto::account_id_from_pubkey(&publish.pubkey) != self.publisher {
            return Err("publish key does not match publisher".into());
        }
        if !publish.verify(&payload) {
            return Err("publisher signature invalid".into());
        }
        for sig in &self.signatures {
            if !sig.verify(&payload) {
                return Err("signer signature invalid".into());
            }
        }
        Ok(())
    }

    /// Builds the materialization of a delayed transaction: same actions and
    /// publisher, triggered `delay` after the original's creation time.
    pub fn materialize_defer(original: &Tx) -> Tx {
        let time = original.time.saturating_add(original.delay);
        Tx {
            actions: original.actions.clone(),
            time,
            expiration: time.saturating_add(original.expiration - original.time),
            gas_limit: original.gas_limit,
            gas_ratio: original.gas_ratio,
            referred_tx: Some(original.hash()),
            delay: 0,
            publisher: original.publisher.clone(),
            signatures: original.signatures.clone(),
            publish_signatures: original.publish_signatures.clone(),
        }
    }

    /// Validates a deferred materialization against its referred original.
    pub fn verify_defer(&self, original: &Tx) -> Result<(), BlockError> {
        if self.referred_tx != Some(original.hash()) {
            return Err(BlockError::DeferTxMismatch(
                "referred hash does not match original".into(),
            ));
        }
        if self.time != original.time.saturating_add(original.delay) {
            return Err(BlockError::DeferTxMismatch(
                "trigger time does not match original delay".into(),
            ));
        }
        if self.actions != original.actions {
            return Err(BlockError::DeferTxMismatch("actions differ".into()));
        }
        if self.publisher != original.publisher {
            return Err(BlockError::DeferTxMismatch("publisher differs".into()));
        }
        Ok(())
    }
}
