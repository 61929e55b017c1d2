// Path: crates/types/src/receipt.rs
//! Transaction receipts.

use crate::codec;
use crate::Hash;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The outcome class of a transaction execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize, Default,
)]
pub enum StatusCode {
    /// Execution completed.
    #[default]
    Success,
    /// The gas limit was exhausted mid-execution.
    GasRunOut,
    /// A balance was insufficient.
    BalanceNotEnough,
    /// The per-transaction wall-clock budget was exceeded.
    Timeout,
    /// The contract failed at runtime.
    Runtime,
    /// The action arguments were malformed.
    ParamErr,
    /// Anything not covered above.
    Unknown,
}

/// The execution status of a receipt: outcome class plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Status {
    /// The outcome class.
    pub code: StatusCode,
    /// A diagnostic message; empty on success.
    pub message: String,
}

impl Status {
    /// The success status.
    pub fn success() -> Self {
        Self::default()
    }

    /// True when the code is `Success`.
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}

/// An event emitted by a contract during execution.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ReceiptEntry {
    /// `contract/method` that emitted the event.
    pub func_name: String,
    /// The event payload.
    pub content: String,
}

/// The receipt for one executed transaction. Positionally paired with its
/// transaction inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Receipt {
    /// The hash of the transaction this receipt belongs to.
    pub tx_hash: Hash,
    /// The execution outcome.
    pub status: Status,
    /// Cumulative gas used, in gas units.
    pub gas_usage: i64,
    /// RAM bytes charged, per payer account.
    pub ram_usage: BTreeMap<String, i64>,
    /// Values returned by each action.
    pub returns: Vec<String>,
    /// Events emitted during execution.
    pub receipts: Vec<ReceiptEntry>,
}

impl Receipt {
    /// The deterministic receipt hash over the canonical encoding.
    ///
    /// Two validators replaying the same branch must produce bit-identical
    /// receipts, so this hash is the equality used by block verification.
    pub fn hash(&self) -> Hash {
        kaon_crypto::sha256(&codec::to_bytes_canonical(self))
    }
}
