// Path: crates/types/src/contract.rs
//! On-chain contract metadata.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// The id prefix of deployed contracts; the remainder is the base58 hash of
/// the setup transaction.
pub const CONTRACT_ID_PREFIX: &str = "Contract";

/// One callable entry in a contract's interface.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Abi {
    /// The method name.
    pub name: String,
    /// Positional argument type names (`"string"`, `"number"`, ...).
    pub args: Vec<String>,
}

/// A deployed contract: id, source/bytecode, and interface.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Contract {
    /// The contract id (`Contract<base58 setup-tx hash>` for user code,
    /// a dotted name like `token.kaon` for built-ins).
    pub id: String,
    /// The contract code.
    pub code: String,
    /// The callable interface.
    pub abis: Vec<Abi>,
}

impl Contract {
    /// Derives the id of a contract deployed by the given setup transaction
    /// hash.
    pub fn id_for_setup_tx(tx_hash: &crate::Hash) -> String {
        format!(
            "{}{}",
            CONTRACT_ID_PREFIX,
            kaon_crypto::base58_encode(tx_hash)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn roundtrip() {
        let c = Contract {
            id: "token.kaon".into(),
            code: "native".into(),
            abis: vec![Abi {
                name: "transfer".into(),
                args: vec!["string".into(), "string".into(), "string".into()],
            }],
        };
        let bytes = codec::to_bytes_canonical(&c);
        let back: Contract = codec::from_bytes_canonical(&bytes).unwrap();
        assert_eq!(c, back);
    }

    #[test]
    fn setup_tx_id_is_prefixed_base58() {
        let id = Contract::id_for_setup_tx(&[3u8; 32]);
        assert!(id.starts_with(CONTRACT_ID_PREFIX));
        assert!(id.len() > CONTRACT_ID_PREFIX.len());
    }
}
