// Path: crates/state/src/visitor.rs
//! The typed façade over a state snapshot.
//!
//! Key-spaces:
//! - basic:     `b-<contract>-<key>`
//! - map:       `m-<contract>-<key>-<field>`
//! - balances:  `t-<token>-<account>`  (fixed-point amounts)
//! - contracts: `c-<contract id>`     (canonical contract bytes)

use kaon_api::state::StateAccess;
use kaon_api::vm::DbValue;
use kaon_types::codec;
use kaon_types::contract::Contract;
use kaon_types::error::StateError;
use kaon_types::fixed::FixedPoint;

use crate::value;

/// The native gas/value token.
pub const NATIVE_TOKEN: &str = "kaon";
/// Decimal places of the native token.
pub const NATIVE_DECIMALS: u8 = 8;
/// The storage accounting token (whole bytes).
pub const RAM_TOKEN: &str = "ram";

/// Separator between key components.
const SEP: char = '-';

fn basic_key(contract: &str, key: &str) -> Vec<u8> {
    format!("b{SEP}{contract}{SEP}{key}").into_bytes()
}

fn map_key(contract: &str, key: &str, field: &str) -> Vec<u8> {
    format!("m{SEP}{contract}{SEP}{key}{SEP}{field}").into_bytes()
}

fn map_prefix(contract: &str, key: &str) -> Vec<u8> {
    format!("m{SEP}{contract}{SEP}{key}{SEP}").into_bytes()
}

fn token_key(token: &str, account: &str) -> Vec<u8> {
    format!("t{SEP}{token}{SEP}{account}").into_bytes()
}

fn contract_key(id: &str) -> Vec<u8> {
    format!("c{SEP}{id}").into_bytes()
}

/// A typed view over any [`StateAccess`] (a committed snapshot or an
/// executor overlay).
pub struct Visitor<'a> {
    state: &'a mut dyn StateAccess,
}

impl<'a> Visitor<'a> {
    /// Wraps the given state access.
    pub fn new(state: &'a mut dyn StateAccess) -> Self {
        Self { state }
    }

    // --- basic key-space ---

    /// Reads a basic key in a contract's own key-space.
    pub fn get(&self, contract: &str, key: &str) -> Result<DbValue, StateError> {
        match self.state.get(&basic_key(contract, key))? {
            Some(bytes) => value::decode(&bytes),
            None => Ok(DbValue::Nil),
        }
    }

    /// Writes a basic key.
    pub fn put(&mut self, contract: &str, key: &str, val: &DbValue) -> Result<(), StateError> {
        self.state
            .put(&basic_key(contract, key), &value::encode(val)?)
    }

    /// True when the basic key exists.
    pub fn has(&self, contract: &str, key: &str) -> Result<bool, StateError> {
        self.state.has(&basic_key(contract, key))
    }

    /// Deletes a basic key.
    pub fn del(&mut self, contract: &str, key: &str) -> Result<(), StateError> {
        self.state.del(&basic_key(contract, key))
    }

    // --- map key-space ---

    /// Reads one field of a map.
    pub fn map_get(&self, contract: &str, key: &str, field: &str) -> Result<DbValue, StateError> {
        match self.state.get(&map_key(contract, key, field))? {
            Some(bytes) => value::decode(&bytes),
            None => Ok(DbValue::Nil),
        }
    }

    /// Writes one field of a map.
    pub fn map_put(
        &mut self,
        contract: &str,
        key: &str,
        field: &str,
        val: &DbValue,
    ) -> Result<(), StateError> {
        self.state
            .put(&map_key(contract, key, field), &value::encode(val)?)
    }

    /// True when the map field exists.
    pub fn map_has(&self, contract: &str, key: &str, field: &str) -> Result<bool, StateError> {
        self.state.has(&map_key(contract, key, field))
    }

    /// Deletes one field of a map.
    pub fn map_del(&mut self, contract: &str, key: &str, field: &str) -> Result<(), StateError> {
        self.state.del(&map_key(contract, key, field))
    }

    /// All field names of a map, in byte order.
    pub fn map_keys(&self, contract: &str, key: &str) -> Result<Vec<String>, StateError> {
        let prefix = map_prefix(contract, key);
        let mut fields = Vec::new();
        for (k, _) in self.state.prefix_scan(&prefix)? {
            let field = String::from_utf8(k[prefix.len()..].to_vec())
                .map_err(|e| StateError::Decode(e.to_string()))?;
            fields.push(field);
        }
        Ok(fields)
    }

    /// The number of fields in a map.
    pub fn map_len(&self, contract: &str, key: &str) -> Result<usize, StateError> {
        Ok(self.state.prefix_scan(&map_prefix(contract, key))?.len())
    }

    // --- token balances ---

    /// The balance of `account` in `token`. Missing entries are zero at the
    /// native precision.
    pub fn token_balance(&self, token: &str, account: &str) -> Result<FixedPoint, StateError> {
        match self.state.get(&token_key(token, account))? {
            Some(bytes) => match value::decode(&bytes)? {
                DbValue::Fixed(f) => Ok(f),
                DbValue::Int(i) => Ok(FixedPoint::new(i, 0)),
                _ => Err(StateError::InvalidDbValType),
            },
            None => Ok(FixedPoint::zero(NATIVE_DECIMALS)),
        }
    }

    /// Overwrites the balance of `account` in `token`.
    pub fn set_token_balance(
        &mut self,
        token: &str,
        account: &str,
        amount: FixedPoint,
    ) -> Result<(), StateError> {
        self.state.put(
            &token_key(token, account),
            &value::encode(&DbValue::Fixed(amount))?,
        )
    }

    /// The RAM balance (whole bytes) of an account.
    pub fn ram_balance(&self, account: &str) -> Result<i64, StateError> {
        match self.state.get(&token_key(RAM_TOKEN, account))? {
            Some(bytes) => match value::decode(&bytes)? {
                DbValue::Int(i) => Ok(i),
                DbValue::Fixed(f) => Ok(f.value),
                _ => Err(StateError::InvalidDbValType),
            },
            None => Ok(0),
        }
    }

    /// Overwrites the RAM balance of an account.
    pub fn set_ram_balance(&mut self, account: &str, bytes_count: i64) -> Result<(), StateError> {
        self.state.put(
            &token_key(RAM_TOKEN, account),
            &value::encode(&DbValue::Int(bytes_count))?,
        )
    }

    // --- contract code ---

    /// Loads a deployed contract.
    pub fn contract(&self, id: &str) -> Result<Option<Contract>, StateError> {
        match self.state.get(&contract_key(id))? {
            Some(bytes) => Ok(Some(
                codec::from_bytes_canonical(&bytes).map_err(StateError::Decode)?,
            )),
            None => Ok(None),
        }
    }

    /// Stores a contract under its id.
    pub fn put_contract(&mut self, contract: &Contract) -> Result<(), StateError> {
        self.state.put(
            &contract_key(&contract.id),
            &codec::to_bytes_canonical(contract),
        )
    }

    /// True when a contract with this id is deployed.
    pub fn has_contract(&self, id: &str) -> Result<bool, StateError> {
        self.state.has(&contract_key(id))
    }
}
