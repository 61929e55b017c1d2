// Path: crates/api/src/vm.rs
//! The scripting VM seam.
//!
//! The VM executes one action deterministically against a host object and a
//! gas/time budget. Host capabilities are reached through a single tagged
//! dispatch entry point over a closed value sum, so the capability set is a
//! data table rather than a wide trait.

use kaon_types::error::VmError;
use kaon_types::fixed::FixedPoint;

/// The closed sum of values crossing the VM/host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// A signed 64-bit integer.
    Int(i64),
    /// A UTF-8 string.
    Str(String),
    /// A boolean.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A fixed-point decimal.
    Fixed(FixedPoint),
    /// Absence of a value (a missing key).
    Nil,
}

impl DbValue {
    /// Renders the value for JSON-facing surfaces. Mirrors the closed-sum
    /// stringification the storage host applies before handing values to
    /// contracts.
    pub fn to_display_string(&self) -> Result<String, VmError> {
        match self {
            DbValue::Int(i) => Ok(i.to_string()),
            DbValue::Str(s) => Ok(s.clone()),
            DbValue::Bool(b) => Ok(b.to_string()),
            DbValue::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            DbValue::Fixed(f) => f
                .marshal()
                .map_err(|e| VmError::Runtime(e.to_string())),
            DbValue::Nil => Ok(String::new()),
        }
    }

    /// Extracts a string or fails with `ParamErr`.
    pub fn as_str(&self) -> Result<&str, VmError> {
        match self {
            DbValue::Str(s) => Ok(s),
            other => Err(VmError::ParamErr(format!("expected string, got {other:?}"))),
        }
    }

    /// Extracts an integer or fails with `ParamErr`.
    pub fn as_int(&self) -> Result<i64, VmError> {
        match self {
            DbValue::Int(i) => Ok(*i),
            other => Err(VmError::ParamErr(format!("expected int, got {other:?}"))),
        }
    }
}

/// The symbols of the host capability table.
///
/// Each capability takes positional [`DbValue`] arguments and returns one
/// [`DbValue`]; gas is charged by the host per call.
pub const HOST_CAPABILITIES: &[&str] = &[
    "get",
    "set",
    "has",
    "del",
    "map_get",
    "map_put",
    "map_has",
    "map_del",
    "map_keys",
    "map_len",
    "global_get",
    "global_has",
    "global_map_get",
    "global_map_keys",
    "global_map_len",
    "require_auth",
    "transfer",
    "issue",
    "balance_of",
    "block_info",
    "tx_info",
    "set_code",
    "emit",
    "call",
    "call_with_receipt",
];

/// The dyn-safe host surface offered to a VM during one action execution.
pub trait HostApi {
    /// Invokes a host capability by symbol with positional arguments.
    /// Unknown symbols fail with [`VmError::Host`]; budget exhaustion
    /// surfaces as [`VmError::GasRunOut`] or [`VmError::Timeout`].
    fn call(&mut self, capability: &str, args: &[DbValue]) -> Result<DbValue, VmError>;

    /// The gas spent so far in this transaction, in gas units.
    fn gas_used(&self) -> i64;
}

/// A deterministic VM executing one action.
///
/// Implementations must derive every observable effect from the host
/// capabilities (in particular `block_info` is the only clock) so replay on
/// another validator is bit-identical.
pub trait VirtualMachine: Send + Sync {
    /// Executes `contract.method(args_json)` against `host`, returning the
    /// action's return values.
    fn execute(
        &self,
        host: &mut dyn HostApi,
        contract: &str,
        method: &str,
        args_json: &str,
    ) -> Result<Vec<String>, VmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_string_covers_sum() {
        assert_eq!(DbValue::Int(-3).to_display_string().unwrap(), "-3");
        assert_eq!(DbValue::Bool(true).to_display_string().unwrap(), "true");
        assert_eq!(
            DbValue::Fixed(FixedPoint::new(1230, 2))
                .to_display_string()
                .unwrap(),
            "12.30"
        );
        assert_eq!(DbValue::Nil.to_display_string().unwrap(), "");
    }

    #[test]
    fn accessor_type_errors() {
        assert!(DbValue::Int(1).as_str().is_err());
        assert!(DbValue::Str("x".into()).as_int().is_err());
    }

    #[test]
    fn capability_table_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for cap in HOST_CAPABILITIES {
            assert!(seen.insert(*cap), "duplicate capability {cap}");
        }
    }
}
