// Path: crates/executor/src/native.rs
//! The built-in contracts, executed by the native VM.
//!
//! `token.kaon` is the native token ledger, `kaon.system` manages contract
//! code, and `base.kaon` is the producer bookkeeping contract invoked by the
//! base transaction. Everything observable flows through host capabilities,
//! so replay is bit-identical across validators.

use kaon_api::vm::{DbValue, HostApi, VirtualMachine};
use kaon_types::error::VmError;
use kaon_types::fixed::FixedPoint;

/// The native token ledger contract id.
pub const TOKEN_CONTRACT: &str = "token.kaon";
/// The system contract id.
pub const SYSTEM_CONTRACT: &str = "kaon.system";
/// The base (producer bookkeeping) contract id.
pub const BASE_CONTRACT: &str = "base.kaon";

/// Block reward credited to the witness by the base transaction, in native
/// token units (1.98 kaon).
pub const BLOCK_REWARD: &str = "1.98";

/// The deterministic interpreter for the built-in contracts. User-deployed
/// bytecode is the scripting VM collaborator's job; this VM only refuses it
/// explicitly.
#[derive(Debug, Default, Clone)]
pub struct NativeVm;

impl NativeVm {
    /// Creates the native VM.
    pub fn new() -> Self {
        Self
    }
}

fn parse_args(args_json: &str) -> Result<Vec<serde_json::Value>, VmError> {
    serde_json::from_str(args_json)
        .map_err(|e| VmError::ParamErr(format!("arguments must be a json array: {e}")))
}

fn str_arg(args: &[serde_json::Value], index: usize) -> Result<String, VmError> {
    args.get(index)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| VmError::ParamErr(format!("argument {index} must be a string")))
}

fn token_call(
    host: &mut dyn HostApi,
    method: &str,
    args_json: &str,
) -> Result<Vec<String>, VmError> {
    let args = parse_args(args_json)?;
    match method {
        "transfer" => {
            let from = str_arg(&args, 0)?;
            let to = str_arg(&args, 1)?;
            let amount = str_arg(&args, 2)?;
            // Reject malformed amounts before touching balances so the
            // failure classifies as ParamErr, not Runtime.
            FixedPoint::unmarshal(&amount).map_err(|e| VmError::ParamErr(e.to_string()))?;
            host.call(
                "transfer",
                &[
                    DbValue::Str(from.clone()),
                    DbValue::Str(to.clone()),
                    DbValue::Str(amount.clone()),
                ],
            )?;
            host.call(
                "emit",
                &[DbValue::Str(
                    serde_json::json!([from, to, amount]).to_string(),
                )],
            )?;
            Ok(vec![])
        }
        "balanceOf" => {
            let account = str_arg(&args, 0)?;
            let balance = host.call("balance_of", &[DbValue::Str(account)])?;
            Ok(vec![balance.to_display_string()?])
        }
        "issue" => {
            let account = str_arg(&args, 0)?;
            let amount = str_arg(&args, 1)?;
            host.call(
                "issue",
                &[DbValue::Str(account), DbValue::Str(amount)],
            )?;
            Ok(vec![])
        }
        other => Err(VmError::Host(format!("token.kaon has no method {other}"))),
    }
}

fn system_call(
    host: &mut dyn HostApi,
    method: &str,
    args_json: &str,
) -> Result<Vec<String>, VmError> {
    let args = parse_args(args_json)?;
    match method {
        "setCode" | "updateCode" => {
            let contract_json = str_arg(&args, 0)?;
            let id = host.call("set_code", &[DbValue::Str(contract_json)])?;
            Ok(vec![id.to_display_string()?])
        }
        other => Err(VmError::Host(format!("kaon.system has no method {other}"))),
    }
}

fn base_call(
    host: &mut dyn HostApi,
    method: &str,
    args_json: &str,
) -> Result<Vec<String>, VmError> {
    let args = parse_args(args_json)?;
    match method {
        "reward" => {
            let witness = str_arg(&args, 0)?;
            host.call(
                "issue",
                &[
                    DbValue::Str(witness),
                    DbValue::Str(BLOCK_REWARD.to_string()),
                ],
            )?;
            Ok(vec![])
        }
        other => Err(VmError::Host(format!("base.kaon has no method {other}"))),
    }
}

impl VirtualMachine for NativeVm {
    fn execute(
        &self,
        host: &mut dyn HostApi,
        contract: &str,
        method: &str,
        args_json: &str,
    ) -> Result<Vec<String>, VmError> {
        match contract {
            TOKEN_CONTRACT => token_call(host, method, args_json),
            SYSTEM_CONTRACT => system_call(host, method, args_json),
            BASE_CONTRACT => base_call(host, method, args_json),
            other => Err(VmError::Host(format!(
                "no execution engine for contract {other}"
            ))),
        }
    }
}
