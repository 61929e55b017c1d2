// Path: crates/executor/src/host.rs
//! The host object a VM executes against.
//!
//! Capabilities are a tagged dispatch table keyed by symbol; every call
//! charges gas, observes the per-transaction deadline, and operates on the
//! transaction's copy-on-write overlay. The block head is the only clock a
//! contract can observe.

use kaon_api::state::StateAccess;
use kaon_api::vm::{DbValue, HostApi, VirtualMachine};
use kaon_state::visitor::{Visitor, NATIVE_DECIMALS, NATIVE_TOKEN};
use kaon_types::contract::Contract;
use kaon_types::error::VmError;
use kaon_types::receipt::ReceiptEntry;
use kaon_types::Hash;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use crate::teller::{Cost, Teller};

/// Base gas per host call.
const OP_COST: i64 = 100;
/// Extra gas per transfer.
const TRANSFER_COST: i64 = 100;

/// Block-level context visible to contracts.
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// The block number.
    pub number: i64,
    /// The producing witness.
    pub witness: String,
    /// The slot time in nanoseconds; the only clock contracts see.
    pub time: i64,
    /// The parent head hash.
    pub parent_hash: Hash,
}

/// Transaction-level context visible to contracts.
#[derive(Debug, Clone)]
pub struct TxContext {
    /// The transaction hash.
    pub hash: Hash,
    /// The paying publisher account.
    pub publisher: String,
    /// Accounts whose authority this transaction carries.
    pub auth: BTreeSet<String>,
    /// The transaction gas limit.
    pub gas_limit: i64,
    /// The gas price ratio (100 = 1.00x).
    pub gas_ratio: i64,
    /// True for the producer-synthesized base transaction, which executes
    /// without auth or gas settlement.
    pub is_base: bool,
}

type HostFn = fn(&mut Host<'_>, &[DbValue]) -> Result<DbValue, VmError>;

/// The capability dispatch table. Order matches `kaon_api::vm::HOST_CAPABILITIES`.
static DISPATCH: &[(&str, HostFn)] = &[
    ("get", |h, args| Host::cap_get(h, args)),
    ("set", |h, args| Host::cap_set(h, args)),
    ("has", |h, args| Host::cap_has(h, args)),
    ("del", |h, args| Host::cap_del(h, args)),
    ("map_get", |h, args| Host::cap_map_get(h, args)),
    ("map_put", |h, args| Host::cap_map_put(h, args)),
    ("map_has", |h, args| Host::cap_map_has(h, args)),
    ("map_del", |h, args| Host::cap_map_del(h, args)),
    ("map_keys", |h, args| Host::cap_map_keys(h, args)),
    ("map_len", |h, args| Host::cap_map_len(h, args)),
    ("global_get", |h, args| Host::cap_global_get(h, args)),
    ("global_has", |h, args| Host::cap_global_has(h, args)),
    ("global_map_get", |h, args| Host::cap_global_map_get(h, args)),
    ("global_map_keys", |h, args| Host::cap_global_map_keys(h, args)),
    ("global_map_len", |h, args| Host::cap_global_map_len(h, args)),
    ("require_auth", |h, args| Host::cap_require_auth(h, args)),
    ("transfer", |h, args| Host::cap_transfer(h, args)),
    ("issue", |h, args| Host::cap_issue(h, args)),
    ("balance_of", |h, args| Host::cap_balance_of(h, args)),
    ("block_info", |h, args| Host::cap_block_info(h, args)),
    ("tx_info", |h, args| Host::cap_tx_info(h, args)),
    ("set_code", |h, args| Host::cap_set_code(h, args)),
    ("emit", |h, args| Host::cap_emit(h, args)),
    ("call", |h, args| Host::cap_call(h, args)),
    ("call_with_receipt", |h, args| Host::cap_call_with_receipt(h, args)),
];

/// Per-transaction host state. Created once per transaction; the current
/// action is switched by the executor between actions.
pub struct Host<'a> {
    state: &'a mut dyn StateAccess,
    vm: Arc<dyn VirtualMachine>,
    block: BlockContext,
    tx: TxContext,
    teller: Teller,
    deadline: Instant,
    current_contract: String,
    current_method: String,
    entries: Vec<ReceiptEntry>,
    call_depth: u32,
}

/// Maximum nested `call` depth.
const MAX_CALL_DEPTH: u32 = 5;

impl<'a> Host<'a> {
    /// Creates a host for one transaction execution.
    pub fn new(
        state: &'a mut dyn StateAccess,
        vm: Arc<dyn VirtualMachine>,
        block: BlockContext,
        tx: TxContext,
        deadline: Instant,
    ) -> Self {
        Self {
            state,
            vm,
            block,
            tx,
            teller: Teller::new(),
            deadline,
            current_contract: String::new(),
            current_method: String::new(),
            entries: Vec::new(),
            call_depth: 0,
        }
    }

    /// Positions the host on the action about to execute.
    pub fn enter_action(&mut self, contract: &str, method: &str) {
        self.current_contract = contract.to_string();
        self.current_method = method.to_string();
    }

    /// Charges the flat cost of starting an action. The executor applies
    /// this before handing the action to the VM, so even an action that
    /// fails before its first host call pays for the attempt.
    pub fn charge_action_entry(&mut self) -> Result<(), VmError> {
        self.charge(Cost::cpu(OP_COST))
    }

    /// The teller accumulating this transaction's costs.
    pub fn teller(&self) -> &Teller {
        &self.teller
    }

    /// Mutable teller access, for settlement by the executor.
    pub fn teller_mut(&mut self) -> &mut Teller {
        &mut self.teller
    }

    /// Receipt entries emitted so far.
    pub fn take_entries(&mut self) -> Vec<ReceiptEntry> {
        std::mem::take(&mut self.entries)
    }

    /// The transaction context.
    pub fn tx_context(&self) -> &TxContext {
        &self.tx
    }

    fn visitor(&mut self) -> Visitor<'_> {
        Visitor::new(self.state)
    }

    fn charge(&mut self, cost: Cost) -> Result<(), VmError> {
        let payer = self.tx.publisher.clone();
        self.teller.pay(cost, &payer);
        if !self.tx.is_base && self.teller.gas_used() > self.tx.gas_limit {
            return Err(VmError::GasRunOut);
        }
        Ok(())
    }

    fn state_err(e: kaon_types::error::StateError) -> VmError {
        match e {
            kaon_types::error::StateError::InvalidDbValType => VmError::InvalidDbValType,
            other => VmError::Runtime(other.to_string()),
        }
    }

    fn arg<'v>(args: &'v [DbValue], index: usize) -> Result<&'v DbValue, VmError> {
        args.get(index)
            .ok_or_else(|| VmError::ParamErr(format!("missing argument {index}")))
    }

    // --- capabilities ---

    fn cap_get(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        self.visitor().get(&contract, &key).map_err(Self::state_err)
    }

    fn cap_set(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let val = Self::arg(args, 1)?.clone();
        let bytes = key.len() as i64 + val.to_display_string()?.len() as i64;
        self.charge(Cost {
            cpu: 0,
            net: 0,
            data: bytes,
        })?;
        let contract = self.current_contract.clone();
        self.visitor()
            .put(&contract, &key, &val)
            .map_err(Self::state_err)?;
        Ok(DbValue::Nil)
    }

    fn cap_has(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        let present = self.visitor().has(&contract, &key).map_err(Self::state_err)?;
        Ok(DbValue::Bool(present))
    }

    fn cap_del(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        self.visitor().del(&contract, &key).map_err(Self::state_err)?;
        Ok(DbValue::Nil)
    }

    fn cap_map_get(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let field = Self::arg(args, 1)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        self.visitor()
            .map_get(&contract, &key, &field)
            .map_err(Self::state_err)
    }

    fn cap_map_put(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let field = Self::arg(args, 1)?.as_str()?.to_string();
        let val = Self::arg(args, 2)?.clone();
        let bytes = key.len() as i64 + field.len() as i64 + val.to_display_string()?.len() as i64;
        self.charge(Cost {
            cpu: 0,
            net: 0,
            data: bytes,
        })?;
        let contract = self.current_contract.clone();
        self.visitor()
            .map_put(&contract, &key, &field, &val)
            .map_err(Self::state_err)?;
        Ok(DbValue::Nil)
    }

    fn cap_map_has(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let field = Self::arg(args, 1)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        let present = self
            .visitor()
            .map_has(&contract, &key, &field)
            .map_err(Self::state_err)?;
        Ok(DbValue::Bool(present))
    }

    fn cap_map_del(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let field = Self::arg(args, 1)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        self.visitor()
            .map_del(&contract, &key, &field)
            .map_err(Self::state_err)?;
        Ok(DbValue::Nil)
    }

    fn cap_map_keys(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        let keys = self
            .visitor()
            .map_keys(&contract, &key)
            .map_err(Self::state_err)?;
        serde_json::to_string(&keys)
            .map(DbValue::Str)
            .map_err(|e| VmError::Runtime(e.to_string()))
    }

    fn cap_map_len(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let key = Self::arg(args, 0)?.as_str()?.to_string();
        let contract = self.current_contract.clone();
        let len = self
            .visitor()
            .map_len(&contract, &key)
            .map_err(Self::state_err)?;
        Ok(DbValue::Int(len as i64))
    }

    fn cap_global_get(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let contract = Self::arg(args, 0)?.as_str()?.to_string();
        let key = Self::arg(args, 1)?.as_str()?.to_string();
        self.visitor().get(&contract, &key).map_err(Self::state_err)
    }

    fn cap_global_has(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let contract = Self::arg(args, 0)?.as_str()?.to_string();
        let key = Self::arg(args, 1)?.as_str()?.to_string();
        let present = self.visitor().has(&contract, &key).map_err(Self::state_err)?;
        Ok(DbValue::Bool(present))
    }

    fn cap_global_map_get(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let contract = Self::arg(args, 0)?.as_str()?.to_string();
        let key = Self::arg(args, 1)?.as_str()?.to_string();
        let field = Self::arg(args, 2)?.as_str()?.to_string();
        self.visitor()
            .map_get(&contract, &key, &field)
            .map_err(Self::state_err)
    }

    fn cap_global_map_keys(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let contract = Self::arg(args, 0)?.as_str()?.to_string();
        let key = Self::arg(args, 1)?.as_str()?.to_string();
        let keys = self
            .visitor()
            .map_keys(&contract, &key)
            .map_err(Self::state_err)?;
        serde_json::to_string(&keys)
            .map(DbValue::Str)
            .map_err(|e| VmError::Runtime(e.to_string()))
    }

    fn cap_global_map_len(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let contract = Self::arg(args, 0)?.as_str()?.to_string();
        let key = Self::arg(args, 1)?.as_str()?.to_string();
        let len = self
            .visitor()
            .map_len(&contract, &key)
            .map_err(Self::state_err)?;
        Ok(DbValue::Int(len as i64))
    }

    fn cap_require_auth(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let account = Self::arg(args, 0)?.as_str()?;
        Ok(DbValue::Bool(
            self.tx.is_base || self.tx.auth.contains(account),
        ))
    }

    fn cap_transfer(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let from = Self::arg(args, 0)?.as_str()?.to_string();
        let to = Self::arg(args, 1)?.as_str()?.to_string();
        let amount = match Self::arg(args, 2)? {
            DbValue::Fixed(f) => *f,
            DbValue::Str(s) => kaon_types::fixed::FixedPoint::unmarshal(s)
                .map_err(|e| VmError::ParamErr(e.to_string()))?,
            other => return Err(VmError::ParamErr(format!("bad amount {other:?}"))),
        };
        let amount = amount
            .rescale(NATIVE_DECIMALS)
            .map_err(|e| VmError::ParamErr(e.to_string()))?;
        if amount.is_negative() {
            return Err(VmError::ParamErr("negative transfer amount".into()));
        }
        if !self.tx.is_base && !self.tx.auth.contains(&from) {
            return Err(VmError::Runtime(format!("missing authority of {from}")));
        }
        self.charge(Cost::cpu(TRANSFER_COST))?;

        let mut visitor = self.visitor();
        let from_balance = visitor
            .token_balance(NATIVE_TOKEN, &from)
            .map_err(Self::state_err)?;
        let remaining = from_balance
            .checked_sub(&amount)
            .map_err(|e| VmError::Runtime(e.to_string()))?;
        if remaining.is_negative() {
            return Err(VmError::BalanceNotEnough(format!(
                "{from} has {from_balance}, needs {amount}"
            )));
        }
        let to_balance = visitor
            .token_balance(NATIVE_TOKEN, &to)
            .map_err(Self::state_err)?;
        let credited = to_balance
            .checked_add(&amount)
            .map_err(|e| VmError::Runtime(e.to_string()))?;
        visitor
            .set_token_balance(NATIVE_TOKEN, &from, remaining)
            .map_err(Self::state_err)?;
        visitor
            .set_token_balance(NATIVE_TOKEN, &to, credited)
            .map_err(Self::state_err)?;
        Ok(DbValue::Nil)
    }

    fn cap_issue(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        // Supply creation is reserved for producer bookkeeping (the base
        // transaction) and genesis application.
        if !self.tx.is_base {
            return Err(VmError::Runtime("issue requires base authority".into()));
        }
        let account = Self::arg(args, 0)?.as_str()?.to_string();
        let amount = match Self::arg(args, 1)? {
            DbValue::Fixed(f) => *f,
            DbValue::Str(s) => kaon_types::fixed::FixedPoint::unmarshal(s)
                .map_err(|e| VmError::ParamErr(e.to_string()))?,
            other => return Err(VmError::ParamErr(format!("bad amount {other:?}"))),
        };
        let amount = amount
            .rescale(NATIVE_DECIMALS)
            .map_err(|e| VmError::ParamErr(e.to_string()))?;
        let mut visitor = self.visitor();
        let balance = visitor
            .token_balance(NATIVE_TOKEN, &account)
            .map_err(Self::state_err)?;
        let credited = balance
            .checked_add(&amount)
            .map_err(|e| VmError::Runtime(e.to_string()))?;
        visitor
            .set_token_balance(NATIVE_TOKEN, &account, credited)
            .map_err(Self::state_err)?;
        Ok(DbValue::Nil)
    }

    fn cap_balance_of(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let account = Self::arg(args, 0)?.as_str()?.to_string();
        let balance = self
            .visitor()
            .token_balance(NATIVE_TOKEN, &account)
            .map_err(Self::state_err)?;
        Ok(DbValue::Fixed(balance))
    }

    fn cap_block_info(&mut self, _args: &[DbValue]) -> Result<DbValue, VmError> {
        let info = serde_json::json!({
            "number": self.block.number,
            "witness": self.block.witness,
            "time": self.block.time,
            "parent_hash": kaon_crypto::base58_encode(&self.block.parent_hash),
        });
        Ok(DbValue::Str(info.to_string()))
    }

    fn cap_tx_info(&mut self, _args: &[DbValue]) -> Result<DbValue, VmError> {
        let info = serde_json::json!({
            "hash": kaon_crypto::base58_encode(&self.tx.hash),
            "publisher": self.tx.publisher,
            "gas_limit": self.tx.gas_limit,
            "gas_ratio": self.tx.gas_ratio,
        });
        Ok(DbValue::Str(info.to_string()))
    }

    fn cap_set_code(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let contract_json = Self::arg(args, 0)?.as_str()?;
        let mut contract: Contract = serde_json::from_str(contract_json)
            .map_err(|e| VmError::ParamErr(format!("bad contract json: {e}")))?;
        if contract.id.is_empty() {
            contract.id = Contract::id_for_setup_tx(&self.tx.hash);
        }
        self.charge(Cost {
            cpu: 0,
            net: 0,
            data: contract.code.len() as i64,
        })?;
        self.visitor()
            .put_contract(&contract)
            .map_err(Self::state_err)?;
        Ok(DbValue::Str(contract.id))
    }

    fn cap_emit(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let content = Self::arg(args, 0)?.as_str()?.to_string();
        self.charge(Cost {
            cpu: 0,
            net: content.len() as i64,
            data: 0,
        })?;
        self.entries.push(ReceiptEntry {
            func_name: format!("{}/{}", self.current_contract, self.current_method),
            content,
        });
        Ok(DbValue::Nil)
    }

    fn cap_call(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let contract = Self::arg(args, 0)?.as_str()?.to_string();
        let method = Self::arg(args, 1)?.as_str()?.to_string();
        let call_args = Self::arg(args, 2)?.as_str()?.to_string();
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(VmError::Runtime("call depth limit reached".into()));
        }
        let (prev_contract, prev_method) =
            (self.current_contract.clone(), self.current_method.clone());
        self.call_depth += 1;
        self.enter_action(&contract, &method);
        let vm = self.vm.clone();
        let result = vm.execute(self, &contract, &method, &call_args);
        self.call_depth -= 1;
        self.enter_action(&prev_contract, &prev_method);
        let returns = result?;
        serde_json::to_string(&returns)
            .map(DbValue::Str)
            .map_err(|e| VmError::Runtime(e.to_string()))
    }

    fn cap_call_with_receipt(&mut self, args: &[DbValue]) -> Result<DbValue, VmError> {
        let result = self.cap_call(args)?;
        let content = result.to_display_string()?;
        self.entries.push(ReceiptEntry {
            func_name: format!("{}/{}", self.current_contract, self.current_method),
            content,
        });
        Ok(result)
    }
}

impl HostApi for Host<'_> {
    fn call(&mut self, capability: &str, args: &[DbValue]) -> Result<DbValue, VmError> {
        if Instant::now() >= self.deadline {
            return Err(VmError::Timeout);
        }
        self.charge(Cost::cpu(OP_COST))?;
        let handler = DISPATCH
            .iter()
            .find(|(name, _)| *name == capability)
            .map(|(_, f)| *f)
            .ok_or_else(|| VmError::Host(format!("unknown capability {capability}")))?;
        handler(self, args)
    }

    fn gas_used(&self) -> i64 {
        self.teller.gas_used()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaon_state::MemMvccStore;
    use kaon_types::fixed::FixedPoint;
    use std::time::Duration;

    struct NoVm;
    impl VirtualMachine for NoVm {
        fn execute(
            &self,
            _host: &mut dyn HostApi,
            _contract: &str,
            _method: &str,
            _args: &str,
        ) -> Result<Vec<String>, VmError> {
            Err(VmError::Host("no vm".into()))
        }
    }

    fn test_host(state: &mut dyn StateAccess) -> Host<'_> {
        let block = BlockContext {
            number: 7,
            witness: "w1".into(),
            time: 42,
            parent_hash: [0u8; 32],
        };
        let tx = TxContext {
            hash: [9u8; 32],
            publisher: "alice".into(),
            auth: ["alice".to_string()].into_iter().collect(),
            gas_limit: 1_000_000,
            gas_ratio: 100,
            is_base: false,
        };
        let mut host = Host::new(
            state,
            Arc::new(NoVm),
            block,
            tx,
            Instant::now() + Duration::from_secs(5),
        );
        host.enter_action("c1", "test");
        host
    }

    #[test]
    fn dispatch_matches_capability_table() {
        let mut names: Vec<&str> = DISPATCH.iter().map(|(n, _)| *n).collect();
        let mut expected: Vec<&str> = kaon_api::vm::HOST_CAPABILITIES.to_vec();
        names.sort_unstable();
        expected.sort_unstable();
        assert_eq!(names, expected);
    }

    #[test]
    fn set_get_through_dispatch() {
        let mut store = MemMvccStore::new();
        let mut host = test_host(&mut store);
        host.call("set", &[DbValue::Str("k".into()), DbValue::Int(3)])
            .unwrap();
        let got = host.call("get", &[DbValue::Str("k".into())]).unwrap();
        assert_eq!(got, DbValue::Int(3));
        assert!(host.gas_used() > 0);
    }

    #[test]
    fn unknown_capability_is_host_error() {
        let mut store = MemMvccStore::new();
        let mut host = test_host(&mut store);
        assert!(matches!(
            host.call("frobnicate", &[]),
            Err(VmError::Host(_))
        ));
    }

    #[test]
    fn gas_limit_is_enforced() {
        let mut store = MemMvccStore::new();
        let mut host = test_host(&mut store);
        host.tx.gas_limit = 150;
        host.call("has", &[DbValue::Str("k".into())]).unwrap();
        assert!(matches!(
            host.call("has", &[DbValue::Str("k".into())]),
            Err(VmError::GasRunOut)
        ));
    }

    #[test]
    fn deadline_is_enforced() {
        let mut store = MemMvccStore::new();
        let mut host = test_host(&mut store);
        host.deadline = Instant::now() - Duration::from_millis(1);
        assert!(matches!(
            host.call("get", &[DbValue::Str("k".into())]),
            Err(VmError::Timeout)
        ));
    }

    #[test]
    fn transfer_moves_balance_and_respects_auth() {
        let mut store = MemMvccStore::new();
        {
            let mut visitor = Visitor::new(&mut store);
            visitor
                .set_token_balance(NATIVE_TOKEN, "alice", FixedPoint::new(100, 0))
                .unwrap();
        }
        let mut host = test_host(&mut store);
        host.call(
            "transfer",
            &[
                DbValue::Str("alice".into()),
                DbValue::Str("carol".into()),
                DbValue::Str("1.5".into()),
            ],
        )
        .unwrap();
        let carol = host
            .call("balance_of", &[DbValue::Str("carol".into())])
            .unwrap();
        assert_eq!(
            carol,
            DbValue::Fixed(FixedPoint::new(150_000_000, NATIVE_DECIMALS))
        );

        // bob's authority is not carried by this tx.
        assert!(matches!(
            host.call(
                "transfer",
                &[
                    DbValue::Str("bob".into()),
                    DbValue::Str("carol".into()),
                    DbValue::Str("1".into()),
                ],
            ),
            Err(VmError::Runtime(_))
        ));
    }

    #[test]
    fn transfer_rejects_overdraft() {
        let mut store = MemMvccStore::new();
        let mut host = test_host(&mut store);
        assert!(matches!(
            host.call(
                "transfer",
                &[
                    DbValue::Str("alice".into()),
                    DbValue::Str("bob".into()),
                    DbValue::Str("5".into()),
                ],
            ),
            Err(VmError::BalanceNotEnough(_))
        ));
    }

    #[test]
    fn block_info_exposes_slot_time() {
        let mut store = MemMvccStore::new();
        let mut host = test_host(&mut store);
        let info = host.call("block_info", &[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(info.as_str().unwrap()).unwrap();
        assert_eq!(parsed["number"], 7);
        assert_eq!(parsed["time"], 42);
    }
}
