// Path: crates/executor/src/lib.rs
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
//! Deterministic block and transaction execution.
//!
//! The verifier has two entry points: `generate` drains a transaction
//! iterator into a new block under a production deadline, and `verify`
//! re-executes a received block positionally and demands bit-identical
//! receipts and roots. Both run against a forked snapshot of the state
//! store and tag the committed result with the block's head hash.

pub mod host;
pub mod native;
pub mod teller;

use kaon_api::chain::ChainStore;
use kaon_api::state::{MvccStore, StateAccess, StateOverlay};
use kaon_api::vm::VirtualMachine;
use kaon_state::Visitor;
use kaon_types::block::{Block, BlockHead};
use kaon_types::error::{BlockError, VmError};
use kaon_types::receipt::{Receipt, Status, StatusCode};
use kaon_types::tx::{Action, Tx};
use kaon_types::Hash;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use host::{BlockContext, Host, TxContext};
use native::{NativeVm, BASE_CONTRACT};

/// Budget configuration for `generate` and `verify`.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
    /// Hard stop for the whole block.
    pub deadline: Instant,
    /// Wall-clock budget for one transaction.
    pub tx_time_limit: Duration,
}

impl ExecConfig {
    /// A budget starting now with the given total and per-tx limits.
    pub fn with_limits(total: Duration, per_tx: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            tx_time_limit: per_tx,
        }
    }
}

/// The head fields a producer fixes before generation fills in the roots.
#[derive(Debug, Clone)]
pub struct HeadTemplate {
    /// The parent head hash.
    pub parent_hash: Hash,
    /// The new block number.
    pub number: i64,
    /// The producing witness.
    pub witness: String,
    /// The slot time in nanoseconds.
    pub time: i64,
}

/// A transaction excluded during generation, with the reason.
#[derive(Debug)]
pub struct DroppedTx {
    /// The excluded transaction.
    pub tx: Tx,
    /// Why it was excluded.
    pub reason: String,
}

/// The deterministic block executor.
pub struct Verifier {
    vm: Arc<dyn VirtualMachine>,
    chain: Arc<dyn ChainStore>,
}

impl Verifier {
    /// Creates a verifier over the native VM.
    pub fn new(chain: Arc<dyn ChainStore>) -> Self {
        Self {
            vm: Arc::new(NativeVm::new()),
            chain,
        }
    }

    /// Creates a verifier with a custom VM (the scripting collaborator).
    pub fn with_vm(chain: Arc<dyn ChainStore>, vm: Arc<dyn VirtualMachine>) -> Self {
        Self { vm, chain }
    }

    /// The base transaction for a block head: producer bookkeeping at
    /// position 0, synthesized (never gossiped) and exempt from dedup.
    pub fn base_tx(witness: &str, number: i64, time: i64) -> Tx {
        let mut tx = Tx::new(
            vec![Action::new(
                BASE_CONTRACT,
                "reward",
                serde_json::json!([witness, number.to_string()]).to_string(),
            )],
            time,
            time + 1,
            i64::MAX / 2,
            100,
            0,
        );
        tx.publisher = BASE_CONTRACT.to_string();
        tx
    }

    fn block_context(head: &HeadTemplate) -> BlockContext {
        BlockContext {
            number: head.number,
            witness: head.witness.clone(),
            time: head.time,
            parent_hash: head.parent_hash,
        }
    }

    fn tx_context(tx: &Tx, is_base: bool) -> TxContext {
        let mut auth: BTreeSet<String> = BTreeSet::new();
        auth.insert(tx.publisher.clone());
        for sig in &tx.signatures {
            auth.insert(kaon_crypto::account_id_from_pubkey(&sig.pubkey));
        }
        TxContext {
            hash: tx.hash(),
            publisher: tx.publisher.clone(),
            auth,
            gas_limit: tx.gas_limit,
            gas_ratio: tx.gas_ratio,
            is_base,
        }
    }

    fn failure_status(err: &VmError) -> Status {
        let code = match err {
            VmError::GasRunOut => StatusCode::GasRunOut,
            VmError::Timeout => StatusCode::Timeout,
            VmError::ParamErr(_) => StatusCode::ParamErr,
            VmError::BalanceNotEnough(_) => StatusCode::BalanceNotEnough,
            VmError::Runtime(_) | VmError::Host(_) | VmError::InvalidDbValType => {
                StatusCode::Runtime
            }
        };
        Status {
            code,
            message: err.to_string(),
        }
    }

    /// Pre-execution validity of one candidate: expiry, chain dedup, and
    /// deferred-tx consistency. Errors here exclude the tx from the block.
    fn precheck(&self, tx: &Tx, block_time: i64) -> Result<(), String> {
        if tx.is_expired(block_time) {
            return Err("expired".into());
        }
        if self.chain.has_tx(&tx.hash()) {
            return Err("already on chain".into());
        }
        if let Some(referred) = &tx.referred_tx {
            let original = self
                .chain
                .tx(referred)
                .map_err(|e| format!("referred tx unavailable: {e}"))?;
            tx.verify_defer(&original).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Executes one transaction against a per-tx overlay over `state`.
    ///
    /// Success applies the overlay (including gas settlement); an action
    /// failure rolls the overlay back, keeps the gas charge, and still
    /// yields a receipt. A `Timeout` or an unpayable gas fee excludes the
    /// transaction entirely.
    fn execute_tx(
        &self,
        state: &mut dyn StateAccess,
        block: &BlockContext,
        tx: &Tx,
        is_base: bool,
        tx_time_limit: Duration,
    ) -> Result<Receipt, String> {
        // A delay transaction only schedules its future materialization;
        // its actions run when the deferred copy is included.
        if tx.is_delay() {
            return self.schedule_delay_tx(state, tx);
        }
        let ctx = Self::tx_context(tx, is_base);
        let deadline = Instant::now() + tx_time_limit;
        let mut overlay = StateOverlay::new(&*state);
        let mut host = Host::new(&mut overlay, self.vm.clone(), block.clone(), ctx, deadline);

        let mut returns = Vec::with_capacity(tx.actions.len());
        let mut failure: Option<VmError> = None;
        for action in &tx.actions {
            host.enter_action(&action.contract, &action.name);
            if let Err(e) = host.charge_action_entry() {
                failure = Some(e);
                break;
            }
            match self
                .vm
                .execute(&mut host, &action.contract, &action.name, &action.data)
            {
                Ok(action_returns) => match serde_json::to_string(&action_returns) {
                    Ok(encoded) => returns.push(encoded),
                    Err(e) => {
                        failure = Some(VmError::Runtime(e.to_string()));
                        break;
                    }
                },
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            None => {
                // Settle costs inside the same overlay, then publish it.
                let entries = host.take_entries();
                let teller = std::mem::take(host.teller_mut());
                if !is_base {
                    let mut visitor = Visitor::new(&mut overlay);
                    teller
                        .settle(&mut visitor, &tx.publisher, tx.gas_ratio)
                        .map_err(|e| format!("gas settlement failed: {e}"))?;
                }
                let writes = overlay.into_writes();
                apply_writes(state, writes);
                Ok(Receipt {
                    tx_hash: tx.hash(),
                    status: Status::success(),
                    gas_usage: teller.gas_used(),
                    ram_usage: teller.ram_used().clone(),
                    returns,
                    receipts: entries,
                })
            }
            Some(VmError::Timeout) => Err("per-tx time limit exceeded".into()),
            Some(err) => {
                // Roll back the writes, keep (and settle) the gas.
                let mut teller = std::mem::take(host.teller_mut());
                teller.clear_ram();
                let writes = {
                    let mut gas_overlay = StateOverlay::new(&*state);
                    let mut visitor = Visitor::new(&mut gas_overlay);
                    teller
                        .settle(&mut visitor, &tx.publisher, tx.gas_ratio)
                        .map_err(|e| format!("gas settlement failed: {e}"))?;
                    gas_overlay.into_writes()
                };
                apply_writes(state, writes);
                Ok(Receipt {
                    tx_hash: tx.hash(),
                    status: Self::failure_status(&err),
                    gas_usage: teller.gas_used(),
                    ram_usage: Default::default(),
                    returns: Vec::new(),
                    receipts: Vec::new(),
                })
            }
        }
    }

    /// Charges the flat scheduling fee for a delay transaction without
    /// running its actions.
    fn schedule_delay_tx(&self, state: &mut dyn StateAccess, tx: &Tx) -> Result<Receipt, String> {
        /// Flat gas for registering a deferred execution.
        const SCHEDULE_GAS: i64 = 200;

        let mut teller = teller::Teller::new();
        teller.pay(teller::Cost::cpu(SCHEDULE_GAS), &tx.publisher);
        let writes = {
            let mut overlay = StateOverlay::new(&*state);
            let mut visitor = Visitor::new(&mut overlay);
            teller
                .settle(&mut visitor, &tx.publisher, tx.gas_ratio)
                .map_err(|e| format!("gas settlement failed: {e}"))?;
            overlay.into_writes()
        };
        apply_writes(state, writes);
        Ok(Receipt {
            tx_hash: tx.hash(),
            status: Status::success(),
            gas_usage: teller.gas_used(),
            ram_usage: Default::default(),
            returns: Vec::new(),
            receipts: Vec::new(),
        })
    }

    /// Produces a block from the head template by draining `txs` until the
    /// deadline. The store must be positioned on the parent snapshot; on
    /// return it is committed and tagged with the new head hash.
    pub fn generate(
        &self,
        template: &HeadTemplate,
        store: &mut dyn MvccStore,
        txs: &mut dyn Iterator<Item = Tx>,
        cfg: &ExecConfig,
    ) -> Result<(Block, Vec<DroppedTx>), BlockError> {
        let block_ctx = Self::block_context(template);
        store.fork();

        let base = Self::base_tx(&template.witness, template.number, template.time);
        let base_receipt = self
            .execute_tx(&mut *store, &block_ctx, &base, true, cfg.tx_time_limit)
            .map_err(|e| {
                store.rollback();
                BlockError::ExecDivergence(format!("base tx failed: {e}"))
            })?;

        let mut included = vec![base];
        let mut receipts = vec![base_receipt];
        let mut dropped = Vec::new();

        for tx in txs {
            if Instant::now() >= cfg.deadline {
                break;
            }
            if let Err(reason) = self.precheck(&tx, template.time) {
                tracing::debug!(target: "executor", reason, "tx dropped during generation");
                dropped.push(DroppedTx { tx, reason });
                continue;
            }
            match self.execute_tx(&mut *store, &block_ctx, &tx, false, cfg.tx_time_limit) {
                Ok(receipt) => {
                    included.push(tx);
                    receipts.push(receipt);
                }
                Err(reason) => {
                    tracing::debug!(target: "executor", reason, "tx dropped during generation");
                    dropped.push(DroppedTx { tx, reason });
                }
            }
        }

        let mut block = Block {
            head: BlockHead {
                version: 0,
                parent_hash: template.parent_hash,
                txs_hash: [0u8; 32],
                merkle_hash: [0u8; 32],
                info: Vec::new(),
                number: template.number,
                witness: template.witness.clone(),
                time: template.time,
            },
            sign: Default::default(),
            txs: included,
            receipts,
        };
        block.seal_roots();

        store.commit();
        store.tag(&kaon_crypto::base58_encode(&block.head_hash()));
        tracing::debug!(
            target: "executor",
            number = block.head.number,
            txs = block.txs.len(),
            dropped = dropped.len(),
            "block generated"
        );
        Ok((block, dropped))
    }

    /// Re-executes `block` against the parent snapshot the store is
    /// positioned on. Receipts must match positionally (bit-exact hashes)
    /// and the body roots must match the head. On success the store is
    /// committed and tagged with the block's head hash.
    pub fn verify(
        &self,
        block: &Block,
        store: &mut dyn MvccStore,
        cfg: &ExecConfig,
    ) -> Result<(), BlockError> {
        if block.txs.len() != block.receipts.len() {
            return Err(BlockError::LengthMismatch);
        }
        let expected_base = Self::base_tx(&block.head.witness, block.head.number, block.head.time);
        match block.txs.first() {
            Some(first) if *first == expected_base => {}
            _ => {
                return Err(BlockError::ExecDivergence(
                    "base tx does not match head".into(),
                ))
            }
        }
        if block.head.txs_hash != Block::compute_txs_hash(&block.txs) {
            return Err(BlockError::WrongHeadHash);
        }

        let template = HeadTemplate {
            parent_hash: block.head.parent_hash,
            number: block.head.number,
            witness: block.head.witness.clone(),
            time: block.head.time,
        };
        let block_ctx = Self::block_context(&template);
        store.fork();

        for (index, (tx, expected)) in block.txs.iter().zip(&block.receipts).enumerate() {
            if Instant::now() >= cfg.deadline {
                store.rollback();
                return Err(BlockError::ExecDivergence("verify deadline exceeded".into()));
            }
            let is_base = index == 0;
            if !is_base {
                if let Err(reason) = self.precheck(tx, block.head.time) {
                    store.rollback();
                    return Err(BlockError::ExecDivergence(format!(
                        "tx {index} invalid: {reason}"
                    )));
                }
            }
            let receipt = match self.execute_tx(&mut *store, &block_ctx, tx, is_base, cfg.tx_time_limit)
            {
                Ok(receipt) => receipt,
                Err(reason) => {
                    store.rollback();
                    return Err(BlockError::ExecDivergence(format!(
                        "tx {index} not executable: {reason}"
                    )));
                }
            };
            if receipt.hash() != expected.hash() {
                store.rollback();
                return Err(BlockError::ExecDivergence(format!(
                    "receipt {index} differs"
                )));
            }
        }

        if block.head.merkle_hash != Block::compute_merkle_hash(&block.receipts) {
            store.rollback();
            return Err(BlockError::ExecDivergence("merkle root differs".into()));
        }

        store.commit();
        store.tag(&kaon_crypto::base58_encode(&block.head_hash()));
        Ok(())
    }

    /// Trial-executes a transaction against the snapshot the store is
    /// positioned on, without mutating it. Backs the RPC `exec_tx` call.
    pub fn try_tx(
        &self,
        store: &mut dyn MvccStore,
        head: &HeadTemplate,
        tx: &Tx,
        limit: Duration,
    ) -> Receipt {
        let block_ctx = Self::block_context(head);
        store.fork();
        let result = self.execute_tx(&mut *store, &block_ctx, tx, false, limit);
        store.rollback();
        match result {
            Ok(receipt) => receipt,
            Err(reason) => Receipt {
                tx_hash: tx.hash(),
                status: Status {
                    code: StatusCode::Unknown,
                    message: reason,
                },
                ..Default::default()
            },
        }
    }
}

fn apply_writes(
    state: &mut dyn StateAccess,
    writes: std::collections::BTreeMap<Vec<u8>, Option<Vec<u8>>>,
) {
    for (key, value_opt) in writes {
        let outcome = match value_opt {
            Some(value) => state.put(&key, &value),
            None => state.del(&key),
        };
        if let Err(e) = outcome {
            // Writes target the in-memory overlay of the fork; failure here
            // means the current version was pruned under our feet.
            tracing::error!(target: "executor", error = %e, "state write lost");
        }
    }
}
