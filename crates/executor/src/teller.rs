// Path: crates/executor/src/teller.rs
//! Gas and RAM cost accounting during one transaction execution.
//!
//! Costs accrue per host call; at the end of the transaction the teller
//! settles them: the gas fee is deducted from the publisher's native token
//! balance and RAM bytes are deducted from each payer's `ram` balance.

use kaon_state::visitor::{Visitor, NATIVE_DECIMALS, NATIVE_TOKEN};
use kaon_types::error::VmError;
use kaon_types::fixed::FixedPoint;
use std::collections::BTreeMap;

/// The execution cost of a host call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cost {
    /// Compute units.
    pub cpu: i64,
    /// Bandwidth units.
    pub net: i64,
    /// Storage bytes written.
    pub data: i64,
}

impl Cost {
    /// A pure compute cost.
    pub fn cpu(units: i64) -> Self {
        Self {
            cpu: units,
            ..Default::default()
        }
    }

    /// The gas equivalent of this cost (storage is charged as RAM, not gas).
    pub fn to_gas(&self) -> i64 {
        self.cpu.saturating_add(self.net)
    }
}

/// Accumulates costs for one transaction and settles them against balances.
#[derive(Debug, Default)]
pub struct Teller {
    gas_used: i64,
    ram_used: BTreeMap<String, i64>,
}

impl Teller {
    /// Creates an empty teller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cost; RAM bytes are attributed to `payer`.
    pub fn pay(&mut self, cost: Cost, payer: &str) {
        self.gas_used = self.gas_used.saturating_add(cost.to_gas());
        if cost.data != 0 {
            *self.ram_used.entry(payer.to_string()).or_default() += cost.data;
        }
    }

    /// Gas accrued so far, in gas units.
    pub fn gas_used(&self) -> i64 {
        self.gas_used
    }

    /// RAM bytes accrued per payer.
    pub fn ram_used(&self) -> &BTreeMap<String, i64> {
        &self.ram_used
    }

    /// Drops all RAM charges, keeping the gas. Called when a failed
    /// transaction rolls back its writes: the storage never materialized,
    /// but the compute happened.
    pub fn clear_ram(&mut self) {
        self.ram_used.clear();
    }

    /// The native-token fee for the accrued gas at the given ratio
    /// (100 = 1.00x). One gas unit costs 10^-8 kaon at ratio 100.
    pub fn fee(&self, gas_ratio: i64) -> FixedPoint {
        FixedPoint::new(
            gas_ratio.saturating_mul(self.gas_used) / 100,
            NATIVE_DECIMALS,
        )
    }

    /// Settles the accrued costs: deducts the gas fee from `payer`'s native
    /// balance and RAM bytes from each payer's RAM balance. Balances must
    /// cover the charges.
    pub fn settle(
        &self,
        visitor: &mut Visitor<'_>,
        payer: &str,
        gas_ratio: i64,
    ) -> Result<(), VmError> {
        let fee = self.fee(gas_ratio);
        if fee.value > 0 {
            let balance = visitor
                .token_balance(NATIVE_TOKEN, payer)
                .map_err(|e| VmError::Runtime(e.to_string()))?;
            let remaining = balance
                .checked_sub(&fee)
                .map_err(|e| VmError::Runtime(e.to_string()))?;
            if remaining.is_negative() {
                return Err(VmError::BalanceNotEnough(format!(
                    "{payer} cannot pay gas fee {fee}"
                )));
            }
            visitor
                .set_token_balance(NATIVE_TOKEN, payer, remaining)
                .map_err(|e| VmError::Runtime(e.to_string()))?;
        }
        for (ram_payer, bytes_count) in &self.ram_used {
            let current = visitor
                .ram_balance(ram_payer)
                .map_err(|e| VmError::Runtime(e.to_string()))?;
            if current - bytes_count < 0 {
                return Err(VmError::BalanceNotEnough(format!(
                    "{ram_payer} needs {bytes_count} ram bytes, has {current}"
                )));
            }
            visitor
                .set_ram_balance(ram_payer, current - bytes_count)
                .map_err(|e| VmError::Runtime(e.to_string()))?;
        }
        Ok(())
    }
}
