// Path: crates/pob/src/schedule.rs
//! The round-robin witness schedule and per-witness confirmation
//! watermarks.
//!
//! Node-scoped on purpose: simulator tests run several nodes with
//! independent schedules in one process.

use kaon_types::time::NANOS_PER_SEC;
use std::collections::HashMap;
use std::time::Duration;

/// The ordered witness list plus slot arithmetic and watermarks.
#[derive(Debug, Clone)]
pub struct WitnessSchedule {
    witnesses: Vec<String>,
    slot_length_ns: i64,
    /// Per witness: the smallest block number it has not yet signed.
    watermarks: HashMap<String, i64>,
}

impl WitnessSchedule {
    /// Creates a schedule over the pre-declared witness list.
    pub fn new(witnesses: Vec<String>, slot_length_secs: i64) -> Self {
        Self {
            witnesses,
            slot_length_ns: slot_length_secs.saturating_mul(NANOS_PER_SEC),
            watermarks: HashMap::new(),
        }
    }

    /// Number of witnesses.
    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    /// True when no witnesses are declared (an observer-only chain).
    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }

    /// The declared witness list, in schedule order.
    pub fn witnesses(&self) -> &[String] {
        &self.witnesses
    }

    /// True when `id` is a declared witness.
    pub fn contains(&self, id: &str) -> bool {
        self.witnesses.iter().any(|w| w == id)
    }

    /// Slot length in nanoseconds.
    pub fn slot_length_ns(&self) -> i64 {
        self.slot_length_ns
    }

    /// The slot index containing the given time.
    pub fn slot_of_time(&self, time_ns: i64) -> i64 {
        time_ns / self.slot_length_ns
    }

    /// The witness entitled to produce in a slot.
    pub fn witness_of_slot(&self, slot: i64) -> Option<&str> {
        if self.witnesses.is_empty() {
            return None;
        }
        let index = slot.rem_euclid(self.witnesses.len() as i64) as usize;
        self.witnesses.get(index).map(String::as_str)
    }

    /// The witness entitled to produce at the given time.
    pub fn witness_of_time(&self, time_ns: i64) -> Option<&str> {
        self.witness_of_slot(self.slot_of_time(time_ns))
    }

    /// Time remaining until the next slot boundary.
    pub fn time_until_next_slot(&self, now_ns: i64) -> Duration {
        let current = self.slot_of_time(now_ns);
        let next_start = (current + 1).saturating_mul(self.slot_length_ns);
        Duration::from_nanos(next_start.saturating_sub(now_ns).max(0) as u64)
    }

    /// The confirmation threshold: ⌊2N/3⌋ + 1 distinct witnesses.
    pub fn confirm_threshold(&self) -> i64 {
        self.witnesses.len() as i64 * 2 / 3 + 1
    }

    /// Records that `witness` signed a block at `number`; returns the
    /// watermark to stamp on that block's cache node (the smallest number
    /// the witness had not confirmed before this block).
    pub fn update_watermark(&mut self, witness: &str, number: i64) -> i64 {
        let mark = self.watermarks.get(witness).copied().unwrap_or(0);
        if number >= mark {
            self.watermarks.insert(witness.to_string(), number + 1);
        }
        mark
    }

    /// The current watermark of a witness.
    pub fn watermark(&self, witness: &str) -> i64 {
        self.watermarks.get(witness).copied().unwrap_or(0)
    }
}
