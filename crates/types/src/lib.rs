// Path: crates/types/src/lib.rs
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
//! Core data structures shared by every Kaon subsystem: transactions,
//! blocks, receipts, fixed-point amounts, the canonical codec, node
//! configuration, and the error taxonomy.

pub mod block;
pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod fixed;
pub mod receipt;
pub mod time;
pub mod tx;

pub use kaon_crypto::Hash;

/// An account identity string (base58 of the account public key).
pub type AccountId = String;
