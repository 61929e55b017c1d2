// Path: crates/state/src/lib.rs
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
//! The multi-version state store and the typed visitor over it.

pub mod mvcc;
pub mod value;
pub mod visitor;

pub use mvcc::MemMvccStore;
pub use visitor::Visitor;
