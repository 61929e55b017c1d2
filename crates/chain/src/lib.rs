// Path: crates/chain/src/lib.rs
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
//! The multi-branch block cache and the durable append-only chain store.

pub mod cache;
pub mod genesis;
pub mod store;

pub use cache::{BlockCache, CacheError, CacheNode};
pub use store::{MemChainStore, RedbChainStore};
