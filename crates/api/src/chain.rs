// Path: crates/api/src/chain.rs
//! The durable block chain store contract.

use kaon_types::block::Block;
use kaon_types::error::ChainError;
use kaon_types::receipt::Receipt;
use kaon_types::tx::Tx;
use kaon_types::Hash;

/// The append-only log of finalized blocks, with lookup indices by height,
/// head hash, and transaction hash. `push` is only ever invoked by block
/// cache flush, after the block is irreversible.
pub trait ChainStore: Send + Sync {
    /// Appends a finalized block, indexing its transactions, receipts, and
    /// any delayed transactions it contains. Atomic: either the whole block
    /// and all indices land, or nothing does.
    fn push(&self, block: &Block) -> Result<(), ChainError>;

    /// The number of blocks in the chain (genesis included).
    fn length(&self) -> u64;

    /// The most recently pushed block.
    fn top(&self) -> Result<Block, ChainError>;

    /// Looks up a block by its number.
    fn block_by_number(&self, number: i64) -> Result<Block, ChainError>;

    /// Looks up a block by its head hash.
    fn block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError>;

    /// True when a transaction with this hash is on the finalized chain.
    fn has_tx(&self, hash: &Hash) -> bool;

    /// Looks up a finalized transaction by its hash.
    fn tx(&self, hash: &Hash) -> Result<Tx, ChainError>;

    /// Looks up a receipt by the hash of its transaction.
    fn receipt_by_tx_hash(&self, tx_hash: &Hash) -> Result<Receipt, ChainError>;

    /// Looks up a receipt by its own hash.
    fn receipt_by_hash(&self, hash: &Hash) -> Result<Receipt, ChainError>;

    /// All finalized delayed transactions whose deferred execution may still
    /// be outstanding. Used to rebuild the defer index on cold start.
    fn all_delay_txs(&self) -> Result<Vec<Tx>, ChainError>;
}
