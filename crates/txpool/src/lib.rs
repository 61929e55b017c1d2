// Path: crates/txpool/src/lib.rs
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
//! The transaction pool: admission, duplicate detection along the head's
//! ancestry, a gas-price-ordered drain iterator, and gossip coupling.
//!
//! One writer path guarded by a reader-writer lock; iterator snapshots and
//! existence queries run under the read side.

pub mod bloom;
pub mod defer;

use bloom::BlockBloom;
use kaon_api::chain::ChainStore;
use kaon_api::transport::{MessageType, Priority, Transport};
use kaon_types::block::Block;
use kaon_types::codec;
use kaon_types::config::TxPoolConfig;
use kaon_types::error::AdmissionError;
use kaon_types::time::{now_ns, secs_to_ns};
use kaon_types::tx::Tx;
use kaon_types::Hash;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a transaction entered the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxSource {
    /// Submitted over the local RPC; admitted transactions are gossiped.
    Local,
    /// Received from a peer; admitted without re-broadcast.
    Remote,
}

/// Result of a duplicate probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found {
    /// In the pending set.
    Pending,
    /// On the ancestor chain within the lookback horizon.
    Chain,
    /// Not seen.
    Missing,
}

struct PendingEntry {
    tx: Tx,
    seq: u64,
}

/// Dedup record for one cached/finalized block.
struct BlockRecord {
    parent: Hash,
    number: i64,
    bloom: BlockBloom,
}

struct PoolInner {
    pending: HashMap<Hash, PendingEntry>,
    next_seq: u64,
    blocks: HashMap<Hash, BlockRecord>,
    head: Option<Hash>,
}

/// The transaction pool.
pub struct TxPool {
    config: TxPoolConfig,
    chain: Arc<dyn ChainStore>,
    transport: Arc<dyn Transport>,
    inner: RwLock<PoolInner>,
}

impl TxPool {
    /// Creates an empty pool.
    pub fn new(
        config: TxPoolConfig,
        chain: Arc<dyn ChainStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            chain,
            transport,
            inner: RwLock::new(PoolInner {
                pending: HashMap::new(),
                next_seq: 0,
                blocks: HashMap::new(),
                head: None,
            }),
        }
    }

    /// Admits a transaction, using the wall clock for the time window.
    pub fn add(&self, tx: Tx, source: TxSource) -> Result<(), AdmissionError> {
        self.add_at(tx, source, now_ns())
    }

    /// Admission with an explicit `now`, for deterministic tests.
    pub fn add_at(&self, tx: Tx, source: TxSource, now: i64) -> Result<(), AdmissionError> {
        self.check_time(&tx, now)?;
        if tx.gas_ratio < self.config.min_gas_ratio {
            return Err(AdmissionError::GasPrice);
        }
        tx.verify_self().map_err(AdmissionError::Verify)?;

        let hash = tx.hash();
        {
            let mut inner = self.inner.write();
            if inner.pending.len() >= self.config.cache_size {
                return Err(AdmissionError::CacheFull);
            }
            match self.probe(&inner, &hash) {
                Found::Pending | Found::Chain => return Err(AdmissionError::Dup),
                Found::Missing => {}
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.pending.insert(hash, PendingEntry { tx: tx.clone(), seq });
        }

        if source == TxSource::Local {
            let payload = codec::to_bytes_canonical(&tx);
            if let Err(e) = self
                .transport
                .broadcast(MessageType::Tx, payload, Priority::Urgent)
            {
                tracing::warn!(target: "txpool", error = %e, "tx broadcast failed");
            }
        }
        Ok(())
    }

    /// Admits the materialization of a finalized delayed transaction.
    ///
    /// Pending-set duplicates are treated as already-admitted (no error);
    /// chain duplicates still reject, so a defer fires at most once per
    /// branch history.
    pub fn add_defer(&self, referred_hash: &Hash) -> Result<(), AdmissionError> {
        self.add_defer_at(referred_hash, now_ns())
    }

    /// Deferred admission with an explicit `now`, for deterministic tests.
    pub fn add_defer_at(&self, referred_hash: &Hash, now: i64) -> Result<(), AdmissionError> {
        let original = self
            .chain
            .tx(referred_hash)
            .map_err(|e| AdmissionError::Verify(format!("referred tx unavailable: {e}")))?;
        let tx = Tx::materialize_defer(&original);
        if tx.is_expired(now) {
            return Err(AdmissionError::Time);
        }
        let hash = tx.hash();

        let mut inner = self.inner.write();
        if inner.pending.contains_key(&hash) {
            return Ok(());
        }
        if inner.pending.len() >= self.config.cache_size {
            return Err(AdmissionError::CacheFull);
        }
        if self.chain_dup(&inner, &hash) {
            return Err(AdmissionError::Dup);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.pending.insert(hash, PendingEntry { tx, seq });
        Ok(())
    }

    fn check_time(&self, tx: &Tx, now: i64) -> Result<(), AdmissionError> {
        let window = secs_to_ns(self.config.admit_window_secs);
        if (tx.time - now).abs() > window || tx.is_expired(now) {
            return Err(AdmissionError::Time);
        }
        Ok(())
    }

    fn chain_dup(&self, inner: &PoolInner, hash: &Hash) -> bool {
        self.chain_dup_from(inner, hash, inner.head)
    }

    fn chain_dup_from(&self, inner: &PoolInner, hash: &Hash, start: Option<Hash>) -> bool {
        let mut remaining = self.config.lookback;
        let mut cursor = start;
        while remaining > 0 {
            let Some(record) = cursor.and_then(|h| inner.blocks.get(&h)) else {
                break;
            };
            if record.bloom.contains(hash) {
                return true;
            }
            cursor = Some(record.parent);
            remaining -= 1;
        }
        // Records only reach back to node start; the durable index covers
        // the rest of the horizon.
        self.chain.has_tx(hash)
    }

    fn probe(&self, inner: &PoolInner, hash: &Hash) -> Found {
        if inner.pending.contains_key(hash) {
            return Found::Pending;
        }
        if self.chain_dup(inner, hash) {
            return Found::Chain;
        }
        Found::Missing
    }

    /// Duplicate probe for block validation: pending, chain-within-horizon,
    /// or unseen.
    pub fn exists(&self, hash: &Hash) -> Found {
        let inner = self.inner.read();
        self.probe(&inner, hash)
    }

    /// Duplicate probe along the ancestry of an arbitrary block (used when
    /// validating a block that extends a non-head branch).
    pub fn exists_from(&self, hash: &Hash, from_block: &Hash) -> Found {
        let inner = self.inner.read();
        if inner.pending.contains_key(hash) {
            return Found::Pending;
        }
        if self.chain_dup_from(&inner, hash, Some(*from_block)) {
            return Found::Chain;
        }
        Found::Missing
    }

    /// Number of pending transactions.
    pub fn pending_len(&self) -> usize {
        self.inner.read().pending.len()
    }

    /// Snapshot of the pending set ordered by gas ratio (desc), then
    /// arrival (asc). The producer drains this during generation.
    pub fn iter_priority(&self) -> impl Iterator<Item = Tx> {
        let inner = self.inner.read();
        let mut entries: Vec<(i64, u64, Tx)> = inner
            .pending
            .values()
            .map(|entry| (entry.tx.gas_ratio, entry.seq, entry.tx.clone()))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        entries.into_iter().map(|(_, _, tx)| tx)
    }

    /// Records a block that reached the cache (linked); removes its
    /// transactions from the pending set when it extends the head branch.
    pub fn on_block_linked(&self, block: &Block, on_head_branch: bool) {
        let mut inner = self.inner.write();
        let mut bloom = BlockBloom::new();
        for tx in &block.txs {
            let hash = tx.hash();
            bloom.insert(&hash);
            if on_head_branch {
                inner.pending.remove(&hash);
            }
        }
        let hash = block.head_hash();
        inner.blocks.insert(
            hash,
            BlockRecord {
                parent: block.head.parent_hash,
                number: block.head.number,
                bloom,
            },
        );
        if on_head_branch {
            inner.head = Some(hash);
        }

        // Records older than the horizon below the head can no longer be
        // reached by a dedup walk.
        let floor = block.head.number - self.config.lookback as i64;
        if floor > 0 {
            inner.blocks.retain(|_, record| record.number >= floor);
        }
    }

    /// Drops pending transactions that expired before the new irreversible
    /// block's time.
    pub fn on_lib_advance(&self, lib_time: i64) {
        let mut inner = self.inner.write();
        let before = inner.pending.len();
        inner.pending.retain(|_, entry| !entry.tx.is_expired(lib_time));
        let dropped = before - inner.pending.len();
        if dropped > 0 {
            tracing::debug!(target: "txpool", dropped, "expired txs evicted at lib advance");
        }
    }

    /// Removes transactions the producer dropped during generation.
    pub fn remove_all(&self, hashes: impl IntoIterator<Item = Hash>) {
        let mut inner = self.inner.write();
        for hash in hashes {
            inner.pending.remove(&hash);
        }
    }

    /// The chain store this pool deduplicates against.
    pub fn chain(&self) -> &Arc<dyn ChainStore> {
        &self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaon_api::transport::ChannelTransport;
    use kaon_chain::MemChainStore;
    use kaon_types::block::BlockHead;
    use kaon_types::tx::Action;

    const NOW: i64 = 1_000_000_000_000_000;

    fn signed_tx(key: &kaon_crypto::KeyPair, gas_ratio: i64, nonce: u32) -> Tx {
        let mut tx = Tx::new(
            vec![Action::new(
                "token.kaon",
                "transfer",
                format!("[\"a\",\"b\",\"{nonce}\"]"),
            )],
            NOW,
            NOW + secs_to_ns(60),
            1_000_000,
            gas_ratio,
            0,
        );
        tx.sign_as_publisher(key);
        tx
    }

    fn pool_with(config: TxPoolConfig) -> (Arc<TxPool>, Arc<MemChainStore>) {
        let chain = Arc::new(MemChainStore::new());
        let (transport, _rx) = ChannelTransport::new();
        (
            Arc::new(TxPool::new(config, chain.clone(), Arc::new(transport))),
            chain,
        )
    }

    fn default_pool() -> (Arc<TxPool>, Arc<MemChainStore>) {
        pool_with(TxPoolConfig::default())
    }

    #[test]
    fn admission_happy_path_and_dup() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let tx = signed_tx(&key, 100, 0);
        pool.add_at(tx.clone(), TxSource::Remote, NOW).unwrap();
        assert_eq!(pool.pending_len(), 1);
        assert_eq!(
            pool.add_at(tx, TxSource::Remote, NOW).unwrap_err(),
            AdmissionError::Dup
        );
    }

    #[test]
    fn admit_window_boundary_is_inclusive() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let window = secs_to_ns(TxPoolConfig::default().admit_window_secs);

        // Created exactly at now + window: admitted.
        let mut at_edge = signed_tx(&key, 100, 1);
        at_edge.time = NOW + window;
        at_edge.expiration = at_edge.time + secs_to_ns(60);
        at_edge.sign_as_publisher(&key);
        pool.add_at(at_edge, TxSource::Remote, NOW).unwrap();

        // One nanosecond past: rejected.
        let mut past_edge = signed_tx(&key, 100, 2);
        past_edge.time = NOW + window + 1;
        past_edge.expiration = past_edge.time + secs_to_ns(60);
        past_edge.sign_as_publisher(&key);
        assert_eq!(
            pool.add_at(past_edge, TxSource::Remote, NOW).unwrap_err(),
            AdmissionError::Time
        );
    }

    #[test]
    fn expired_tx_is_time_error() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let mut tx = signed_tx(&key, 100, 3);
        tx.expiration = NOW - 1;
        tx.time = NOW - 2;
        tx.sign_as_publisher(&key);
        assert_eq!(
            pool.add_at(tx, TxSource::Remote, NOW).unwrap_err(),
            AdmissionError::Time
        );
    }

    #[test]
    fn low_gas_ratio_is_rejected() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let tx = signed_tx(&key, 99, 4);
        assert_eq!(
            pool.add_at(tx, TxSource::Remote, NOW).unwrap_err(),
            AdmissionError::GasPrice
        );
    }

    #[test]
    fn bad_signature_is_verify_error() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let mut tx = signed_tx(&key, 100, 5);
        tx.publisher = "not-the-signer".into();
        assert!(matches!(
            pool.add_at(tx, TxSource::Remote, NOW).unwrap_err(),
            AdmissionError::Verify(_)
        ));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut config = TxPoolConfig::default();
        config.cache_size = 2;
        let (pool, _) = pool_with(config);
        let key = kaon_crypto::KeyPair::generate();
        pool.add_at(signed_tx(&key, 100, 6), TxSource::Remote, NOW)
            .unwrap();
        pool.add_at(signed_tx(&key, 100, 7), TxSource::Remote, NOW)
            .unwrap();
        assert_eq!(
            pool.add_at(signed_tx(&key, 100, 8), TxSource::Remote, NOW)
                .unwrap_err(),
            AdmissionError::CacheFull
        );
    }

    #[test]
    fn local_adds_broadcast_remote_adds_do_not() {
        let chain = Arc::new(MemChainStore::new());
        let (transport, mut rx) = ChannelTransport::new();
        let pool = TxPool::new(TxPoolConfig::default(), chain, Arc::new(transport));
        let key = kaon_crypto::KeyPair::generate();

        pool.add_at(signed_tx(&key, 100, 9), TxSource::Local, NOW)
            .unwrap();
        let (mtype, _, priority) = rx.try_recv().unwrap();
        assert_eq!(mtype, MessageType::Tx);
        assert_eq!(priority, Priority::Urgent);

        pool.add_at(signed_tx(&key, 100, 10), TxSource::Remote, NOW)
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn priority_iterator_orders_by_ratio_then_arrival() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let cheap = signed_tx(&key, 100, 11);
        let pricey = signed_tx(&key, 300, 12);
        let mid_first = signed_tx(&key, 200, 13);
        let mid_second = signed_tx(&key, 200, 14);
        for tx in [&cheap, &pricey, &mid_first, &mid_second] {
            pool.add_at(tx.clone(), TxSource::Remote, NOW).unwrap();
        }
        let drained: Vec<Hash> = pool.iter_priority().map(|tx| tx.hash()).collect();
        assert_eq!(
            drained,
            vec![
                pricey.hash(),
                mid_first.hash(),
                mid_second.hash(),
                cheap.hash()
            ]
        );
    }

    fn block_with_txs(number: i64, parent: Hash, txs: Vec<Tx>) -> Block {
        let mut block = Block {
            head: BlockHead {
                version: 0,
                parent_hash: parent,
                txs_hash: [0u8; 32],
                merkle_hash: [0u8; 32],
                info: Vec::new(),
                number,
                witness: "w1".into(),
                time: NOW + number,
            },
            sign: Default::default(),
            txs,
            receipts: Vec::new(),
        };
        block.seal_roots();
        block
    }

    #[test]
    fn linked_block_evicts_included_and_feeds_dedup() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let tx = signed_tx(&key, 100, 15);
        pool.add_at(tx.clone(), TxSource::Remote, NOW).unwrap();

        let block = block_with_txs(1, [0u8; 32], vec![tx.clone()]);
        pool.on_block_linked(&block, true);
        assert_eq!(pool.pending_len(), 0);

        // Re-admission now hits the ancestor-chain dedup.
        assert_eq!(
            pool.add_at(tx, TxSource::Remote, NOW).unwrap_err(),
            AdmissionError::Dup
        );
    }

    #[test]
    fn lib_advance_drops_expired_pending() {
        let (pool, _) = default_pool();
        let key = kaon_crypto::KeyPair::generate();
        let tx = signed_tx(&key, 100, 16);
        pool.add_at(tx.clone(), TxSource::Remote, NOW).unwrap();

        pool.on_lib_advance(tx.expiration - 1);
        assert_eq!(pool.pending_len(), 1);
        pool.on_lib_advance(tx.expiration);
        assert_eq!(pool.pending_len(), 0);
    }

    #[test]
    fn defer_materialization_bypasses_pending_but_not_chain() {
        let (pool, chain) = default_pool();
        let key = kaon_crypto::KeyPair::generate();

        let mut delayed = signed_tx(&key, 100, 17);
        delayed.delay = secs_to_ns(10);
        delayed.time = NOW - secs_to_ns(10);
        delayed.expiration = NOW + secs_to_ns(300);
        delayed.sign_as_publisher(&key);

        // The delayed original is finalized on chain.
        let block = block_with_txs(0, [0u8; 32], vec![delayed.clone()]);
        chain.push(&block).unwrap();
        pool.on_block_linked(&block, true);

        pool.add_defer_at(&delayed.hash(), NOW).unwrap();
        assert_eq!(pool.pending_len(), 1);
        // Second firing while still pending: treated as already admitted.
        pool.add_defer_at(&delayed.hash(), NOW).unwrap();
        assert_eq!(pool.pending_len(), 1);

        // Once the materialization is itself on chain, re-admission is Dup.
        let materialized = Tx::materialize_defer(&delayed);
        let block2 = block_with_txs(1, block.head_hash(), vec![materialized]);
        chain.push(&block2).unwrap();
        pool.on_block_linked(&block2, true);
        assert_eq!(
            pool.add_defer_at(&delayed.hash(), NOW).unwrap_err(),
            AdmissionError::Dup
        );
    }
}
