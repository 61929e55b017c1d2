// Path: crates/txpool/src/defer.rs
//! The deferred-transaction scheduler.
//!
//! Keeps an ordered index of `(trigger_time, referred_hash)` entries and a
//! single loop that sleeps until the earliest trigger, then feeds due
//! entries into the pool. A full pool backs off until the entry's trigger;
//! duplicate results count as success and clear the entry.

use kaon_types::error::AdmissionError;
use kaon_types::time::now_ns;
use kaon_types::tx::Tx;
use kaon_types::Hash;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::time::Duration;

use crate::TxPool;

/// Lower bound on one scheduler sleep.
const MIN_TICK: Duration = Duration::from_millis(100);

/// Index entry: ordering is trigger time first, hash as tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DeferIndex {
    trigger_time: i64,
    referred: Hash,
}

impl DeferIndex {
    fn for_delay_tx(tx: &Tx) -> Self {
        Self {
            trigger_time: tx.time.saturating_add(tx.delay),
            referred: tx.hash(),
        }
    }
}

/// The deferred-transaction server.
pub struct DeferServer {
    txpool: Arc<TxPool>,
    index: RwLock<BTreeSet<DeferIndex>>,
    next_schedule: AtomicI64,
    wake: Notify,
}

impl DeferServer {
    /// Creates the server, rebuilding the index from the finalized chain's
    /// delayed transactions (cold start). Entries whose materialization is
    /// already on chain are skipped.
    pub fn new(txpool: Arc<TxPool>) -> Result<Self, AdmissionError> {
        let mut index = BTreeSet::new();
        let delays = txpool
            .chain()
            .all_delay_txs()
            .map_err(|e| AdmissionError::Verify(format!("delay index unavailable: {e}")))?;
        for delay_tx in delays {
            let materialized_hash = Tx::materialize_defer(&delay_tx).hash();
            if txpool.chain().has_tx(&materialized_hash) {
                continue;
            }
            index.insert(DeferIndex::for_delay_tx(&delay_tx));
        }
        tracing::info!(target: "defer", entries = index.len(), "defer index built");
        Ok(Self {
            txpool,
            index: RwLock::new(index),
            next_schedule: AtomicI64::new(i64::MAX),
            wake: Notify::new(),
        })
    }

    /// Registers a freshly finalized delayed transaction. Wakes the loop
    /// when the new trigger is earlier than the current schedule.
    pub fn store(&self, delay_tx: &Tx) {
        let entry = DeferIndex::for_delay_tx(delay_tx);
        self.index.write().insert(entry);
        if entry.trigger_time < self.next_schedule.load(Ordering::Acquire) {
            self.wake.notify_one();
        }
    }

    /// Removes the entry matching a materialized deferred transaction
    /// (its trigger time is the materialization's creation time).
    pub fn del(&self, defer_tx: &Tx) {
        if let Some(referred) = defer_tx.referred_tx {
            let entry = DeferIndex {
                trigger_time: defer_tx.time,
                referred,
            };
            self.index.write().remove(&entry);
        }
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// True when no deferred executions are outstanding.
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    fn earliest(&self) -> i64 {
        self.index
            .read()
            .first()
            .map(|e| e.trigger_time)
            .unwrap_or(i64::MAX)
    }

    /// Feeds every due entry into the pool. Returns the next wake-up time.
    fn drain_due(&self, now: i64) -> i64 {
        loop {
            let Some(entry) = self.index.read().first().copied() else {
                return i64::MAX;
            };
            if entry.trigger_time > now {
                return entry.trigger_time;
            }
            match self.txpool.add_defer_at(&entry.referred, now) {
                Ok(()) | Err(AdmissionError::Dup) => {
                    self.index.write().remove(&entry);
                }
                Err(AdmissionError::CacheFull) => {
                    // Pool is saturated; retry this entry later.
                    return entry.trigger_time.max(now);
                }
                Err(e) => {
                    tracing::warn!(target: "defer", error = %e, "defer entry dropped");
                    self.index.write().remove(&entry);
                }
            }
        }
    }

    /// The scheduler loop. Exits on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = now_ns();
            let next = self.earliest();
            self.next_schedule.store(next, Ordering::Release);

            let sleep_for = if next == i64::MAX {
                Duration::from_secs(3600)
            } else {
                Duration::from_nanos(next.saturating_sub(now).max(0) as u64).max(MIN_TICK)
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {
                    let now = now_ns();
                    let next = self.drain_due(now);
                    self.next_schedule.store(next, Ordering::Release);
                }
                _ = self.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!(target: "defer", "defer server stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TxSource;
    use kaon_api::chain::ChainStore;
    use kaon_api::transport::ChannelTransport;
    use kaon_chain::MemChainStore;
    use kaon_types::block::{Block, BlockHead};
    use kaon_types::config::TxPoolConfig;
    use kaon_types::time::secs_to_ns;
    use kaon_types::tx::Action;

    const NOW: i64 = 2_000_000_000_000_000;

    /// A delayed tx created at `NOW + created_offset_secs` that triggers
    /// `delay_secs` later.
    fn delayed_tx(
        key: &kaon_crypto::KeyPair,
        created_offset_secs: i64,
        delay_secs: i64,
        salt: u32,
    ) -> Tx {
        let time = NOW + secs_to_ns(created_offset_secs);
        let mut tx = Tx::new(
            vec![Action::new(
                "token.kaon",
                "transfer",
                format!("[\"a\",\"b\",\"{salt}\"]"),
            )],
            time,
            time + secs_to_ns(900),
            1_000_000,
            100,
            secs_to_ns(delay_secs),
        );
        tx.sign_as_publisher(key);
        tx
    }

    fn finalized(chain: &MemChainStore, txs: Vec<Tx>) -> Block {
        let number = chain.length() as i64;
        let mut block = Block {
            head: BlockHead {
                version: 0,
                parent_hash: [0u8; 32],
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
        chain.push(&block).unwrap();
        block
    }

    fn setup() -> (Arc<TxPool>, Arc<MemChainStore>) {
        let chain = Arc::new(MemChainStore::new());
        let (transport, _rx) = ChannelTransport::new();
        (
            Arc::new(TxPool::new(
                TxPoolConfig::default(),
                chain.clone(),
                Arc::new(transport),
            )),
            chain,
        )
    }

    #[test]
    fn cold_start_rebuilds_index_and_skips_consumed() {
        let (pool, chain) = setup();
        let key = kaon_crypto::KeyPair::generate();
        let pending_delay = delayed_tx(&key, -10, 10, 0);
        let consumed_delay = delayed_tx(&key, -10, 10, 1);
        let consumed_materialized = Tx::materialize_defer(&consumed_delay);
        finalized(
            &chain,
            vec![
                pending_delay.clone(),
                consumed_delay,
                consumed_materialized,
            ],
        );

        let server = DeferServer::new(pool).unwrap();
        assert_eq!(server.len(), 1);
        assert_eq!(server.earliest(), pending_delay.time + pending_delay.delay);
    }

    #[test]
    fn drain_admits_due_entries() {
        let (pool, chain) = setup();
        let key = kaon_crypto::KeyPair::generate();
        let due = delayed_tx(&key, -10, 10, 2);
        let future = delayed_tx(&key, 0, 600, 3); // triggers 600s from NOW
        finalized(&chain, vec![due.clone(), future.clone()]);

        let server = DeferServer::new(pool.clone()).unwrap();
        assert_eq!(server.len(), 2);

        let next = server.drain_due(NOW);
        // The due entry was admitted and removed; the future one remains.
        assert_eq!(pool.pending_len(), 1);
        assert_eq!(server.len(), 1);
        assert_eq!(next, future.time + future.delay);
    }

    #[test]
    fn cache_full_backs_off_and_keeps_entry() {
        let chain = Arc::new(MemChainStore::new());
        let (transport, _rx) = ChannelTransport::new();
        let mut config = TxPoolConfig::default();
        config.cache_size = 1;
        let pool = Arc::new(TxPool::new(config, chain.clone(), Arc::new(transport)));

        let key = kaon_crypto::KeyPair::generate();
        let due = delayed_tx(&key, -10, 10, 4);
        finalized(&chain, vec![due.clone()]);

        // Saturate the pool.
        let mut filler = Tx::new(
            vec![Action::new("token.kaon", "transfer", "[\"x\",\"y\",\"1\"]")],
            NOW,
            NOW + secs_to_ns(60),
            1_000_000,
            100,
            0,
        );
        filler.sign_as_publisher(&key);
        pool.add_at(filler, TxSource::Remote, NOW).unwrap();

        let server = DeferServer::new(pool.clone()).unwrap();
        let next = server.drain_due(NOW);
        assert_eq!(server.len(), 1);
        assert!(next >= NOW);
    }

    #[test]
    fn store_and_del_maintain_index() {
        let (pool, chain) = setup();
        let key = kaon_crypto::KeyPair::generate();
        let delay_tx = delayed_tx(&key, 0, 100, 5);
        finalized(&chain, vec![delay_tx.clone()]);

        let server = DeferServer::new(pool).unwrap();
        let extra = delayed_tx(&key, 0, 50, 6);
        server.store(&extra);
        assert_eq!(server.len(), 2);

        let materialized = Tx::materialize_defer(&extra);
        server.del(&materialized);
        assert_eq!(server.len(), 1);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let (pool, _) = setup();
        let server = Arc::new(DeferServer::new(pool).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(stop_rx));
        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
