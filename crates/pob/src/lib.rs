// Path: crates/pob/src/lib.rs
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
//! The proof-of-block producer/validator.
//!
//! One loop owns all consensus mutation: slot ticks, inbound blocks, and
//! irreversibility advancement are handled strictly in arrival order. Other
//! subsystems read the block cache through a shared lock.

pub mod confirm;
pub mod schedule;

use kaon_api::chain::ChainStore;
use kaon_api::event::{Event, EventHub, Topic};
use kaon_api::state::MvccStore;
use kaon_api::transport::{MessageType, Priority, Transport};
use kaon_chain::{BlockCache, CacheError};
use kaon_executor::{ExecConfig, HeadTemplate, Verifier};
use kaon_txpool::defer::DeferServer;
use kaon_txpool::{Found, TxPool};
use kaon_types::block::Block;
use kaon_types::codec;
use kaon_types::error::BlockError;
use kaon_types::time::now_ns;
use kaon_types::Hash;
use parking_lot::RwLock;
use schedule::WitnessSchedule;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Per-transaction execution budget during production and validation.
const TX_TIME_LIMIT: Duration = Duration::from_millis(100);

/// The producer/validator controller. Owns the only mutating loop over the
/// block cache, the state store head, and the witness watermarks.
pub struct PobController<S: MvccStore> {
    schedule: WitnessSchedule,
    produce_key: Option<kaon_crypto::KeyPair>,
    verifier: Verifier,
    cache: Arc<RwLock<BlockCache>>,
    store: S,
    txpool: Arc<TxPool>,
    defer: Arc<DeferServer>,
    transport: Arc<dyn Transport>,
    events: Arc<EventHub>,
    chain: Arc<dyn ChainStore>,
}

impl<S: MvccStore> PobController<S> {
    /// Wires the controller. The store handle must already be positioned on
    /// the head snapshot (genesis on a fresh chain).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule: WitnessSchedule,
        produce_key: Option<kaon_crypto::KeyPair>,
        cache: Arc<RwLock<BlockCache>>,
        store: S,
        txpool: Arc<TxPool>,
        defer: Arc<DeferServer>,
        transport: Arc<dyn Transport>,
        events: Arc<EventHub>,
        chain: Arc<dyn ChainStore>,
    ) -> Self {
        Self {
            schedule,
            produce_key,
            verifier: Verifier::new(chain.clone()),
            cache,
            store,
            txpool,
            defer,
            transport,
            events,
            chain,
        }
    }

    /// The shared cache, for read-side consumers (RPC, sync).
    pub fn cache(&self) -> Arc<RwLock<BlockCache>> {
        self.cache.clone()
    }

    /// The witness schedule.
    pub fn schedule(&self) -> &WitnessSchedule {
        &self.schedule
    }

    fn exec_config(&self) -> ExecConfig {
        let budget_ns = (self.schedule.slot_length_ns() / 3).max(1) as u64;
        ExecConfig::with_limits(Duration::from_nanos(budget_ns), TX_TIME_LIMIT)
    }

    /// Handles one slot tick: produces a block when the slot belongs to
    /// this node's witness key. Missed or foreign slots pass silently.
    pub fn handle_slot(&mut self, now: i64) -> Option<Block> {
        let our_id = self.produce_key.as_ref()?.id();
        let scheduled = self.schedule.witness_of_time(now)?;
        if scheduled != our_id {
            return None;
        }
        match self.produce(now) {
            Ok(block) => Some(block),
            Err(e) => {
                tracing::error!(target: "pob", error = %e, "block production failed");
                None
            }
        }
    }

    fn produce(&mut self, now: i64) -> anyhow::Result<Block> {
        let (parent_hash, parent_number, parent_tag, parent_time) = {
            let cache = self.cache.read();
            let head = cache.head();
            (
                head.hash(),
                head.number(),
                head.state_tag.clone(),
                head.block.head.time,
            )
        };
        if now <= parent_time {
            anyhow::bail!("slot time {now} not after head time {parent_time}");
        }
        let key = self
            .produce_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no produce key"))?
            .clone();
        if !self.store.checkout(&parent_tag) {
            anyhow::bail!("head snapshot {parent_tag} missing");
        }

        let template = HeadTemplate {
            parent_hash,
            number: parent_number + 1,
            witness: key.id(),
            time: now,
        };
        let cfg = self.exec_config();
        let mut iter = self.txpool.iter_priority();
        let (mut block, dropped) = self
            .verifier
            .generate(&template, &mut self.store, &mut iter, &cfg)
            .map_err(|e| anyhow::anyhow!("generate failed: {e}"))?;
        drop(iter);
        self.txpool
            .remove_all(dropped.iter().map(|d| d.tx.hash()));
        block.sign_head(&key);

        self.adopt_linked_block(&block)?;
        self.advance_lib();

        let payload = codec::to_bytes_canonical(&block);
        if let Err(e) = self
            .transport
            .broadcast(MessageType::NewBlock, payload, Priority::Urgent)
        {
            tracing::warn!(target: "pob", error = %e, "block broadcast failed");
        }
        tracing::info!(
            target: "pob",
            number = block.head.number,
            txs = block.txs.len(),
            "block produced"
        );
        Ok(block)
    }

    /// Adds an already-verified block to the cache and does the per-link
    /// bookkeeping (watermark, txpool, events).
    fn adopt_linked_block(&mut self, block: &Block) -> Result<(), CacheError> {
        let hash = block.head_hash();
        self.cache.write().add(block.clone())?;
        self.after_link(&hash);
        Ok(())
    }

    fn after_link(&mut self, hash: &Hash) {
        let (block, on_head) = {
            let mut cache = self.cache.write();
            let Some(node) = cache.find(hash) else {
                return;
            };
            let block = node.block.clone();
            let mark = self
                .schedule
                .update_watermark(&block.head.witness, block.head.number);
            cache.set_confirm_until(hash, mark);
            (block.clone(), cache.head().hash() == *hash)
        };
        self.txpool.on_block_linked(&block, on_head);
        self.events.publish(&Event {
            topic: Topic::NewBlock,
            data: serde_json::json!({
                "number": block.head.number,
                "witness": block.head.witness,
                "hash": kaon_crypto::base58_encode(hash),
            })
            .to_string(),
            time: now_ns(),
        });
    }

    /// Entry point for a block received from the network (gossip or sync).
    pub fn handle_block(&mut self, block: Block) -> Result<(), BlockError> {
        let hash = block.head_hash();
        {
            let cache = self.cache.read();
            if cache.find(&hash).is_some() {
                return Ok(());
            }
        }
        if self.chain.block_by_hash(&hash).is_ok() {
            return Ok(());
        }
        self.verify_basics(&block)?;

        let parent_linked = {
            let cache = self.cache.read();
            cache.is_linked(&block.head.parent_hash)
        };
        if !parent_linked {
            // Orphan (or child of an orphan): cache unlinked until the
            // parent shows up; verification happens at promotion.
            tracing::debug!(
                target: "pob",
                number = block.head.number,
                "block parked unlinked"
            );
            if let Err(e) = self.cache.write().add(block) {
                // Duplicates and blocks at or below the root are stale noise.
                tracing::debug!(target: "pob", error = %e, "unlinked insert ignored");
            }
            return Ok(());
        }

        self.verify_against_parent(&block)?;
        let newly_linked = self
            .cache
            .write()
            .add(block)
            .map_err(|_| BlockError::WrongHeadHash)?;

        // The first entry is the block just verified; the rest are promoted
        // orphans that still need their own verification, in link order.
        for (index, linked_hash) in newly_linked.iter().enumerate() {
            if index > 0 {
                let promoted = {
                    let cache = self.cache.read();
                    match cache.find(linked_hash) {
                        // Subtree of a failed sibling was already removed.
                        None => continue,
                        Some(node) => node.block.clone(),
                    }
                };
                let valid = self
                    .verify_basics(&promoted)
                    .and_then(|_| self.verify_against_parent(&promoted));
                if let Err(e) = valid {
                    tracing::warn!(target: "pob", error = %e, "promoted block rejected");
                    self.cache.write().remove_subtree(linked_hash);
                    continue;
                }
            }
            self.after_link(linked_hash);
        }

        self.advance_lib();
        Ok(())
    }

    /// Witness/slot/signature checks that need no state.
    fn verify_basics(&self, block: &Block) -> Result<(), BlockError> {
        let witness = &block.head.witness;
        if !self.schedule.contains(witness) {
            return Err(BlockError::WrongWitness);
        }
        if self.schedule.witness_of_time(block.head.time) != Some(witness.as_str()) {
            return Err(BlockError::WrongWitness);
        }
        let pubkey =
            kaon_crypto::pubkey_from_account_id(witness).map_err(|_| BlockError::WrongSignature)?;
        if !block.verify_sign(&pubkey) {
            return Err(BlockError::WrongSignature);
        }
        Ok(())
    }

    /// Head continuity, transaction dedup/signatures, and deterministic
    /// re-execution against the parent snapshot.
    fn verify_against_parent(&mut self, block: &Block) -> Result<(), BlockError> {
        let parent_hash = block.head.parent_hash;
        let (parent_number, parent_time, parent_tag) = {
            let cache = self.cache.read();
            let parent = cache.find(&parent_hash).ok_or(BlockError::ParentNotFound)?;
            (
                parent.number(),
                parent.block.head.time,
                parent.state_tag.clone(),
            )
        };
        if block.head.number != parent_number + 1 {
            return Err(BlockError::InvalidNumber {
                expected: parent_number + 1,
                got: block.head.number,
            });
        }
        if block.head.time <= parent_time {
            return Err(BlockError::TimeNotAfterParent);
        }

        for tx in block.txs.iter().skip(1) {
            match self.txpool.exists_from(&tx.hash(), &parent_hash) {
                Found::Chain => return Err(BlockError::DuplicateTx),
                Found::Pending => {}
                Found::Missing => {
                    if let Some(referred) = &tx.referred_tx {
                        let original = self
                            .chain
                            .tx(referred)
                            .map_err(|e| BlockError::DeferTxMismatch(e.to_string()))?;
                        tx.verify_defer(&original)?;
                        original
                            .verify_self()
                            .map_err(|_| BlockError::TxWrongSignature)?;
                    } else {
                        tx.verify_self().map_err(|_| BlockError::TxWrongSignature)?;
                    }
                }
            }
        }

        if !self.store.checkout(&parent_tag) {
            return Err(BlockError::ExecDivergence(format!(
                "parent snapshot {parent_tag} missing"
            )));
        }
        let cfg = self.exec_config();
        self.verifier.verify(block, &mut self.store, &cfg)
    }

    /// Recomputes the last irreversible block from the current head and
    /// flushes any newly confirmed prefix.
    fn advance_lib(&mut self) {
        let (head_hash, threshold) = {
            let cache = self.cache.read();
            (cache.head().hash(), self.schedule.confirm_threshold())
        };
        let Some(lib_hash) = ({
            let cache = self.cache.read();
            confirm::calculate_confirm(&cache, &head_hash, threshold)
        }) else {
            return;
        };

        let flushed = match self.cache.write().flush(&lib_hash) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(target: "pob", error = %e, "flush failed");
                return;
            }
        };
        if flushed.is_empty() {
            return;
        }
        let lib_tag = kaon_crypto::base58_encode(&lib_hash);
        if let Err(e) = self.store.flush(&lib_tag) {
            tracing::error!(target: "pob", error = %e, "state flush failed");
        }

        for flushed_hash in &flushed {
            let Ok(block) = self.chain.block_by_hash(flushed_hash) else {
                continue;
            };
            for tx in &block.txs {
                if tx.is_delay() {
                    self.defer.store(tx);
                } else if tx.is_defer() {
                    self.defer.del(tx);
                }
            }
            for receipt in &block.receipts {
                self.events.publish(&Event {
                    topic: Topic::ContractReceipt,
                    data: serde_json::json!({
                        "tx_hash": kaon_crypto::base58_encode(&receipt.tx_hash),
                        "status": format!("{:?}", receipt.status.code),
                        "gas_usage": receipt.gas_usage,
                    })
                    .to_string(),
                    time: now_ns(),
                });
                for entry in &receipt.receipts {
                    self.events.publish(&Event {
                        topic: Topic::ContractEvent,
                        data: serde_json::json!({
                            "func_name": entry.func_name,
                            "content": entry.content,
                        })
                        .to_string(),
                        time: now_ns(),
                    });
                }
            }
        }

        let lib_time = self.cache.read().linked_root().block.head.time;
        self.txpool.on_lib_advance(lib_time);
        tracing::info!(
            target: "pob",
            lib = self.cache.read().linked_root().number(),
            "lib advanced"
        );
    }

    /// The controller loop: slot ticks, inbound blocks, shutdown. All
    /// mutation funnels through here in arrival order.
    pub async fn run(
        mut self,
        mut blocks_rx: mpsc::Receiver<Block>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!(
            target: "pob",
            witnesses = self.schedule.len(),
            producing = self.produce_key.is_some(),
            "pob controller started"
        );
        loop {
            let until_slot = self.schedule.time_until_next_slot(now_ns());
            tokio::select! {
                _ = tokio::time::sleep(until_slot) => {
                    self.handle_slot(now_ns());
                }
                maybe_block = blocks_rx.recv() => {
                    match maybe_block {
                        Some(block) => {
                            let number = block.head.number;
                            if let Err(e) = self.handle_block(block) {
                                tracing::warn!(target: "pob", number, error = %e, "block rejected");
                            }
                        }
                        None => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(target: "pob", "pob controller stopped");
    }
}
