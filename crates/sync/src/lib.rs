// Path: crates/sync/src/lib.rs
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
//! The chain synchronizer.
//!
//! Tracks the gap between the local finalized chain and the best height
//! announced on the network, requests missing ranges from random healthy
//! peers (bounded in-flight per peer), and feeds received blocks into the
//! producer/validator for verification. Deduplicates repeated
//! announcements by hash.

use kaon_api::chain::ChainStore;
use kaon_api::transport::{MessageType, Priority, Transport};
use kaon_types::block::Block;
use kaon_types::codec;
use kaon_types::config::SyncConfig;
use kaon_types::Hash;
use parity_scale_codec::{Decode, Encode};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A peer's height announcement.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct SyncHeight {
    /// The announcing peer's finalized chain length minus one.
    pub height: u64,
}

/// Request for the block hashes in a number range (inclusive).
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct BlockHashQuery {
    /// First block number wanted.
    pub start: i64,
    /// Last block number wanted.
    pub end: i64,
}

/// Response to a [`BlockHashQuery`].
#[derive(Debug, Clone, Encode, Decode)]
pub struct BlockHashResponse {
    /// `(number, head hash)` pairs for the available blocks in the range.
    pub hashes: Vec<(i64, Hash)>,
}

/// Request for one full block by head hash.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct BlockRequest {
    /// The wanted block's head hash.
    pub hash: Hash,
}

#[derive(Default)]
struct PeerState {
    best_height: u64,
    inflight: usize,
}

/// Bound on the remembered-announcement set; trimmed wholesale when hit.
const SEEN_CAP: usize = 100_000;

/// The synchronizer. Methods are invoked from the node's inbound dispatch
/// loop; received blocks flow out through the channel handed to `new`.
pub struct Synchronizer {
    config: SyncConfig,
    chain: Arc<dyn ChainStore>,
    transport: Arc<dyn Transport>,
    blocks_tx: mpsc::Sender<Block>,
    peers: Mutex<HashMap<String, PeerState>>,
    seen: Mutex<HashSet<Hash>>,
}

impl Synchronizer {
    /// Creates a synchronizer feeding verified-block candidates into
    /// `blocks_tx` (consumed by the producer/validator loop).
    pub fn new(
        config: SyncConfig,
        chain: Arc<dyn ChainStore>,
        transport: Arc<dyn Transport>,
        blocks_tx: mpsc::Sender<Block>,
    ) -> Self {
        Self {
            config,
            chain,
            transport,
            blocks_tx,
            peers: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// The best height any peer has announced.
    pub fn best_known_height(&self) -> u64 {
        self.peers
            .lock()
            .values()
            .map(|p| p.best_height)
            .max()
            .unwrap_or(0)
    }

    /// Announces our own height to the network.
    pub fn announce_height(&self) {
        let height = self.chain.length().saturating_sub(1);
        let payload = codec::to_bytes_canonical(&SyncHeight { height });
        if let Err(e) =
            self.transport
                .broadcast(MessageType::SyncHeight, payload, Priority::Normal)
        {
            tracing::debug!(target: "sync", error = %e, "height announce failed");
        }
    }

    /// Handles a peer's height announcement; requests a range when behind.
    pub fn on_height(&self, peer: &str, announcement: SyncHeight) {
        {
            let mut peers = self.peers.lock();
            let state = peers.entry(peer.to_string()).or_default();
            if announcement.height > state.best_height {
                state.best_height = announcement.height;
            }
        }
        self.request_missing();
    }

    /// Requests the next missing range from a random peer that is ahead and
    /// has request capacity.
    pub fn request_missing(&self) {
        let our_height = self.chain.length().saturating_sub(1);
        let best = self.best_known_height();
        if best <= our_height {
            return;
        }
        let start = our_height as i64 + 1;
        let end = (our_height + self.config.range_width).min(best) as i64;

        let mut peers = self.peers.lock();
        let mut candidates: Vec<&String> = peers
            .iter()
            .filter(|(_, state)| {
                state.best_height > our_height && state.inflight < self.config.max_inflight_per_peer
            })
            .map(|(peer, _)| peer)
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        let Some(peer) = candidates.first().map(|p| (*p).clone()) else {
            return;
        };

        let payload = codec::to_bytes_canonical(&BlockHashQuery { start, end });
        match self
            .transport
            .send(&peer, MessageType::BlockHashQuery, payload, Priority::Normal)
        {
            Ok(()) => {
                if let Some(state) = peers.get_mut(&peer) {
                    state.inflight += 1;
                }
                tracing::debug!(target: "sync", peer, start, end, "range requested");
            }
            Err(e) => {
                tracing::debug!(target: "sync", peer, error = %e, "range request failed");
            }
        }
    }

    /// Handles a peer's hash list: requests every block we do not have.
    pub fn on_hash_response(&self, peer: &str, response: BlockHashResponse) {
        {
            let mut peers = self.peers.lock();
            if let Some(state) = peers.get_mut(peer) {
                state.inflight = state.inflight.saturating_sub(1);
            }
        }
        for (_, hash) in response.hashes {
            if self.chain.block_by_hash(&hash).is_ok() {
                continue;
            }
            {
                let mut seen = self.seen.lock();
                if seen.len() >= SEEN_CAP {
                    seen.clear();
                }
                if !seen.insert(hash) {
                    continue;
                }
            }
            let payload = codec::to_bytes_canonical(&BlockRequest { hash });
            if let Err(e) =
                self.transport
                    .send(peer, MessageType::BlockRequest, payload, Priority::Normal)
            {
                tracing::debug!(target: "sync", peer, error = %e, "block request failed");
            }
        }
    }

    /// Handles a compact new-block announcement: requests the body from
    /// the announcing peer unless the block is already known.
    pub fn on_block_announce(&self, peer: &str, hash: Hash) {
        if self.chain.block_by_hash(&hash).is_ok() {
            return;
        }
        {
            let mut seen = self.seen.lock();
            if seen.len() >= SEEN_CAP {
                seen.clear();
            }
            if !seen.insert(hash) {
                return;
            }
        }
        let payload = codec::to_bytes_canonical(&BlockRequest { hash });
        if let Err(e) =
            self.transport
                .send(peer, MessageType::BlockRequest, payload, Priority::Urgent)
        {
            tracing::debug!(target: "sync", peer, error = %e, "announce pull failed");
        }
    }

    /// Serves a peer's range query from the finalized chain.
    pub fn on_hash_query(&self, peer: &str, query: BlockHashQuery) {
        let mut hashes = Vec::new();
        for number in query.start..=query.end {
            match self.chain.block_by_number(number) {
                Ok(block) => hashes.push((number, block.head_hash())),
                Err(_) => break,
            }
        }
        let payload = codec::to_bytes_canonical(&BlockHashResponse { hashes });
        if let Err(e) = self.transport.send(
            peer,
            MessageType::BlockHashResponse,
            payload,
            Priority::Normal,
        ) {
            tracing::debug!(target: "sync", peer, error = %e, "hash response failed");
        }
    }

    /// Serves a peer's full-block request.
    pub fn on_block_request(&self, peer: &str, request: BlockRequest) {
        let Ok(block) = self.chain.block_by_hash(&request.hash) else {
            return;
        };
        let payload = codec::to_bytes_canonical(&block);
        if let Err(e) =
            self.transport
                .send(peer, MessageType::NewBlock, payload, Priority::Normal)
        {
            tracing::debug!(target: "sync", peer, error = %e, "block send failed");
        }
    }

    /// Forwards a received block into the consensus loop. Repeated
    /// deliveries of the same block are dropped here.
    pub fn on_block(&self, block: Block) {
        let hash = block.head_hash();
        {
            let mut seen = self.seen.lock();
            if seen.len() >= SEEN_CAP {
                seen.clear();
            }
            seen.insert(hash);
        }
        if let Err(e) = self.blocks_tx.try_send(block) {
            tracing::warn!(target: "sync", error = %e, "consensus inbox full, block dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaon_api::chain::ChainStore;
    use kaon_api::transport::ChannelTransport;
    use kaon_types::block::BlockHead;
    use kaon_types::error::ChainError;
    use kaon_types::receipt::Receipt;
    use kaon_types::tx::Tx;
    use parking_lot::RwLock;

    /// Minimal in-memory chain for sync tests.
    #[derive(Default)]
    struct TestChain {
        blocks: RwLock<Vec<Block>>,
    }

    impl TestChain {
        fn with_blocks(n: i64) -> Arc<Self> {
            let chain = Arc::new(Self::default());
            let mut parent = [0u8; 32];
            for number in 0..n {
                let block = Block {
                    head: BlockHead {
                        version: 0,
                        parent_hash: parent,
                        txs_hash: [0u8; 32],
                        merkle_hash: [0u8; 32],
                        info: Vec::new(),
                        number,
                        witness: "w".into(),
                        time: number,
                    },
                    sign: Default::default(),
                    txs: Vec::new(),
                    receipts: Vec::new(),
                };
                parent = block.head_hash();
                chain.blocks.write().push(block);
            }
            chain
        }
    }

    impl ChainStore for TestChain {
        fn push(&self, block: &Block) -> Result<(), ChainError> {
            self.blocks.write().push(block.clone());
            Ok(())
        }
        fn length(&self) -> u64 {
            self.blocks.read().len() as u64
        }
        fn top(&self) -> Result<Block, ChainError> {
            self.blocks.read().last().cloned().ok_or(ChainError::NotFound)
        }
        fn block_by_number(&self, number: i64) -> Result<Block, ChainError> {
            usize::try_from(number)
                .ok()
                .and_then(|n| self.blocks.read().get(n).cloned())
                .ok_or(ChainError::NotFound)
        }
        fn block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError> {
            self.blocks
                .read()
                .iter()
                .find(|b| b.head_hash() == *hash)
                .cloned()
                .ok_or(ChainError::NotFound)
        }
        fn has_tx(&self, _hash: &Hash) -> bool {
            false
        }
        fn tx(&self, _hash: &Hash) -> Result<Tx, ChainError> {
            Err(ChainError::NotFound)
        }
        fn receipt_by_tx_hash(&self, _hash: &Hash) -> Result<Receipt, ChainError> {
            Err(ChainError::NotFound)
        }
        fn receipt_by_hash(&self, _hash: &Hash) -> Result<Receipt, ChainError> {
            Err(ChainError::NotFound)
        }
        fn all_delay_txs(&self) -> Result<Vec<Tx>, ChainError> {
            Ok(Vec::new())
        }
    }

    fn setup(
        local_blocks: i64,
    ) -> (
        Synchronizer,
        Arc<TestChain>,
        mpsc::UnboundedReceiver<(MessageType, Vec<u8>, Priority)>,
        mpsc::Receiver<Block>,
    ) {
        let chain = TestChain::with_blocks(local_blocks);
        let (transport, gossip_rx) = ChannelTransport::new();
        let (blocks_tx, blocks_rx) = mpsc::channel(16);
        let sync = Synchronizer::new(
            SyncConfig::default(),
            chain.clone(),
            Arc::new(transport),
            blocks_tx,
        );
        (sync, chain, gossip_rx, blocks_rx)
    }

    #[test]
    fn behind_peer_triggers_range_request() {
        let (sync, _, mut gossip_rx, _blocks) = setup(3);
        sync.on_height("peer-1", SyncHeight { height: 10 });
        let (mtype, payload, _) = gossip_rx.try_recv().unwrap();
        assert_eq!(mtype, MessageType::BlockHashQuery);
        let query: BlockHashQuery = codec::from_bytes_canonical(&payload).unwrap();
        assert_eq!(query.start, 3);
        assert!(query.end >= query.start);
    }

    #[test]
    fn ahead_or_equal_peer_triggers_nothing() {
        let (sync, _, mut gossip_rx, _blocks) = setup(5);
        sync.on_height("peer-1", SyncHeight { height: 4 });
        assert!(gossip_rx.try_recv().is_err());
    }

    #[test]
    fn inflight_cap_limits_requests_per_peer() {
        let (sync, _, mut gossip_rx, _blocks) = setup(1);
        let cap = SyncConfig::default().max_inflight_per_peer;
        for _ in 0..cap + 3 {
            sync.on_height("peer-1", SyncHeight { height: 100 });
        }
        let mut sent = 0;
        while gossip_rx.try_recv().is_ok() {
            sent += 1;
        }
        assert_eq!(sent, cap);
    }

    #[test]
    fn hash_response_requests_unknown_blocks_once() {
        let (sync, chain, mut gossip_rx, _blocks) = setup(2);
        sync.on_height("peer-1", SyncHeight { height: 5 });
        let _ = gossip_rx.try_recv();

        let known = chain.block_by_number(1).unwrap().head_hash();
        let unknown = [7u8; 32];
        let response = BlockHashResponse {
            hashes: vec![(1, known), (2, unknown)],
        };
        sync.on_hash_response("peer-1", response.clone());

        let (mtype, payload, _) = gossip_rx.try_recv().unwrap();
        assert_eq!(mtype, MessageType::BlockRequest);
        let request: BlockRequest = codec::from_bytes_canonical(&payload).unwrap();
        assert_eq!(request.hash, unknown);
        // Only the unknown hash was requested, and a replay asks nothing.
        assert!(gossip_rx.try_recv().is_err());
        sync.on_hash_response("peer-1", response);
        assert!(gossip_rx.try_recv().is_err());
    }

    #[test]
    fn serves_range_queries_from_chain() {
        let (sync, chain, mut gossip_rx, _blocks) = setup(4);
        sync.on_hash_query("peer-2", BlockHashQuery { start: 1, end: 9 });
        let (mtype, payload, _) = gossip_rx.try_recv().unwrap();
        assert_eq!(mtype, MessageType::BlockHashResponse);
        let response: BlockHashResponse = codec::from_bytes_canonical(&payload).unwrap();
        // Range clipped at our top (blocks 1..=3).
        assert_eq!(response.hashes.len(), 3);
        assert_eq!(
            response.hashes[0].1,
            chain.block_by_number(1).unwrap().head_hash()
        );
    }

    #[test]
    fn received_blocks_flow_into_consensus() {
        let (sync, chain, _gossip, mut blocks_rx) = setup(1);
        let block = chain.block_by_number(0).unwrap();
        sync.on_block(block.clone());
        assert_eq!(blocks_rx.try_recv().unwrap().head_hash(), block.head_hash());
    }
}
