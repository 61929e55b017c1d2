// Path: crates/chain/src/cache.rs
//! The rooted DAG of pending blocks.
//!
//! Nodes are addressed by head hash; parent and children are hash
//! references, never owning pointers. Two partitions: `linked` nodes have an
//! ancestor path down to the root (the last irreversible block), `unlinked`
//! nodes are orphans waiting for their parent. `flush` persists a newly
//! irreversible suffix into the chain store, moves the root, and prunes the
//! losing branches.

use kaon_api::chain::ChainStore;
use kaon_types::block::Block;
use kaon_types::error::ChainError;
use kaon_types::Hash;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Errors from block cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The block is already cached.
    #[error("block already cached")]
    Duplicate,
    /// The block number is at or below the irreversible root.
    #[error("block number {0} not above root")]
    BelowRoot(i64),
    /// The target node is not in the linked partition.
    #[error("node not linked")]
    NotLinked,
    /// Persisting a flushed block failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// One cached block and its DAG bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheNode {
    /// The block itself.
    pub block: Block,
    /// The parent head hash.
    pub parent: Hash,
    /// Children head hashes.
    pub children: BTreeSet<Hash>,
    /// Tag of the state snapshot produced by applying this block.
    pub state_tag: String,
    /// The witness's confirmation watermark at link time.
    pub confirm_until: i64,
    /// Local arrival order; earlier wins head ties.
    pub arrival: u64,
}

impl CacheNode {
    /// The block number.
    pub fn number(&self) -> i64 {
        self.block.head.number
    }

    /// The producing witness.
    pub fn witness(&self) -> &str {
        &self.block.head.witness
    }

    /// The block head hash.
    pub fn hash(&self) -> Hash {
        self.block.head_hash()
    }
}

/// The block cache: linked and unlinked partitions over a hash-addressed
/// arena, with fork choice and flush-to-chain.
pub struct BlockCache {
    linked: HashMap<Hash, CacheNode>,
    unlinked: HashMap<Hash, CacheNode>,
    /// parent hash -> orphans waiting on it.
    pending_children: HashMap<Hash, BTreeSet<Hash>>,
    root: Hash,
    head: Hash,
    next_arrival: u64,
    chain: Arc<dyn ChainStore>,
}

impl BlockCache {
    /// Creates a cache rooted at the chain store's top block (the LIB).
    pub fn new(chain: Arc<dyn ChainStore>) -> Result<Self, ChainError> {
        let top = chain.top()?;
        let root_hash = top.head_hash();
        let root = CacheNode {
            state_tag: kaon_crypto::base58_encode(&root_hash),
            parent: top.head.parent_hash,
            children: BTreeSet::new(),
            confirm_until: 0,
            arrival: 0,
            block: top,
        };
        let mut linked = HashMap::new();
        linked.insert(root_hash, root);
        Ok(Self {
            linked,
            unlinked: HashMap::new(),
            pending_children: HashMap::new(),
            root: root_hash,
            head: root_hash,
            next_arrival: 1,
            chain,
        })
    }

    /// The last irreversible block.
    pub fn linked_root(&self) -> &CacheNode {
        // The root is always present in the linked partition.
        self.linked
            .get(&self.root)
            .unwrap_or_else(|| unreachable!("linked root must exist"))
    }

    /// The fork-choice head: deepest linked node, ties broken by earliest
    /// arrival.
    pub fn head(&self) -> &CacheNode {
        self.linked
            .get(&self.head)
            .unwrap_or_else(|| unreachable!("head must exist"))
    }

    /// Finds a node in either partition.
    pub fn find(&self, hash: &Hash) -> Option<&CacheNode> {
        self.linked.get(hash).or_else(|| self.unlinked.get(hash))
    }

    /// True when the hash is in the linked partition.
    pub fn is_linked(&self, hash: &Hash) -> bool {
        self.linked.contains_key(hash)
    }

    /// Looks up a cached block by number on the head branch.
    pub fn block_by_number(&self, number: i64) -> Option<&Block> {
        let mut cursor = self.head;
        loop {
            let node = self.linked.get(&cursor)?;
            if node.number() == number {
                return Some(&node.block);
            }
            if node.number() < number {
                return None;
            }
            cursor = node.parent;
        }
    }

    /// Records the witness watermark on a linked node.
    pub fn set_confirm_until(&mut self, hash: &Hash, confirm_until: i64) {
        if let Some(node) = self.linked.get_mut(hash) {
            node.confirm_until = confirm_until;
        }
    }

    /// Inserts a verified block. If its parent is linked the node links
    /// immediately and any orphan descendants are promoted transitively;
    /// otherwise it waits in the unlinked partition. Returns the hashes of
    /// every node that became linked by this insert, in link order.
    pub fn add(&mut self, block: Block) -> Result<Vec<Hash>, CacheError> {
        let hash = block.head_hash();
        if self.linked.contains_key(&hash) || self.unlinked.contains_key(&hash) {
            return Err(CacheError::Duplicate);
        }
        let root_number = self.linked_root().number();
        if block.head.number <= root_number {
            return Err(CacheError::BelowRoot(block.head.number));
        }

        let parent = block.head.parent_hash;
        let node = CacheNode {
            state_tag: kaon_crypto::base58_encode(&hash),
            parent,
            children: BTreeSet::new(),
            confirm_until: 0,
            arrival: self.next_arrival,
            block,
        };
        self.next_arrival += 1;

        if self.linked.contains_key(&parent) {
            self.link(hash, node);
            let mut newly_linked = vec![hash];
            self.promote_descendants(hash, &mut newly_linked);
            Ok(newly_linked)
        } else {
            tracing::debug!(
                target: "bcache",
                number = node.number(),
                "block cached unlinked (parent unknown)"
            );
            self.pending_children.entry(parent).or_default().insert(hash);
            self.unlinked.insert(hash, node);
            Ok(Vec::new())
        }
    }

    fn link(&mut self, hash: Hash, node: CacheNode) {
        let parent = node.parent;
        let number = node.number();
        let arrival = node.arrival;
        self.linked.insert(hash, node);
        if let Some(parent_node) = self.linked.get_mut(&parent) {
            parent_node.children.insert(hash);
        }
        let head = self.head();
        if number > head.number() || (number == head.number() && arrival < head.arrival) {
            self.head = hash;
        }
    }

    fn promote_descendants(&mut self, parent: Hash, newly_linked: &mut Vec<Hash>) {
        let Some(waiting) = self.pending_children.remove(&parent) else {
            return;
        };
        for child_hash in waiting {
            if let Some(child) = self.unlinked.remove(&child_hash) {
                self.link(child_hash, child);
                newly_linked.push(child_hash);
                self.promote_descendants(child_hash, newly_linked);
            }
        }
    }

    /// The linked path from the root (exclusive) to `hash` (inclusive),
    /// oldest first. Empty when `hash` is the root itself.
    pub fn path_from_root(&self, hash: &Hash) -> Result<Vec<Hash>, CacheError> {
        let mut path = Vec::new();
        let mut cursor = *hash;
        while cursor != self.root {
            let node = self.linked.get(&cursor).ok_or(CacheError::NotLinked)?;
            path.push(cursor);
            cursor = node.parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Makes `hash` the new irreversible root: persists every block on the
    /// old-root→`hash` path into the chain store (oldest first), then prunes
    /// all branches that do not pass through `hash`. Returns the flushed
    /// path.
    ///
    /// Blocks are durably persisted before any node is removed from the
    /// cache.
    pub fn flush(&mut self, hash: &Hash) -> Result<Vec<Hash>, CacheError> {
        let path = self.path_from_root(hash)?;
        for flushed_hash in &path {
            let node = self
                .linked
                .get(flushed_hash)
                .ok_or(CacheError::NotLinked)?;
            self.chain.push(&node.block)?;
        }

        // Drop every linked node that is not the new root or its descendant.
        let keep = self.descendants_and_self(hash);
        let before = self.linked.len();
        self.linked.retain(|h, _| keep.contains(h));
        self.root = *hash;

        // Orphans at or below the new root can never link.
        let root_number = self.linked_root().number();
        self.unlinked.retain(|_, node| node.number() > root_number);
        self.pending_children
            .retain(|_, children| !children.is_empty());

        if !self.linked.contains_key(&self.head) {
            self.recompute_head();
        }
        tracing::info!(
            target: "bcache",
            lib = self.linked_root().number(),
            pruned = before - self.linked.len(),
            "flushed to chain"
        );
        Ok(path)
    }

    /// Removes a linked node and its whole subtree (used when a promoted
    /// orphan fails verification). The root cannot be removed.
    pub fn remove_subtree(&mut self, hash: &Hash) {
        if *hash == self.root {
            return;
        }
        let doomed = self.descendants_and_self(hash);
        if let Some(parent) = self.linked.get(hash).map(|n| n.parent) {
            if let Some(parent_node) = self.linked.get_mut(&parent) {
                parent_node.children.remove(hash);
            }
        }
        self.linked.retain(|h, _| !doomed.contains(h));
        if doomed.contains(&self.head) {
            self.recompute_head();
        }
    }

    fn descendants_and_self(&self, start: &Hash) -> BTreeSet<Hash> {
        let mut keep = BTreeSet::new();
        let mut stack = vec![*start];
        while let Some(hash) = stack.pop() {
            if let Some(node) = self.linked.get(&hash) {
                keep.insert(hash);
                stack.extend(node.children.iter().copied());
            }
        }
        keep
    }

    fn recompute_head(&mut self) {
        let mut best = self.root;
        let (mut best_number, mut best_arrival) = {
            let root = self.linked_root();
            (root.number(), root.arrival)
        };
        for (hash, node) in &self.linked {
            if node.number() > best_number
                || (node.number() == best_number && node.arrival < best_arrival)
            {
                best = *hash;
                best_number = node.number();
                best_arrival = node.arrival;
            }
        }
        self.head = best;
    }

    /// Renders the linked tree for debugging: one node per line,
    /// `number:witness-prefix`, indented by depth, head marked `*`.
    pub fn draw(&self) -> String {
        let mut out = String::new();
        self.draw_node(&self.root, 0, &mut out);
        out
    }

    fn draw_node(&self, hash: &Hash, depth: usize, out: &mut String) {
        let Some(node) = self.linked.get(hash) else {
            return;
        };
        let witness: String = node.witness().chars().take(6).collect();
        let marker = if *hash == self.head { "*" } else { "" };
        out.push_str(&format!(
            "{}{}:{}{}\n",
            "  ".repeat(depth),
            node.number(),
            witness,
            marker
        ));
        for child in &node.children {
            self.draw_node(child, depth + 1, out);
        }
    }
}
