// Path: crates/chain/src/store.rs
//! Durable chain store backed by redb, plus an in-memory variant for tests.
//!
//! Single database, fixed-size big-endian keys. Every `push` is one write
//! transaction covering the block and all of its indices.

use kaon_api::chain::ChainStore;
use kaon_types::block::Block;
use kaon_types::codec;
use kaon_types::error::ChainError;
use kaon_types::receipt::Receipt;
use kaon_types::tx::Tx;
use kaon_types::Hash;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;

/// height -> canonical block bytes
const BLOCKS: TableDefinition<u64, &[u8]> = TableDefinition::new("BLOCKS");
/// head hash -> height
const HASH_INDEX: TableDefinition<&[u8; 32], u64> = TableDefinition::new("HASH_INDEX");
/// tx hash -> (height, position)
const TX_INDEX: TableDefinition<&[u8; 32], (u64, u32)> = TableDefinition::new("TX_INDEX");
/// receipt hash -> (height, position)
const RECEIPT_INDEX: TableDefinition<&[u8; 32], (u64, u32)> =
    TableDefinition::new("RECEIPT_INDEX");
/// delayed tx hash -> canonical tx bytes (defer server cold-start index)
const DELAY_INDEX: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("DELAY_INDEX");
/// singleton metadata: chain length
const META: TableDefinition<&str, u64> = TableDefinition::new("META");

fn backend_err(e: impl std::fmt::Display) -> ChainError {
    ChainError::Backend(e.to_string())
}

/// The production chain store.
pub struct RedbChainStore {
    db: Database,
}

impl RedbChainStore {
    /// Opens (or creates) the chain database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        let db = Database::create(path).map_err(backend_err)?;
        let write = db.begin_write().map_err(backend_err)?;
        {
            write.open_table(BLOCKS).map_err(backend_err)?;
            write.open_table(HASH_INDEX).map_err(backend_err)?;
            write.open_table(TX_INDEX).map_err(backend_err)?;
            write.open_table(RECEIPT_INDEX).map_err(backend_err)?;
            write.open_table(DELAY_INDEX).map_err(backend_err)?;
            write.open_table(META).map_err(backend_err)?;
        }
        write.commit().map_err(backend_err)?;
        Ok(Self { db })
    }

    fn read_length(&self) -> Result<u64, ChainError> {
        let read = self.db.begin_read().map_err(backend_err)?;
        let meta = read.open_table(META).map_err(backend_err)?;
        Ok(meta
            .get("len")
            .map_err(backend_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn block_at(&self, height: u64) -> Result<Block, ChainError> {
        let read = self.db.begin_read().map_err(backend_err)?;
        let blocks = read.open_table(BLOCKS).map_err(backend_err)?;
        let bytes = blocks
            .get(height)
            .map_err(backend_err)?
            .ok_or(ChainError::NotFound)?;
        codec::from_bytes_canonical(bytes.value()).map_err(ChainError::Codec)
    }

    fn located_tx(&self, hash: &Hash) -> Result<(u64, u32), ChainError> {
        let read = self.db.begin_read().map_err(backend_err)?;
        let index = read.open_table(TX_INDEX).map_err(backend_err)?;
        index
            .get(hash)
            .map_err(backend_err)?
            .map(|v| v.value())
            .ok_or(ChainError::NotFound)
    }
}

impl ChainStore for RedbChainStore {
    fn push(&self, block: &Block) -> Result<(), ChainError> {
        let length = self.read_length()?;
        if block.head.number != length as i64 {
            return Err(ChainError::Backend(format!(
                "push out of order: length {length}, block number {}",
                block.head.number
            )));
        }
        let height = length;
        let head_hash = block.head_hash();
        let block_bytes = codec::to_bytes_canonical(block);

        let write = self.db.begin_write().map_err(backend_err)?;
        {
            let mut blocks = write.open_table(BLOCKS).map_err(backend_err)?;
            blocks
                .insert(height, block_bytes.as_slice())
                .map_err(backend_err)?;

            let mut hashes = write.open_table(HASH_INDEX).map_err(backend_err)?;
            hashes.insert(&head_hash, height).map_err(backend_err)?;

            let mut txs = write.open_table(TX_INDEX).map_err(backend_err)?;
            let mut receipts = write.open_table(RECEIPT_INDEX).map_err(backend_err)?;
            let mut delays = write.open_table(DELAY_INDEX).map_err(backend_err)?;
            for (position, tx) in block.txs.iter().enumerate() {
                let tx_hash = tx.hash();
                txs.insert(&tx_hash, (height, position as u32))
                    .map_err(backend_err)?;
                if tx.is_delay() {
                    let tx_bytes = codec::to_bytes_canonical(tx);
                    delays
                        .insert(&tx_hash, tx_bytes.as_slice())
                        .map_err(backend_err)?;
                }
            }
            for (position, receipt) in block.receipts.iter().enumerate() {
                receipts
                    .insert(&receipt.hash(), (height, position as u32))
                    .map_err(backend_err)?;
            }

            let mut meta = write.open_table(META).map_err(backend_err)?;
            meta.insert("len", height + 1).map_err(backend_err)?;
        }
        write.commit().map_err(backend_err)?;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.read_length().unwrap_or(0)
    }

    fn top(&self) -> Result<Block, ChainError> {
        let length = self.read_length()?;
        if length == 0 {
            return Err(ChainError::NotFound);
        }
        self.block_at(length - 1)
    }

    fn block_by_number(&self, number: i64) -> Result<Block, ChainError> {
        let height = u64::try_from(number).map_err(|_| ChainError::NotFound)?;
        self.block_at(height)
    }

    fn block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError> {
        let read = self.db.begin_read().map_err(backend_err)?;
        let index = read.open_table(HASH_INDEX).map_err(backend_err)?;
        let height = index
            .get(hash)
            .map_err(backend_err)?
            .map(|v| v.value())
            .ok_or(ChainError::NotFound)?;
        drop(index);
        drop(read);
        self.block_at(height)
    }

    fn has_tx(&self, hash: &Hash) -> bool {
        self.located_tx(hash).is_ok()
    }

    fn tx(&self, hash: &Hash) -> Result<Tx, ChainError> {
        let (height, position) = self.located_tx(hash)?;
        let block = self.block_at(height)?;
        block
            .txs
            .get(position as usize)
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn receipt_by_tx_hash(&self, tx_hash: &Hash) -> Result<Receipt, ChainError> {
        let (height, position) = self.located_tx(tx_hash)?;
        let block = self.block_at(height)?;
        block
            .receipts
            .get(position as usize)
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn receipt_by_hash(&self, hash: &Hash) -> Result<Receipt, ChainError> {
        let read = self.db.begin_read().map_err(backend_err)?;
        let index = read.open_table(RECEIPT_INDEX).map_err(backend_err)?;
        let (height, position) = index
            .get(hash)
            .map_err(backend_err)?
            .map(|v| v.value())
            .ok_or(ChainError::NotFound)?;
        drop(index);
        drop(read);
        let block = self.block_at(height)?;
        block
            .receipts
            .get(position as usize)
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn all_delay_txs(&self) -> Result<Vec<Tx>, ChainError> {
        let read = self.db.begin_read().map_err(backend_err)?;
        let delays = read.open_table(DELAY_INDEX).map_err(backend_err)?;
        let mut out = Vec::new();
        for entry in delays.iter().map_err(backend_err)? {
            let (_, bytes) = entry.map_err(backend_err)?;
            let tx: Tx = codec::from_bytes_canonical(bytes.value()).map_err(ChainError::Codec)?;
            out.push(tx);
        }
        Ok(out)
    }
}

/// In-memory chain store for unit tests and simulation.
#[derive(Default)]
pub struct MemChainStore {
    inner: RwLock<MemInner>,
}

#[derive(Default)]
struct MemInner {
    blocks: Vec<Block>,
    by_hash: HashMap<Hash, u64>,
    tx_index: HashMap<Hash, (u64, u32)>,
    receipt_index: HashMap<Hash, (u64, u32)>,
    delay_txs: HashMap<Hash, Tx>,
}

impl MemChainStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemChainStore {
    fn push(&self, block: &Block) -> Result<(), ChainError> {
        let mut inner = self.inner.write();
        if block.head.number != inner.blocks.len() as i64 {
            return Err(ChainError::Backend(format!(
                "push out of order: length {}, block number {}",
                inner.blocks.len(),
                block.head.number
            )));
        }
        let height = inner.blocks.len() as u64;
        inner.by_hash.insert(block.head_hash(), height);
        for (position, tx) in block.txs.iter().enumerate() {
            inner.tx_index.insert(tx.hash(), (height, position as u32));
            if tx.is_delay() {
                inner.delay_txs.insert(tx.hash(), tx.clone());
            }
        }
        for (position, receipt) in block.receipts.iter().enumerate() {
            inner
                .receipt_index
                .insert(receipt.hash(), (height, position as u32));
        }
        inner.blocks.push(block.clone());
        Ok(())
    }

    fn length(&self) -> u64 {
        self.inner.read().blocks.len() as u64
    }

    fn top(&self) -> Result<Block, ChainError> {
        self.inner
            .read()
            .blocks
            .last()
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn block_by_number(&self, number: i64) -> Result<Block, ChainError> {
        let height = usize::try_from(number).map_err(|_| ChainError::NotFound)?;
        self.inner
            .read()
            .blocks
            .get(height)
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError> {
        let inner = self.inner.read();
        let height = *inner.by_hash.get(hash).ok_or(ChainError::NotFound)?;
        inner
            .blocks
            .get(height as usize)
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn has_tx(&self, hash: &Hash) -> bool {
        self.inner.read().tx_index.contains_key(hash)
    }

    fn tx(&self, hash: &Hash) -> Result<Tx, ChainError> {
        let inner = self.inner.read();
        let &(height, position) = inner.tx_index.get(hash).ok_or(ChainError::NotFound)?;
        inner
            .blocks
            .get(height as usize)
            .and_then(|b| b.txs.get(position as usize))
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn receipt_by_tx_hash(&self, tx_hash: &Hash) -> Result<Receipt, ChainError> {
        let inner = self.inner.read();
        let &(height, position) = inner.tx_index.get(tx_hash).ok_or(ChainError::NotFound)?;
        inner
            .blocks
            .get(height as usize)
            .and_then(|b| b.receipts.get(position as usize))
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn receipt_by_hash(&self, hash: &Hash) -> Result<Receipt, ChainError> {
        let inner = self.inner.read();
        let &(height, position) = inner.receipt_index.get(hash).ok_or(ChainError::NotFound)?;
        inner
            .blocks
            .get(height as usize)
            .and_then(|b| b.receipts.get(position as usize))
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    fn all_delay_txs(&self) -> Result<Vec<Tx>, ChainError> {
        Ok(self.inner.read().delay_txs.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaon_types::block::BlockHead;
    use kaon_types::receipt::Status;
    use kaon_types::tx::Action;

    fn sample_block(number: i64, parent: Hash, with_delay: bool) -> Block {
        let mut tx = Tx::new(
            vec![Action::new("token.kaon", "transfer", "[]")],
            number * 10 + 1,
            number * 10 + 100,
            1000,
            100,
            if with_delay { 50 } else { 0 },
        );
        tx.publisher = format!("pub{number}");
        let receipt = Receipt {
            tx_hash: tx.hash(),
            status: Status::success(),
            gas_usage: 7,
            ..Default::default()
        };
        let mut block = Block {
            head: BlockHead {
                version: 0,
                parent_hash: parent,
                txs_hash: [0u8; 32],
                merkle_hash: [0u8; 32],
                info: Vec::new(),
                number,
                witness: "w1".into(),
                time: number * 10,
            },
            sign: Default::default(),
            txs: vec![tx],
            receipts: vec![receipt],
        };
        block.seal_roots();
        block
    }

    fn check_store(store: &dyn ChainStore) {
        let genesis = sample_block(0, [0u8; 32], false);
        let b1 = sample_block(1, genesis.head_hash(), true);

        store.push(&genesis).unwrap();
        store.push(&b1).unwrap();
        assert_eq!(store.length(), 2);
        assert_eq!(store.top().unwrap().head.number, 1);

        // Out-of-order push is refused; length is monotonic.
        assert!(store.push(&b1).is_err());
        assert_eq!(store.length(), 2);

        let got = store.block_by_number(1).unwrap();
        assert_eq!(got, b1);
        assert_eq!(store.block_by_hash(&b1.head_hash()).unwrap(), b1);
        assert!(matches!(
            store.block_by_number(9),
            Err(ChainError::NotFound)
        ));

        let tx = &b1.txs[0];
        assert!(store.has_tx(&tx.hash()));
        assert_eq!(store.tx(&tx.hash()).unwrap(), *tx);
        let receipt = store.receipt_by_tx_hash(&tx.hash()).unwrap();
        assert_eq!(receipt, b1.receipts[0]);
        assert_eq!(
            store.receipt_by_hash(&receipt.hash()).unwrap(),
            b1.receipts[0]
        );

        let delays = store.all_delay_txs().unwrap();
        assert_eq!(delays.len(), 1);
        assert_eq!(delays[0].hash(), tx.hash());
    }

    #[test]
    fn mem_store_roundtrip() {
        check_store(&MemChainStore::new());
    }

    #[test]
    fn redb_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbChainStore::open(dir.path().join("chain.redb")).unwrap();
        check_store(&store);
    }

    #[test]
    fn redb_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.redb");
        let genesis = sample_block(0, [0u8; 32], true);
        {
            let store = RedbChainStore::open(&path).unwrap();
            store.push(&genesis).unwrap();
        }
        let store = RedbChainStore::open(&path).unwrap();
        assert_eq!(store.length(), 1);
        assert_eq!(store.top().unwrap(), genesis);
        assert_eq!(store.all_delay_txs().unwrap().len(), 1);
    }
}
