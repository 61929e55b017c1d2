// Path: crates/types/src/block.rs
//! Blocks and block heads.

use crate::codec;
use crate::receipt::Receipt;
use crate::tx::{Signature, Tx};
use crate::Hash;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// The header of a block, hashed for signing and identity.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct BlockHead {
    /// The block format version.
    pub version: u64,
    /// The head hash of the parent block.
    pub parent_hash: Hash,
    /// Digest over the ordered transaction hashes.
    pub txs_hash: Hash,
    /// Merkle root over the ordered receipt hashes.
    pub merkle_hash: Hash,
    /// Opaque producer-supplied bytes.
    pub info: Vec<u8>,
    /// The block number; parent.number + 1.
    pub number: i64,
    /// The producing witness id.
    pub witness: String,
    /// The slot time in nanoseconds. The only clock contracts observe.
    pub time: i64,
}

impl BlockHead {
    /// The deterministic head hash over the canonical encoding.
    pub fn hash(&self) -> Hash {
        kaon_crypto::sha256(&codec::to_bytes_canonical(self))
    }
}

/// A block: head, witness signature over the head hash, and the positional
/// transaction/receipt lists. Immutable after signing.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Block {
    /// The block header.
    pub head: BlockHead,
    /// The witness signature over `head.hash()`.
    pub sign: Signature,
    /// The ordered transactions; index 0 is the base tx.
    pub txs: Vec<Tx>,
    /// Receipts, positionally corresponding to `txs`.
    pub receipts: Vec<Receipt>,
}

impl Block {
    /// The head hash, which identifies the block everywhere.
    pub fn head_hash(&self) -> Hash {
        self.head.hash()
    }

    /// Digest over the concatenated transaction hashes, in order.
    pub fn compute_txs_hash(txs: &[Tx]) -> Hash {
        let mut acc = Vec::with_capacity(txs.len() * 32);
        for tx in txs {
            acc.extend_from_slice(&tx.hash());
        }
        kaon_crypto::sha256(&acc)
    }

    /// Binary merkle root over the receipt hashes. The last node is
    /// duplicated on odd levels; an empty list hashes the empty string.
    pub fn compute_merkle_hash(receipts: &[Receipt]) -> Hash {
        let mut level: Vec<Hash> = receipts.iter().map(Receipt::hash).collect();
        if level.is_empty() {
            return kaon_crypto::sha256(b"");
        }
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                if let Some(last) = level.last().copied() {
                    level.push(last);
                }
            }
            level = level
                .chunks(2)
                .map(|pair| {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(&pair[0]);
                    buf[32..].copy_from_slice(&pair[1]);
                    kaon_crypto::sha256(&buf)
                })
                .collect();
        }
        level[0]
    }

    /// Recomputes both body roots and writes them into the head.
    pub fn seal_roots(&mut self) {
        self.head.txs_hash = Self::compute_txs_hash(&self.txs);
        self.head.merkle_hash = Self::compute_merkle_hash(&self.receipts);
    }

    /// Signs the head hash with the witness key.
    pub fn sign_head(&mut self, key: &kaon_crypto::KeyPair) {
        let hash = self.head.hash();
        self.sign = Signature {
            pubkey: key.public_key(),
            sig: key.sign(&hash),
        };
    }

    /// Verifies the head signature against the given witness public key.
    pub fn verify_sign(&self, witness_pubkey: &[u8]) -> bool {
        if self.sign.pubkey != witness_pubkey {
            return false;
        }
        self.sign.verify(&self.head.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::Status;
    use crate::tx::Action;

    fn block_with(txs: Vec<Tx>, receipts: Vec<Receipt>) -> Block {
        let mut blk = Block {
            head: BlockHead {
                version: 0,
                parent_hash: [0u8; 32],
                txs_hash: [0u8; 32],
                merkle_hash: [0u8; 32],
                info: Vec::new(),
                number: 1,
                witness: "w".into(),
                time: 42,
            },
            sign: Signature::default(),
            txs,
            receipts,
        };
        blk.seal_roots();
        blk
    }

    #[test]
    fn roundtrip() {
        let tx = Tx::new(
            vec![Action::new("token.kaon", "transfer", "[]")],
            1,
            2,
            100,
            100,
            0,
        );
        let receipt = Receipt {
            tx_hash: tx.hash(),
            status: Status::success(),
            ..Default::default()
        };
        let blk = block_with(vec![tx], vec![receipt]);
        let bytes = codec::to_bytes_canonical(&blk);
        let back: Block = codec::from_bytes_canonical(&bytes).unwrap();
        assert_eq!(blk, back);
        assert_eq!(blk.head_hash(), back.head_hash());
    }

    #[test]
    fn sign_verify() {
        let kp = kaon_crypto::KeyPair::generate();
        let mut blk = block_with(Vec::new(), Vec::new());
        blk.head.witness = kp.id();
        blk.sign_head(&kp);
        assert!(blk.verify_sign(&kp.public_key()));

        let other = kaon_crypto::KeyPair::generate();
        assert!(!blk.verify_sign(&other.public_key()));
    }

    #[test]
    fn merkle_is_order_sensitive() {
        let r1 = Receipt {
            tx_hash: [1u8; 32],
            ..Default::default()
        };
        let r2 = Receipt {
            tx_hash: [2u8; 32],
            ..Default::default()
        };
        let a = Block::compute_merkle_hash(&[r1.clone(), r2.clone()]);
        let b = Block::compute_merkle_hash(&[r2, r1]);
        assert_ne!(a, b);
    }

    #[test]
    fn merkle_odd_level_duplicates_last() {
        let rs: Vec<Receipt> = (0..3)
            .map(|i| Receipt {
                tx_hash: [i as u8; 32],
                ..Default::default()
            })
            .collect();
        // Should not panic and must be deterministic.
        assert_eq!(
            Block::compute_merkle_hash(&rs),
            Block::compute_merkle_hash(&rs)
        );
    }
}
