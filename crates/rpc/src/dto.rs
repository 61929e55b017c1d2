// Path: crates/rpc/src/dto.rs
//! Request and response shapes for the RPC surface.

use kaon_types::block::{Block, BlockHead};
use kaon_types::fixed::FixedPoint;
use kaon_types::receipt::Receipt;
use kaon_types::tx::Tx;
use serde::{Deserialize, Serialize};

/// One connected peer.
#[derive(Debug, Serialize, Deserialize)]
pub struct PeerInfo {
    /// The peer's identity string.
    pub id: String,
    /// The peer's address, when the transport exposes one.
    pub addr: String,
}

/// Response of `get_node_info`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeInfoResponse {
    /// The chain network identifier.
    pub network_id: String,
    /// Connected peers.
    pub peer_list: Vec<PeerInfo>,
    /// Number of connected peers.
    pub peer_count: usize,
    /// Build git hash.
    pub git_hash: String,
    /// Build timestamp.
    pub build_time: String,
    /// Node mode string.
    pub mode: String,
}

/// Response of `get_chain_info`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChainInfoResponse {
    /// The chain network identifier.
    pub net_type: String,
    /// Protocol version string.
    pub protocol_version: String,
    /// Finalized chain height (genesis is 0).
    pub height: i64,
    /// The declared witness list.
    pub witness_list: Vec<String>,
    /// The fork-choice head.
    pub head_block: BlockInfo,
    /// The last irreversible block.
    pub lib_block: BlockInfo,
}

/// A block rendered for the RPC surface. Bodies are omitted unless the
/// request asked for a complete block.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockInfo {
    /// The block head.
    pub head: BlockHead,
    /// Base58 head hash.
    pub hash: String,
    /// Base58 hashes of the transactions, in order.
    pub tx_hashes: Vec<String>,
    /// Base58 hashes of the receipts, in order.
    pub receipt_hashes: Vec<String>,
    /// Full transactions (only when `complete`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txs: Option<Vec<Tx>>,
    /// Full receipts (only when `complete`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipts: Option<Vec<Receipt>>,
}

impl BlockInfo {
    /// Renders a block, including bodies only when `complete`.
    pub fn from_block(block: &Block, complete: bool) -> Self {
        Self {
            hash: kaon_crypto::base58_encode(&block.head_hash()),
            tx_hashes: block
                .txs
                .iter()
                .map(|tx| kaon_crypto::base58_encode(&tx.hash()))
                .collect(),
            receipt_hashes: block
                .receipts
                .iter()
                .map(|r| kaon_crypto::base58_encode(&r.hash()))
                .collect(),
            txs: complete.then(|| block.txs.clone()),
            receipts: complete.then(|| block.receipts.clone()),
            head: block.head.clone(),
        }
    }
}

/// Response of `get_tx_by_hash`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TxResponse {
    /// The transaction.
    pub tx: Tx,
    /// Base58 transaction hash.
    pub hash: String,
}

/// Response of the receipt lookups.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    /// The receipt.
    pub receipt: Receipt,
    /// Base58 receipt hash.
    pub hash: String,
}

/// Response of `get_balance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// The account id queried.
    pub account: String,
    /// The balance as a fixed-point decimal string.
    pub balance: FixedPoint,
}

/// Body of `send_raw_tx` and `exec_tx`: canonical transaction bytes.
#[derive(Debug, Serialize, Deserialize)]
pub struct RawTxRequest {
    /// Hex-encoded canonical transaction bytes.
    pub data: String,
}

/// Response of `send_raw_tx`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendTxResponse {
    /// Base58 hash of the admitted transaction.
    pub hash: String,
}

/// Query string for block lookups.
#[derive(Debug, Default, Deserialize)]
pub struct CompleteQuery {
    /// Include transaction and receipt bodies.
    #[serde(default)]
    pub complete: bool,
}

/// Query string for `get_balance`.
#[derive(Debug, Default, Deserialize)]
pub struct BalanceQuery {
    /// Read the longest (head) branch instead of the irreversible one.
    #[serde(default)]
    pub use_longest_chain: bool,
}

/// Query string for `get_contract_storage`.
#[derive(Debug, Default, Deserialize)]
pub struct StorageQuery {
    /// Map field; empty reads the basic key-space.
    #[serde(default)]
    pub field: String,
}

/// Query string for `subscribe`.
#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// Comma-separated topic list.
    pub topics: String,
}
