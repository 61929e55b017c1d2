// Path: crates/types/src/error.rs
//! The error taxonomy for the Kaon node core.
//!
//! Every domain gets its own `thiserror` enum, and every variant maps to a
//! stable, machine-readable string code via [`ErrorCode`]. RPC responses
//! carry these codes verbatim, so renaming a code is a breaking change.

use thiserror::Error;

/// Assigns a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Outcomes of transaction admission into the pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The creation time is outside the admit window, or the tx has expired.
    #[error("transaction time outside the admissible window")]
    Time,
    /// A signature or action failed verification.
    #[error("transaction verification failed: {0}")]
    Verify(String),
    /// The hash is already pending or on the ancestor chain.
    #[error("duplicate transaction")]
    Dup,
    /// The gas ratio is below the configured minimum.
    #[error("gas ratio below minimum")]
    GasPrice,
    /// The pending set is at capacity.
    #[error("transaction cache is full")]
    CacheFull,
}

impl ErrorCode for AdmissionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Time => "TX_TIME_ERROR",
            Self::Verify(_) => "TX_VERIFY_ERROR",
            Self::Dup => "TX_DUP_ERROR",
            Self::GasPrice => "TX_GAS_PRICE_ERROR",
            Self::CacheFull => "TX_CACHE_FULL_ERROR",
        }
    }
}

/// Errors raised while validating a received block.
#[derive(Debug, Error)]
pub enum BlockError {
    /// The slot time does not map to the block's witness.
    #[error("wrong witness for slot")]
    WrongWitness,
    /// The head signature does not verify against the witness key.
    #[error("wrong signature")]
    WrongSignature,
    /// The head hash could not be computed or did not match.
    #[error("wrong head hash")]
    WrongHeadHash,
    /// The block number is not parent.number + 1.
    #[error("invalid block number: expected {expected}, got {got}")]
    InvalidNumber {
        /// The expected number.
        expected: i64,
        /// The number carried by the block.
        got: i64,
    },
    /// The block time is not strictly after its parent's.
    #[error("block time not after parent")]
    TimeNotAfterParent,
    /// A non-base transaction already exists on the ancestor chain.
    #[error("duplicate tx in block")]
    DuplicateTx,
    /// A transaction signature inside the block failed verification.
    #[error("tx wrong signature")]
    TxWrongSignature,
    /// A deferred transaction does not match its referred original.
    #[error("defer tx mismatch: {0}")]
    DeferTxMismatch(String),
    /// Re-execution produced different receipts or roots.
    #[error("execution divergence: {0}")]
    ExecDivergence(String),
    /// The parent block is unknown.
    #[error("parent block not found")]
    ParentNotFound,
    /// A transaction body count did not match the receipt count.
    #[error("txs and receipts length mismatch")]
    LengthMismatch,
}

impl ErrorCode for BlockError {
    fn code(&self) -> &'static str {
        match self {
            Self::WrongWitness => "BLOCK_WRONG_WITNESS",
            Self::WrongSignature => "BLOCK_WRONG_SIGNATURE",
            Self::WrongHeadHash => "BLOCK_WRONG_HEAD_HASH",
            Self::InvalidNumber { .. } => "BLOCK_INVALID_NUMBER",
            Self::TimeNotAfterParent => "BLOCK_TIME_NOT_AFTER_PARENT",
            Self::DuplicateTx => "BLOCK_DUPLICATE_TX",
            Self::TxWrongSignature => "BLOCK_TX_WRONG_SIGNATURE",
            Self::DeferTxMismatch(_) => "BLOCK_DEFER_TX_MISMATCH",
            Self::ExecDivergence(_) => "BLOCK_EXEC_DIVERGENCE",
            Self::ParentNotFound => "BLOCK_PARENT_NOT_FOUND",
            Self::LengthMismatch => "BLOCK_LENGTH_MISMATCH",
        }
    }
}

/// Errors from the state store and visitor.
#[derive(Debug, Error)]
pub enum StateError {
    /// The requested snapshot tag is not known.
    #[error("unknown snapshot tag: {0}")]
    UnknownTag(String),
    /// A stored value had an unknown type prefix.
    #[error("invalid db value type")]
    InvalidDbValType,
    /// A stored value failed to decode.
    #[error("state decode error: {0}")]
    Decode(String),
    /// An error occurred in the backing store.
    #[error("state backend error: {0}")]
    Backend(String),
}

impl ErrorCode for StateError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownTag(_) => "STATE_UNKNOWN_TAG",
            Self::InvalidDbValType => "STATE_INVALID_DB_VAL_TYPE",
            Self::Decode(_) => "STATE_DECODE_ERROR",
            Self::Backend(_) => "STATE_BACKEND_ERROR",
        }
    }
}

/// Errors surfaced by contract execution. These become receipt statuses;
/// they never abort block production.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The gas limit was exhausted.
    #[error("gas run out")]
    GasRunOut,
    /// The per-transaction wall-clock budget was exceeded.
    #[error("execution timeout")]
    Timeout,
    /// The action arguments were malformed.
    #[error("parameter error: {0}")]
    ParamErr(String),
    /// The contract itself failed.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// A stored value had an unknown type prefix.
    #[error("invalid db value type")]
    InvalidDbValType,
    /// The balance was insufficient for a transfer or charge.
    #[error("balance not enough: {0}")]
    BalanceNotEnough(String),
    /// The target contract or method does not exist.
    #[error("host error: {0}")]
    Host(String),
}

impl ErrorCode for VmError {
    fn code(&self) -> &'static str {
        match self {
            Self::GasRunOut => "VM_GAS_RUN_OUT",
            Self::Timeout => "VM_TIMEOUT",
            Self::ParamErr(_) => "VM_PARAM_ERR",
            Self::Runtime(_) => "VM_RUNTIME",
            Self::InvalidDbValType => "VM_INVALID_DB_VAL_TYPE",
            Self::BalanceNotEnough(_) => "VM_BALANCE_NOT_ENOUGH",
            Self::Host(_) => "VM_HOST_ERROR",
        }
    }
}

/// Errors from the durable block chain store.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The block, transaction, or receipt was not found.
    #[error("not found")]
    NotFound,
    /// The storage backend failed.
    #[error("chain backend error: {0}")]
    Backend(String),
    /// Stored bytes failed to decode.
    #[error("chain codec error: {0}")]
    Codec(String),
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "CHAIN_NOT_FOUND",
            Self::Backend(_) => "CHAIN_BACKEND_ERROR",
            Self::Codec(_) => "CHAIN_CODEC_ERROR",
        }
    }
}

/// Errors from the gossip transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The outbound message channel is full.
    #[error("message channel full")]
    ChannelFull,
    /// The peer is not connected.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::ChannelFull => "NET_MESSAGE_CHANNEL_FULL",
            Self::PeerUnavailable(_) => "NET_PEER_UNAVAILABLE",
        }
    }
}

/// Errors returned over the RPC surface.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request parameters were invalid.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// The requested entity does not exist.
    #[error("not found")]
    NotFound,
    /// Transaction admission failed.
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    /// Too many concurrent event streams.
    #[error("stream count exceeded")]
    StreamCountExceed,
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for RpcError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "RPC_INVALID_PARAMS",
            Self::NotFound => "RPC_NOT_FOUND",
            Self::Admission(e) => e.code(),
            Self::StreamCountExceed => "RPC_STREAM_COUNT_EXCEED",
            Self::Internal(_) => "RPC_INTERNAL_ERROR",
        }
    }
}

impl From<ChainError> for RpcError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::NotFound => RpcError::NotFound,
            other => RpcError::Internal(other.to_string()),
        }
    }
}

impl From<StateError> for RpcError {
    fn from(e: StateError) -> Self {
        RpcError::Internal(e.to_string())
    }
}
