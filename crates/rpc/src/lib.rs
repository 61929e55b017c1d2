// Path: crates/rpc/src/lib.rs
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
//! The HTTP/JSON RPC gateway.
//!
//! One route per operation of the public surface. Errors are rendered as
//! `{"error": {"code", "message"}}` with the stable machine code from the
//! error taxonomy. `subscribe` streams newline-delimited JSON events and
//! ends after sixty seconds without traffic.

pub mod dto;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{http::StatusCode, Json, Router};
use dto::*;
use kaon_api::chain::ChainStore;
use kaon_api::event::{EventHub, Topic};
use kaon_api::state::MvccStore;
use kaon_api::transport::Transport;
use kaon_api::vm::DbValue;
use kaon_chain::BlockCache;
use kaon_executor::{HeadTemplate, Verifier};
use kaon_state::visitor::{Visitor, NATIVE_TOKEN};
use kaon_types::block::Block;
use kaon_types::codec;
use kaon_types::contract::CONTRACT_ID_PREFIX;
use kaon_types::error::{ErrorCode, RpcError};
use kaon_types::receipt::Receipt;
use kaon_types::time::now_ns;
use kaon_types::tx::Tx;
use kaon_types::Hash;
use kaon_txpool::{TxPool, TxSource};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Idle cutoff for event streams.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Per-subscriber event buffer.
const STREAM_BUFFER: usize = 100;
/// Wall-clock budget for `exec_tx` trial execution.
const EXEC_TX_LIMIT: Duration = Duration::from_millis(300);

/// Build/identity strings shown by `get_node_info`.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    /// Git hash of the build.
    pub git_hash: String,
    /// Build timestamp.
    pub build_time: String,
    /// Node mode string (e.g. `witness`, `observer`).
    pub mode: String,
}

/// Shared dependencies of every handler.
pub struct RpcContext {
    /// Chain network identifier.
    pub chain_id: String,
    /// Protocol version string.
    pub protocol_version: String,
    /// Declared witness list.
    pub witness_list: Vec<String>,
    /// Build metadata.
    pub meta: NodeMeta,
    /// The durable chain store.
    pub chain: Arc<dyn ChainStore>,
    /// The shared block cache (read side).
    pub cache: Arc<RwLock<BlockCache>>,
    /// The transaction pool.
    pub txpool: Arc<TxPool>,
    /// A dedicated state handle for read-path checkouts.
    pub store: Mutex<Box<dyn MvccStore>>,
    /// Trial executor for `exec_tx`.
    pub verifier: Verifier,
    /// The event hub backing `subscribe`.
    pub events: Arc<EventHub>,
    /// The gossip transport (peer listing).
    pub transport: Arc<dyn Transport>,
    /// Maximum concurrent event streams.
    pub max_streams: usize,
    streams: AtomicUsize,
}

impl RpcContext {
    /// Creates the handler context.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: String,
        protocol_version: String,
        witness_list: Vec<String>,
        meta: NodeMeta,
        chain: Arc<dyn ChainStore>,
        cache: Arc<RwLock<BlockCache>>,
        txpool: Arc<TxPool>,
        store: Box<dyn MvccStore>,
        events: Arc<EventHub>,
        transport: Arc<dyn Transport>,
        max_streams: usize,
    ) -> Self {
        Self {
            chain_id,
            protocol_version,
            witness_list,
            meta,
            verifier: Verifier::new(chain.clone()),
            chain,
            cache,
            txpool,
            store: Mutex::new(store),
            events,
            transport,
            max_streams,
            streams: AtomicUsize::new(0),
        }
    }
}

/// Handler-level error wrapper rendering the taxonomy codes.
#[derive(Debug)]
struct AppError(RpcError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RpcError::InvalidParams(_) | RpcError::Admission(_) => StatusCode::BAD_REQUEST,
            RpcError::NotFound => StatusCode::NOT_FOUND,
            RpcError::StreamCountExceed => StatusCode::TOO_MANY_REQUESTS,
            RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(target: "rpc", error = %self.0, "internal rpc error");
        }
        let body = serde_json::json!({
            "error": { "code": self.0.code(), "message": self.0.to_string() }
        });
        (status, Json(body)).into_response()
    }
}

impl<E: Into<RpcError>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

type Ctx = State<Arc<RpcContext>>;
type AppResult<T> = Result<Json<T>, AppError>;

fn parse_hash(b58: &str) -> Result<Hash, AppError> {
    let bytes = kaon_crypto::base58_decode(b58)
        .map_err(|e| RpcError::InvalidParams(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| RpcError::InvalidParams("hash must be 32 bytes".into()).into())
}

fn decode_tx(request: &RawTxRequest) -> Result<Tx, AppError> {
    let bytes =
        hex::decode(&request.data).map_err(|e| RpcError::InvalidParams(e.to_string()))?;
    codec::from_bytes_canonical::<Tx>(&bytes)
        .map_err(|e| RpcError::InvalidParams(e).into())
}

async fn get_node_info(State(ctx): Ctx) -> AppResult<NodeInfoResponse> {
    let peer_list: Vec<PeerInfo> = ctx
        .transport
        .peers()
        .into_iter()
        .map(|id| PeerInfo {
            id,
            addr: String::new(),
        })
        .collect();
    Ok(Json(NodeInfoResponse {
        network_id: ctx.chain_id.clone(),
        peer_count: peer_list.len(),
        peer_list,
        git_hash: ctx.meta.git_hash.clone(),
        build_time: ctx.meta.build_time.clone(),
        mode: ctx.meta.mode.clone(),
    }))
}

async fn get_chain_info(State(ctx): Ctx) -> AppResult<ChainInfoResponse> {
    let (head, lib) = {
        let cache = ctx.cache.read();
        (cache.head().block.clone(), cache.linked_root().block.clone())
    };
    Ok(Json(ChainInfoResponse {
        net_type: ctx.chain_id.clone(),
        protocol_version: ctx.protocol_version.clone(),
        height: ctx.chain.length() as i64 - 1,
        witness_list: ctx.witness_list.clone(),
        head_block: BlockInfo::from_block(&head, false),
        lib_block: BlockInfo::from_block(&lib, false),
    }))
}

async fn get_tx_by_hash(State(ctx): Ctx, Path(hash): Path<String>) -> AppResult<TxResponse> {
    let hash = parse_hash(&hash)?;
    let tx = ctx.chain.tx(&hash)?;
    Ok(Json(TxResponse {
        hash: kaon_crypto::base58_encode(&tx.hash()),
        tx,
    }))
}

async fn get_tx_receipt_by_hash(
    State(ctx): Ctx,
    Path(hash): Path<String>,
) -> AppResult<ReceiptResponse> {
    let hash = parse_hash(&hash)?;
    let receipt = ctx.chain.receipt_by_hash(&hash)?;
    Ok(Json(receipt_response(receipt)))
}

async fn get_tx_receipt_by_tx_hash(
    State(ctx): Ctx,
    Path(tx_hash): Path<String>,
) -> AppResult<ReceiptResponse> {
    let tx_hash = parse_hash(&tx_hash)?;
    let receipt = ctx.chain.receipt_by_tx_hash(&tx_hash)?;
    Ok(Json(receipt_response(receipt)))
}

fn receipt_response(receipt: Receipt) -> ReceiptResponse {
    ReceiptResponse {
        hash: kaon_crypto::base58_encode(&receipt.hash()),
        receipt,
    }
}

/// Finalized blocks first, then the cache (pending branches).
fn lookup_block_by_hash(ctx: &RpcContext, hash: &Hash) -> Result<Block, AppError> {
    if let Ok(block) = ctx.chain.block_by_hash(hash) {
        return Ok(block);
    }
    ctx.cache
        .read()
        .find(hash)
        .map(|node| node.block.clone())
        .ok_or_else(|| RpcError::NotFound.into())
}

async fn get_block_by_hash(
    State(ctx): Ctx,
    Path(hash): Path<String>,
    Query(query): Query<CompleteQuery>,
) -> AppResult<BlockInfo> {
    let hash = parse_hash(&hash)?;
    let block = lookup_block_by_hash(&ctx, &hash)?;
    Ok(Json(BlockInfo::from_block(&block, query.complete)))
}

async fn get_block_by_num(
    State(ctx): Ctx,
    Path(number): Path<i64>,
    Query(query): Query<CompleteQuery>,
) -> AppResult<BlockInfo> {
    let block = match ctx.chain.block_by_number(number) {
        Ok(block) => block,
        Err(_) => ctx
            .cache
            .read()
            .block_by_number(number)
            .cloned()
            .ok_or(RpcError::NotFound)?,
    };
    Ok(Json(BlockInfo::from_block(&block, query.complete)))
}

/// Locks the context's state handle positioned on the head or LIB snapshot.
fn snapshot_store(
    ctx: &RpcContext,
    longest: bool,
) -> Result<parking_lot::MutexGuard<'_, Box<dyn MvccStore>>, AppError> {
    let tag = {
        let cache = ctx.cache.read();
        if longest {
            cache.head().state_tag.clone()
        } else {
            cache.linked_root().state_tag.clone()
        }
    };
    let mut store = ctx.store.lock();
    if !store.checkout(&tag) {
        return Err(RpcError::Internal(format!("snapshot {tag} missing")).into());
    }
    Ok(store)
}

async fn get_balance(
    State(ctx): Ctx,
    Path(account): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> AppResult<BalanceResponse> {
    let mut store = snapshot_store(&ctx, query.use_longest_chain)?;
    let visitor = Visitor::new(&mut **store);
    let balance = visitor.token_balance(NATIVE_TOKEN, &account)?;
    Ok(Json(BalanceResponse { account, balance }))
}

async fn get_contract(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> AppResult<kaon_types::contract::Contract> {
    if !id.contains('.') && !id.starts_with(CONTRACT_ID_PREFIX) {
        return Err(RpcError::InvalidParams(format!(
            "contract id must start with {CONTRACT_ID_PREFIX}"
        ))
        .into());
    }
    let mut store = snapshot_store(&ctx, false)?;
    let visitor = Visitor::new(&mut **store);
    let contract = visitor.contract(&id)?.ok_or(RpcError::NotFound)?;
    Ok(Json(contract))
}

fn db_value_to_json(value: DbValue) -> serde_json::Value {
    match value {
        DbValue::Int(i) => serde_json::Value::from(i),
        DbValue::Str(s) => serde_json::Value::from(s),
        DbValue::Bool(b) => serde_json::Value::from(b),
        DbValue::Bytes(b) => serde_json::Value::from(String::from_utf8_lossy(&b).into_owned()),
        DbValue::Fixed(f) => serde_json::Value::from(f.marshal().unwrap_or_default()),
        DbValue::Nil => serde_json::Value::Null,
    }
}

async fn get_contract_storage(
    State(ctx): Ctx,
    Path((id, key)): Path<(String, String)>,
    Query(query): Query<StorageQuery>,
) -> AppResult<serde_json::Value> {
    let mut store = snapshot_store(&ctx, false)?;
    let visitor = Visitor::new(&mut **store);
    let value = if query.field.is_empty() {
        visitor.get(&id, &key)?
    } else {
        visitor.map_get(&id, &key, &query.field)?
    };
    Ok(Json(db_value_to_json(value)))
}

async fn send_raw_tx(
    State(ctx): Ctx,
    Json(request): Json<RawTxRequest>,
) -> AppResult<SendTxResponse> {
    let tx = decode_tx(&request)?;
    let hash = tx.hash();
    ctx.txpool.add(tx, TxSource::Local)?;
    // Hashes are base58 on every call of this surface.
    Ok(Json(SendTxResponse {
        hash: kaon_crypto::base58_encode(&hash),
    }))
}

async fn exec_tx(
    State(ctx): Ctx,
    Json(request): Json<RawTxRequest>,
) -> AppResult<ReceiptResponse> {
    let tx = decode_tx(&request)?;
    let template = {
        let cache = ctx.cache.read();
        let head = cache.head();
        HeadTemplate {
            parent_hash: head.hash(),
            number: head.number() + 1,
            witness: head.witness().to_string(),
            time: now_ns(),
        }
    };
    let mut store = snapshot_store(&ctx, true)?;
    let receipt = ctx
        .verifier
        .try_tx(&mut **store, &template, &tx, EXEC_TX_LIMIT);
    Ok(Json(receipt_response(receipt)))
}

fn parse_topics(raw: &str) -> Result<Vec<Topic>, AppError> {
    let mut topics = Vec::new();
    for part in raw.split(',').filter(|p| !p.is_empty()) {
        let topic = match part {
            "contract_event" => Topic::ContractEvent,
            "contract_receipt" => Topic::ContractReceipt,
            "new_block" => Topic::NewBlock,
            other => {
                return Err(RpcError::InvalidParams(format!("unknown topic {other}")).into())
            }
        };
        topics.push(topic);
    }
    if topics.is_empty() {
        return Err(RpcError::InvalidParams("no topics requested".into()).into());
    }
    Ok(topics)
}

/// Decrements the live-stream counter when a stream ends for any reason
/// (idle timeout, send error, client disconnect).
struct StreamSlot(Arc<RpcContext>);

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.0.streams.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn subscribe(
    State(ctx): Ctx,
    Query(query): Query<SubscribeQuery>,
) -> Result<Response, AppError> {
    let topics = parse_topics(&query.topics)?;
    let live = ctx.streams.fetch_add(1, Ordering::SeqCst);
    if live >= ctx.max_streams {
        ctx.streams.fetch_sub(1, Ordering::SeqCst);
        return Err(RpcError::StreamCountExceed.into());
    }
    let slot = StreamSlot(ctx.clone());
    let receiver = ctx.events.subscribe(&topics, STREAM_BUFFER);

    // Blocking receive raced against the idle timer; the stream closes on
    // timeout rather than spinning.
    let stream = futures::stream::unfold((receiver, slot), |(mut receiver, slot)| async move {
        match tokio::time::timeout(STREAM_IDLE_TIMEOUT, receiver.recv()).await {
            Ok(Some(event)) => {
                let mut line = serde_json::to_string(&event).unwrap_or_default();
                line.push('\n');
                Some((Ok::<_, std::convert::Infallible>(line), (receiver, slot)))
            }
            // Publisher gone or idle timeout: end the stream.
            Ok(None) | Err(_) => None,
        }
    });

    Ok(axum::body::Body::from_stream(stream).into_response())
}

/// Builds the router for the public surface.
pub fn router(ctx: Arc<RpcContext>) -> Router {
    Router::new()
        .route("/v1/node_info", get(get_node_info))
        .route("/v1/chain_info", get(get_chain_info))
        .route("/v1/tx/:hash", get(get_tx_by_hash))
        .route("/v1/tx_receipt/:hash", get(get_tx_receipt_by_hash))
        .route(
            "/v1/tx_receipt_by_tx/:tx_hash",
            get(get_tx_receipt_by_tx_hash),
        )
        .route("/v1/block_by_hash/:hash", get(get_block_by_hash))
        .route("/v1/block_by_num/:number", get(get_block_by_num))
        .route("/v1/balance/:account", get(get_balance))
        .route("/v1/contract/:id", get(get_contract))
        .route("/v1/contract_storage/:id/:key", get(get_contract_storage))
        .route("/v1/tx", post(send_raw_tx))
        .route("/v1/exec_tx", post(exec_tx))
        .route("/v1/subscribe", get(subscribe))
        .with_state(ctx)
}

/// Serves the gateway until the shutdown signal fires.
pub async fn serve(
    ctx: Arc<RpcContext>,
    listen_addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(target: "rpc", addr = listen_addr, "rpc gateway listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_parse_and_reject() {
        assert_eq!(
            parse_topics("new_block,contract_event").unwrap(),
            vec![Topic::NewBlock, Topic::ContractEvent]
        );
        assert!(parse_topics("").is_err());
        assert!(parse_topics("bogus").is_err());
    }

    #[test]
    fn hash_parsing_validates_length() {
        let good = kaon_crypto::base58_encode(&[1u8; 32]);
        assert!(parse_hash(&good).is_ok());
        let short = kaon_crypto::base58_encode(&[1u8; 4]);
        assert!(parse_hash(&short).is_err());
        assert!(parse_hash("0OIl-not-base58").is_err());
    }

    #[test]
    fn db_values_render_as_json() {
        assert_eq!(db_value_to_json(DbValue::Int(7)), serde_json::json!(7));
        assert_eq!(db_value_to_json(DbValue::Nil), serde_json::Value::Null);
        assert_eq!(
            db_value_to_json(DbValue::Fixed(kaon_types::fixed::FixedPoint::new(150, 2))),
            serde_json::json!("1.50")
        );
    }
}
