// Path: crates/node/src/main.rs
//! The Kaon node binary.
//!
//! Wires the subsystems together: durable chain store, in-memory state with
//! cold-start replay, transaction pool, defer server, producer/validator
//! loop, synchronizer, and the RPC gateway. The gossip transport here is
//! the in-process loopback; a production deployment plugs the external P2P
//! service into the same `Transport` seam.

use anyhow::{Context, Result};
use clap::Parser;
use kaon_api::chain::ChainStore;
use kaon_api::event::EventHub;
use kaon_api::state::MvccStore;
use kaon_api::transport::{ChannelTransport, MessageType};
use kaon_chain::genesis::{apply_genesis, build_genesis};
use kaon_chain::{BlockCache, RedbChainStore};
use kaon_executor::{ExecConfig, Verifier};
use kaon_pob::schedule::WitnessSchedule;
use kaon_pob::PobController;
use kaon_rpc::{NodeMeta, RpcContext};
use kaon_state::MemMvccStore;
use kaon_sync::{BlockHashQuery, BlockHashResponse, BlockRequest, SyncHeight, Synchronizer};
use kaon_txpool::defer::DeferServer;
use kaon_txpool::{TxPool, TxSource};
use kaon_types::block::Block;
use kaon_types::codec;
use kaon_types::config::NodeConfig;
use kaon_types::tx::Tx;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};

#[derive(Parser, Debug)]
#[command(name = "kaon-node", about = "Kaon blockchain node", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,
}

fn load_config(path: &PathBuf) -> Result<NodeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("cannot parse config {}", path.display()))
}

/// Rebuilds the in-memory state by replaying every finalized block, then
/// flushes so only the top snapshot stays resident.
fn replay_finalized(
    store: &mut MemMvccStore,
    chain: &Arc<RedbChainStore>,
    config: &NodeConfig,
) -> Result<()> {
    let genesis = build_genesis();
    apply_genesis(store, &config.base.genesis, &genesis)
        .map_err(|e| anyhow::anyhow!("genesis state failed: {e}"))?;

    let length = chain.length();
    let chain_dyn: Arc<dyn ChainStore> = chain.clone();
    let verifier = Verifier::new(chain_dyn);
    let mut parent_tag = kaon_crypto::base58_encode(&genesis.head_hash());
    for number in 1..length as i64 {
        let block = chain
            .block_by_number(number)
            .map_err(|e| anyhow::anyhow!("finalized block {number} unreadable: {e}"))?;
        if !store.checkout(&parent_tag) {
            anyhow::bail!("replay lost snapshot {parent_tag}");
        }
        let cfg = ExecConfig::with_limits(Duration::from_secs(60), Duration::from_secs(1));
        verifier
            .verify(&block, store, &cfg)
            .map_err(|e| anyhow::anyhow!("finalized block {number} does not replay: {e}"))?;
        parent_tag = kaon_crypto::base58_encode(&block.head_hash());
    }
    if length > 1 {
        store
            .flush(&parent_tag)
            .map_err(|e| anyhow::anyhow!("replay flush failed: {e}"))?;
        tracing::info!(target: "node", height = length - 1, "state replayed from chain");
    }
    Ok(())
}

async fn run(config: NodeConfig) -> Result<()> {
    std::fs::create_dir_all(&config.base.data_dir)?;
    let chain = Arc::new(RedbChainStore::open(
        config.base.data_dir.join("chain.redb"),
    )?);

    // Genesis bootstrap on an empty chain.
    if chain.length() == 0 {
        let genesis = build_genesis();
        chain.push(&genesis)?;
        tracing::info!(target: "node", "genesis block written");
    }

    let mut store = MemMvccStore::new();
    replay_finalized(&mut store, &chain, &config)?;
    let rpc_store = store.handle();

    let (transport, mut gossip_rx) = ChannelTransport::new();
    let transport = Arc::new(transport);
    let chain_dyn: Arc<dyn ChainStore> = chain.clone();

    let txpool = Arc::new(TxPool::new(
        config.txpool.clone(),
        chain_dyn.clone(),
        transport.clone(),
    ));
    let defer = Arc::new(
        DeferServer::new(txpool.clone())
            .map_err(|e| anyhow::anyhow!("defer index build failed: {e}"))?,
    );
    let events = Arc::new(EventHub::new());
    let cache = Arc::new(RwLock::new(
        BlockCache::new(chain_dyn.clone())
            .map_err(|e| anyhow::anyhow!("cache init failed: {e}"))?,
    ));

    let produce_key = match &config.pob.produce_seed {
        Some(seed) => Some(
            kaon_crypto::KeyPair::from_base58_seed(seed)
                .map_err(|e| anyhow::anyhow!("bad produce seed: {e}"))?,
        ),
        None => None,
    };
    let mode = if produce_key.is_some() {
        "witness"
    } else {
        "observer"
    };
    let schedule = WitnessSchedule::new(
        config.pob.witness_list.clone(),
        config.pob.slot_length_secs,
    );

    let (blocks_tx, blocks_rx) = mpsc::channel::<Block>(1024);
    let sync = Arc::new(Synchronizer::new(
        config.sync.clone(),
        chain_dyn.clone(),
        transport.clone(),
        blocks_tx,
    ));

    let controller = PobController::new(
        schedule,
        produce_key,
        cache.clone(),
        store,
        txpool.clone(),
        defer.clone(),
        transport.clone(),
        events.clone(),
        chain_dyn.clone(),
    );

    let rpc_ctx = Arc::new(RpcContext::new(
        config.base.chain_id.clone(),
        env!("CARGO_PKG_VERSION").to_string(),
        config.pob.witness_list.clone(),
        NodeMeta {
            git_hash: option_env!("KAON_GIT_HASH").unwrap_or("unknown").to_string(),
            build_time: option_env!("KAON_BUILD_TIME").unwrap_or("unknown").to_string(),
            mode: mode.to_string(),
        },
        chain_dyn.clone(),
        cache,
        txpool.clone(),
        Box::new(rpc_store),
        events,
        transport.clone(),
        config.rpc.max_streams,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(controller.run(blocks_rx, shutdown_rx.clone())));
    tasks.push(tokio::spawn(defer.clone().run(shutdown_rx.clone())));
    {
        let listen = config.rpc.listen_addr.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = kaon_rpc::serve(rpc_ctx, &listen, shutdown).await {
                tracing::error!(target: "node", error = %e, "rpc gateway failed");
            }
        }));
    }

    // Inbound gossip dispatch: routes framed messages to the pool and the
    // synchronizer. With the loopback transport this sees our own
    // broadcasts, which the receivers treat as duplicates.
    {
        let txpool = txpool.clone();
        let sync = sync.clone();
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            const PEER: &str = "loopback";
            loop {
                tokio::select! {
                    maybe = gossip_rx.recv() => {
                        let Some((mtype, payload, _priority)) = maybe else { break };
                        dispatch_message(&txpool, &sync, PEER, mtype, &payload);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() { break; }
                    }
                }
            }
        }));
    }

    // Periodic height announcements keep lagging peers pulling.
    {
        let sync = sync.clone();
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sync.announce_height();
                        sync.request_missing();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() { break; }
                    }
                }
            }
        }));
    }

    wait_for_signal().await;
    tracing::info!(target: "node", "shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    tracing::info!(target: "node", "node stopped");
    Ok(())
}

fn dispatch_message(
    txpool: &Arc<TxPool>,
    sync: &Arc<Synchronizer>,
    peer: &str,
    mtype: MessageType,
    payload: &[u8],
) {
    match mtype {
        MessageType::Tx => match codec::from_bytes_canonical::<Tx>(payload) {
            Ok(tx) => {
                if let Err(e) = txpool.add(tx, TxSource::Remote) {
                    tracing::debug!(target: "node", error = %e, "gossiped tx rejected");
                }
            }
            Err(e) => tracing::debug!(target: "node", error = %e, "bad tx payload"),
        },
        MessageType::NewBlock => match codec::from_bytes_canonical::<Block>(payload) {
            Ok(block) => sync.on_block(block),
            Err(e) => tracing::debug!(target: "node", error = %e, "bad block payload"),
        },
        MessageType::NewBlockHash => {
            // Compact announcement: pull the body if we do not have it.
            if let Ok(announce) = codec::from_bytes_canonical::<BlockRequest>(payload) {
                sync.on_block_announce(peer, announce.hash);
            }
        }
        MessageType::SyncHeight => {
            if let Ok(height) = codec::from_bytes_canonical::<SyncHeight>(payload) {
                sync.on_height(peer, height);
            }
        }
        MessageType::BlockHashQuery => {
            if let Ok(query) = codec::from_bytes_canonical::<BlockHashQuery>(payload) {
                sync.on_hash_query(peer, query);
            }
        }
        MessageType::BlockHashResponse => {
            if let Ok(response) = codec::from_bytes_canonical::<BlockHashResponse>(payload) {
                sync.on_hash_response(peer, response);
            }
        }
        MessageType::BlockRequest => {
            if let Ok(request) = codec::from_bytes_canonical::<BlockRequest>(payload) {
                sync.on_block_request(peer, request);
            }
        }
    }
}

async fn wait_for_signal() {
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(target: "node", error = %e, "signal handler failed");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(target: "node", error = %e, "signal handler failed");
            return;
        }
    };
    let mut quit = match signal(SignalKind::quit()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(target: "node", error = %e, "signal handler failed");
            return;
        }
    };
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            std::process::exit(1);
        }
    };
    if let Err(e) = kaon_telemetry::init_tracing(&config.log.filter) {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
    if let Err(e) = run(config).await {
        tracing::error!(target: "node", error = %e, "fatal initialization error");
        std::process::exit(1);
    }
}
