// Path: crates/chain/src/genesis.rs
//! Genesis block construction and initial state application.

use kaon_api::state::MvccStore;
use kaon_state::visitor::{Visitor, NATIVE_DECIMALS, NATIVE_TOKEN};
use kaon_types::block::{Block, BlockHead};
use kaon_types::config::GenesisConfig;
use kaon_types::error::StateError;

/// The witness name carried by the genesis head.
pub const GENESIS_WITNESS: &str = "genesis";

/// Builds the deterministic genesis block. It carries no transactions; the
/// initial balances are applied directly to the state (see
/// [`apply_genesis`]) so every node derives the identical snapshot.
pub fn build_genesis() -> Block {
    Block {
        head: BlockHead {
            version: 0,
            parent_hash: [0u8; 32],
            txs_hash: [0u8; 32],
            merkle_hash: [0u8; 32],
            info: Vec::new(),
            number: 0,
            witness: GENESIS_WITNESS.to_string(),
            time: 0,
        },
        sign: Default::default(),
        txs: Vec::new(),
        receipts: Vec::new(),
    }
}

/// Writes the configured initial balances into the store and tags the
/// result with the genesis head hash.
pub fn apply_genesis(
    store: &mut dyn MvccStore,
    config: &GenesisConfig,
    genesis: &Block,
) -> Result<(), StateError> {
    store.fork();
    {
        let mut visitor = Visitor::new(&mut *store);
        for (account, amount) in &config.balances {
            let amount = amount
                .rescale(NATIVE_DECIMALS)
                .map_err(|e| StateError::Decode(e.to_string()))?;
            visitor.set_token_balance(NATIVE_TOKEN, account, amount)?;
        }
        for (account, bytes_count) in &config.ram {
            visitor.set_ram_balance(account, *bytes_count)?;
        }
    }
    store.commit();
    store.tag(&kaon_crypto::base58_encode(&genesis.head_hash()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaon_state::MemMvccStore;
    use kaon_types::fixed::FixedPoint;

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(build_genesis().head_hash(), build_genesis().head_hash());
    }

    #[test]
    fn apply_sets_balances_under_genesis_tag() {
        let mut config = GenesisConfig::default();
        config
            .balances
            .insert("alice".into(), FixedPoint::new(1_000_000, 0));
        config.ram.insert("alice".into(), 4096);

        let genesis = build_genesis();
        let mut store = MemMvccStore::new();
        apply_genesis(&mut store, &config, &genesis).unwrap();

        let tag = kaon_crypto::base58_encode(&genesis.head_hash());
        assert!(store.checkout(&tag));
        let mut visitor = Visitor::new(&mut store);
        assert_eq!(
            visitor.token_balance(NATIVE_TOKEN, "alice").unwrap(),
            FixedPoint::new(1_000_000 * 100_000_000, NATIVE_DECIMALS)
        );
        assert_eq!(visitor.ram_balance("alice").unwrap(), 4096);
    }
}
