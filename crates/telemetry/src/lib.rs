// Path: crates/telemetry/src/lib.rs
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
//! Tracing subscriber initialization for the node binary.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `filter` is a standard
/// `EnvFilter` directive (`info,pob=debug`); the `RUST_LOG` environment
/// variable overrides it.
pub fn init_tracing(filter: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| anyhow::anyhow!("invalid log filter {filter:?}: {e}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn first_init_wins_second_errors() {
        assert!(super::init_tracing("info,pob=debug").is_ok());
        assert!(super::init_tracing("info").is_err());
    }
}
