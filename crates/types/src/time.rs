// Path: crates/types/src/time.rs
//! Nanosecond timestamps.
//!
//! Every consensus-visible instant (transaction creation, expiration, block
//! slot time) is an `i64` count of nanoseconds since the UNIX epoch. Inside
//! contract execution the block slot time is the only clock; wall time is
//! consulted only at admission and scheduling boundaries.

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// The current wall-clock time in nanoseconds since the UNIX epoch.
pub fn now_ns() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        // Clock before epoch: clamp to zero rather than crash the loop.
        Err(_) => 0,
    }
}

/// Converts whole seconds to nanoseconds, saturating on overflow.
pub fn secs_to_ns(secs: i64) -> i64 {
    secs.saturating_mul(NANOS_PER_SEC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(secs_to_ns(3), 3_000_000_000);
        assert_eq!(secs_to_ns(i64::MAX), i64::MAX);
    }

    #[test]
    fn now_is_positive() {
        assert!(now_ns() > 0);
    }
}
