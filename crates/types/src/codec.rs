// Path: crates/types/src/codec.rs
//! The canonical, deterministic binary codec for all consensus-critical data.
//!
//! Thin wrappers around `parity-scale-codec` (SCALE). Centralizing the codec
//! here guarantees that every component hashes and persists the exact same
//! byte representation, which is what keeps replaying validators bit-identical.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical byte representation.
///
/// Use this for anything that is hashed, signed, or written to state.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical byte representation, rejecting
/// trailing bytes.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Encode, Decode, Debug, PartialEq, Eq)]
    struct Sample {
        id: u32,
        name: String,
        tags: Vec<u8>,
    }

    #[test]
    fn canonical_roundtrip() {
        let original = Sample {
            id: 7,
            name: "kaon".to_string(),
            tags: vec![1, 2, 3],
        };
        let encoded = to_bytes_canonical(&original);
        let decoded = from_bytes_canonical::<Sample>(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn truncated_input_fails() {
        let original = Sample {
            id: 9,
            name: "trunc".to_string(),
            tags: vec![10, 20, 30],
        };
        let mut encoded = to_bytes_canonical(&original);
        encoded.pop();
        let err = from_bytes_canonical::<Sample>(&encoded).unwrap_err();
        assert!(err.contains("canonical decode failed"));
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut encoded = to_bytes_canonical(&42u32);
        encoded.push(0);
        assert!(from_bytes_canonical::<u32>(&encoded).is_err());
    }
}
