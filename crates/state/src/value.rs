// Path: crates/state/src/value.rs
//! Self-describing value encoding for the state store.
//!
//! Stored values carry a one-byte type prefix so the store stays
//! language-neutral: `i` int64 (little-endian), `s` UTF-8 string, `b` bool,
//! `d` raw bytes, `f` fixed-point (decimal string). Unknown prefixes decode
//! to `InvalidDbValType`.

use kaon_api::vm::DbValue;
use kaon_types::error::StateError;
use kaon_types::fixed::FixedPoint;

const TAG_INT: u8 = b'i';
const TAG_STR: u8 = b's';
const TAG_BOOL: u8 = b'b';
const TAG_BYTES: u8 = b'd';
const TAG_FIXED: u8 = b'f';

/// Encodes a value with its type prefix.
pub fn encode(value: &DbValue) -> Result<Vec<u8>, StateError> {
    Ok(match value {
        DbValue::Int(i) => {
            let mut out = vec![TAG_INT];
            out.extend_from_slice(&i.to_le_bytes());
            out
        }
        DbValue::Str(s) => {
            let mut out = vec![TAG_STR];
            out.extend_from_slice(s.as_bytes());
            out
        }
        DbValue::Bool(b) => vec![TAG_BOOL, u8::from(*b)],
        DbValue::Bytes(b) => {
            let mut out = vec![TAG_BYTES];
            out.extend_from_slice(b);
            out
        }
        DbValue::Fixed(f) => {
            let s = f
                .marshal()
                .map_err(|e| StateError::Decode(e.to_string()))?;
            let mut out = vec![TAG_FIXED];
            out.extend_from_slice(s.as_bytes());
            out
        }
        DbValue::Nil => return Err(StateError::InvalidDbValType),
    })
}

/// Decodes a type-prefixed value.
pub fn decode(bytes: &[u8]) -> Result<DbValue, StateError> {
    let (&tag, payload) = match bytes.split_first() {
        Some(split) => split,
        None => return Err(StateError::InvalidDbValType),
    };
    match tag {
        TAG_INT => {
            let arr: [u8; 8] = payload
                .try_into()
                .map_err(|_| StateError::Decode("int payload must be 8 bytes".into()))?;
            Ok(DbValue::Int(i64::from_le_bytes(arr)))
        }
        TAG_STR => Ok(DbValue::Str(
            String::from_utf8(payload.to_vec())
                .map_err(|e| StateError::Decode(e.to_string()))?,
        )),
        TAG_BOOL => match payload {
            [0] => Ok(DbValue::Bool(false)),
            [1] => Ok(DbValue::Bool(true)),
            _ => Err(StateError::Decode("bool payload must be one byte".into())),
        },
        TAG_BYTES => Ok(DbValue::Bytes(payload.to_vec())),
        TAG_FIXED => {
            let s = std::str::from_utf8(payload)
                .map_err(|e| StateError::Decode(e.to_string()))?;
            let f = FixedPoint::unmarshal(s)
                .map_err(|e| StateError::Decode(e.to_string()))?;
            Ok(DbValue::Fixed(f))
        }
        _ => Err(StateError::InvalidDbValType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_variants() {
        let values = [
            DbValue::Int(-42),
            DbValue::Str("héllo".into()),
            DbValue::Bool(true),
            DbValue::Bool(false),
            DbValue::Bytes(vec![0, 255, 7]),
            DbValue::Fixed(FixedPoint::new(-1230, 2)),
        ];
        for v in values {
            let encoded = encode(&v).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(v, decoded);
        }
    }

    #[test]
    fn unknown_prefix_is_invalid_type() {
        assert!(matches!(
            decode(b"zpayload"),
            Err(StateError::InvalidDbValType)
        ));
        assert!(matches!(decode(b""), Err(StateError::InvalidDbValType)));
    }

    #[test]
    fn nil_is_not_encodable() {
        assert!(encode(&DbValue::Nil).is_err());
    }
}
