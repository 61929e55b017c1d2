// Path: crates/types/src/fixed.rs
//! Fixed-point decimal amounts.
//!
//! A `FixedPoint` is the pair `(value: i64, decimals: u8)` representing
//! `value * 10^-decimals`. Token balances and gas charges are fixed-point
//! values; overflow is a first-class error, never a wrap or a panic.

use parity_scale_codec::{Decode, Encode};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The maximum number of decimal places a fixed-point value may carry.
pub const MAX_DECIMALS: u8 = 18;

/// Errors from fixed-point arithmetic and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FixedPointError {
    /// The operation overflowed the i64 value range.
    #[error("fixed-point overflow")]
    Overflow,
    /// The decimal string contained more than one dot.
    #[error("invalid decimal string: more than one dot")]
    DoubleDot,
    /// The decimal string contained a non-digit character.
    #[error("invalid decimal string: unexpected character {0:?}")]
    InvalidChar(char),
    /// The decimal string contained no digits at all.
    #[error("invalid decimal string: no digits")]
    NoDigits,
    /// The requested precision exceeds `MAX_DECIMALS` or loses digits.
    #[error("unsupported precision")]
    Precision,
}

/// A fixed-point decimal number: `value * 10^-decimals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct FixedPoint {
    /// The scaled integer value.
    pub value: i64,
    /// The number of decimal places.
    pub decimals: u8,
}

fn pow10(exp: u8) -> Result<i64, FixedPointError> {
    10i64
        .checked_pow(u32::from(exp))
        .ok_or(FixedPointError::Overflow)
}

impl FixedPoint {
    /// Creates a fixed-point value from a raw scaled integer.
    pub fn new(value: i64, decimals: u8) -> Self {
        Self { value, decimals }
    }

    /// The zero value at the given precision.
    pub fn zero(decimals: u8) -> Self {
        Self { value: 0, decimals }
    }

    /// Parses a decimal string (`"-323.49494"`) into a fixed-point value
    /// with exactly `decimals` places. Digits beyond `decimals` are an error
    /// rather than a silent truncation.
    pub fn parse(s: &str, decimals: u8) -> Result<Self, FixedPointError> {
        if decimals > MAX_DECIMALS {
            return Err(FixedPointError::Precision);
        }
        let (neg, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let mut int_part = String::new();
        let mut frac_part = String::new();
        let mut seen_dot = false;
        for c in body.chars() {
            match c {
                '.' => {
                    if seen_dot {
                        return Err(FixedPointError::DoubleDot);
                    }
                    seen_dot = true;
                }
                '0'..='9' => {
                    if seen_dot {
                        frac_part.push(c);
                    } else {
                        int_part.push(c);
                    }
                }
                other => return Err(FixedPointError::InvalidChar(other)),
            }
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(FixedPointError::NoDigits);
        }
        if frac_part.len() > usize::from(decimals) {
            return Err(FixedPointError::Precision);
        }

        let mut value: i64 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = i64::from(c as u8 - b'0');
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .ok_or(FixedPointError::Overflow)?;
        }
        let pad = decimals - frac_part.len() as u8;
        value = value
            .checked_mul(pow10(pad)?)
            .ok_or(FixedPointError::Overflow)?;
        if neg {
            value = value.checked_neg().ok_or(FixedPointError::Overflow)?;
        }
        Ok(Self { value, decimals })
    }

    /// Parses a decimal string, inferring the precision from the digits
    /// after the dot. This is the inverse of [`FixedPoint::marshal`].
    pub fn unmarshal(s: &str) -> Result<Self, FixedPointError> {
        let frac_len = match s.split_once('.') {
            Some((_, frac)) => {
                if frac.contains('.') {
                    return Err(FixedPointError::DoubleDot);
                }
                frac.len()
            }
            None => 0,
        };
        let decimals = u8::try_from(frac_len).map_err(|_| FixedPointError::Precision)?;
        Self::parse(s, decimals)
    }

    /// Renders the value as a decimal string, keeping all `decimals` places
    /// (`FixedPoint::new(1230, 2)` marshals to `"12.30"`).
    pub fn marshal(&self) -> Result<String, FixedPointError> {
        // i64::MIN has no positive counterpart; reject instead of wrapping.
        let abs = self.value.checked_abs().ok_or(FixedPointError::Overflow)?;
        let scale = pow10(self.decimals)?;
        let sign = if self.value < 0 { "-" } else { "" };
        if self.decimals == 0 {
            return Ok(format!("{}{}", sign, abs));
        }
        Ok(format!(
            "{}{}.{:0width$}",
            sign,
            abs / scale,
            abs % scale,
            width = usize::from(self.decimals)
        ))
    }

    /// Returns this value expressed with `decimals` places. Growing the
    /// precision is exact; shrinking is only allowed when no digits are lost.
    pub fn rescale(&self, decimals: u8) -> Result<Self, FixedPointError> {
        if decimals > MAX_DECIMALS {
            return Err(FixedPointError::Precision);
        }
        if decimals >= self.decimals {
            let factor = pow10(decimals - self.decimals)?;
            let value = self
                .value
                .checked_mul(factor)
                .ok_or(FixedPointError::Overflow)?;
            Ok(Self { value, decimals })
        } else {
            let factor = pow10(self.decimals - decimals)?;
            if self.value % factor != 0 {
                return Err(FixedPointError::Precision);
            }
            Ok(Self {
                value: self.value / factor,
                decimals,
            })
        }
    }

    fn aligned(&self, other: &Self) -> Result<(i64, i64, u8), FixedPointError> {
        let decimals = self.decimals.max(other.decimals);
        Ok((
            self.rescale(decimals)?.value,
            other.rescale(decimals)?.value,
            decimals,
        ))
    }

    /// Checked addition; operands are aligned to the wider precision.
    pub fn checked_add(&self, other: &Self) -> Result<Self, FixedPointError> {
        let (a, b, decimals) = self.aligned(other)?;
        let value = a.checked_add(b).ok_or(FixedPointError::Overflow)?;
        Ok(Self { value, decimals })
    }

    /// Checked subtraction; operands are aligned to the wider precision.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, FixedPointError> {
        let (a, b, decimals) = self.aligned(other)?;
        let value = a.checked_sub(b).ok_or(FixedPointError::Overflow)?;
        Ok(Self { value, decimals })
    }

    /// Checked multiplication. Decimal places add.
    pub fn checked_mul(&self, other: &Self) -> Result<Self, FixedPointError> {
        let decimals = self
            .decimals
            .checked_add(other.decimals)
            .filter(|d| *d <= MAX_DECIMALS)
            .ok_or(FixedPointError::Precision)?;
        let value = self
            .value
            .checked_mul(other.value)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self { value, decimals })
    }

    /// Checked multiplication by an integer scalar.
    pub fn times(&self, n: i64) -> Result<Self, FixedPointError> {
        let value = self.value.checked_mul(n).ok_or(FixedPointError::Overflow)?;
        Ok(Self {
            value,
            decimals: self.decimals,
        })
    }

    /// True when the value is negative.
    pub fn is_negative(&self) -> bool {
        self.value < 0
    }
}

impl std::fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.marshal() {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<overflow>"),
        }
    }
}

// Fixed-point values cross the RPC boundary as their decimal strings.
impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let s = self
            .marshal()
            .map_err(|e| serde::ser::Error::custom(e.to_string()))?;
        serializer.serialize_str(&s)
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FixedPoint::unmarshal(&s).map_err(|e| D::Error::custom(e.to_string()))
    }
}
