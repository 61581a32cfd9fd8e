//! Fixed-point token amounts
//!
//! Every on-chain balance in the system is an unsigned integer scaled by
//! 10^18. `FixedPointAmount` is the only place that converts between that
//! raw integer and a human-readable decimal string, in both directions.
//! All conversions use integer division and remainder; floats never touch
//! an amount.

use crate::error::{ModelError, Result};
use crate::math::pow10;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub use primitive_types::U256;

/// Decimal exponent shared by every amount in this system (18-decimal token standard)
pub const TOKEN_DECIMALS: u32 = 18;

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Non-negative integer amount scaled by 10^TOKEN_DECIMALS
///
/// Backed by a 256-bit integer, the width of every contract balance, so any
/// value the contract can return is representable. Immutable value type:
/// every operation returns a new amount.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedPointAmount(U256);

impl FixedPointAmount {
    pub const ZERO: FixedPointAmount = FixedPointAmount(U256([0; 4]));

    /// Largest raw value a contract can return (2^256 - 1)
    pub const MAX: FixedPointAmount = FixedPointAmount(U256::MAX);

    /// Wrap a raw on-chain integer
    pub fn from_raw(raw: impl Into<U256>) -> Self {
        FixedPointAmount(raw.into())
    }

    /// Parse raw integer text as returned by the contract-read layer
    ///
    /// Rejects signs, fractional parts and anything that is not plain digits.
    pub fn from_raw_str(text: &str) -> Result<Self> {
        let digits = text.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModelError::InvalidAmount(format!(
                "raw value {:?} is not a non-negative integer",
                text
            )));
        }
        U256::from_dec_str(digits).map(FixedPointAmount).map_err(|_| {
            ModelError::InvalidAmount(format!("raw value {:?} exceeds 256 bits", text))
        })
    }

    /// Whole-token amount, e.g. `from_tokens(100)` is 100.0
    pub fn from_tokens(tokens: u64) -> Self {
        // 2^64 * 10^18 < 2^128
        FixedPointAmount(U256::from(tokens as u128 * ONE_TOKEN))
    }

    /// Parse a user-entered decimal such as "12.5"
    ///
    /// More fractional digits than TOKEN_DECIMALS is an error, never a rounding.
    pub fn from_decimal_str(text: &str) -> Result<Self> {
        parse_units(text, TOKEN_DECIMALS).map(FixedPointAmount)
    }

    /// Exact decimal form, trailing fractional zeros stripped, "0" for zero
    pub fn to_decimal_string(&self) -> String {
        render_units(self.0, U256::from(ONE_TOKEN), TOKEN_DECIMALS, TOKEN_DECIMALS)
    }

    /// Decimal form truncated (not rounded) to `places` fractional digits
    pub fn to_display_string(&self, places: u32) -> String {
        let places = places.min(TOKEN_DECIMALS);
        render_units(self.0, U256::from(ONE_TOKEN), TOKEN_DECIMALS, places)
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self> {
        self.0
            .checked_add(other.0)
            .map(FixedPointAmount)
            .ok_or(ModelError::Overflow)
    }

    /// Fails with `Underflow` instead of wrapping or clamping
    pub fn checked_sub(&self, other: &Self) -> Result<Self> {
        self.0
            .checked_sub(other.0)
            .map(FixedPointAmount)
            .ok_or(ModelError::Underflow {
                minuend: *self,
                subtrahend: *other,
            })
    }

    pub fn compare_to(&self, other: &Self) -> std::cmp::Ordering {
        self.cmp(other)
    }

    /// Exact sum of a sequence of amounts
    pub fn checked_sum<'a, I>(amounts: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a FixedPointAmount>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Lossy conversion for display-only ratios. Never feed the result back
    /// into balance math.
    pub fn to_f64_lossy(&self) -> f64 {
        const LIMB: f64 = 18_446_744_073_709_551_616.0;
        // Limbs are little-endian u64 words
        (self.0).0.iter().rev().fold(0.0, |acc, limb| acc * LIMB + *limb as f64)
    }
}

impl TryFrom<i128> for FixedPointAmount {
    type Error = ModelError;

    fn try_from(raw: i128) -> Result<Self> {
        u128::try_from(raw)
            .map(FixedPointAmount::from_raw)
            .map_err(|_| ModelError::InvalidAmount(format!("raw value {} is negative", raw)))
    }
}

impl From<u128> for FixedPointAmount {
    fn from(raw: u128) -> Self {
        FixedPointAmount(U256::from(raw))
    }
}

impl From<U256> for FixedPointAmount {
    fn from(raw: U256) -> Self {
        FixedPointAmount(raw)
    }
}

impl fmt::Display for FixedPointAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

// Serialized as the raw integer in a string: JSON numbers cannot carry 256 bits
impl Serialize for FixedPointAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FixedPointAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        FixedPointAmount::from_raw_str(&text).map_err(serde::de::Error::custom)
    }
}

fn unsupported_scale(decimals: u32) -> ModelError {
    ModelError::InvalidAmount(format!("unsupported decimal exponent {}", decimals))
}

/// Scale a decimal string up by 10^decimals
///
/// Accepts an optional leading '+', digits, and at most one '.'. Either side
/// of the point may be empty but not both.
pub fn parse_units(text: &str, decimals: u32) -> Result<U256> {
    let invalid = |why: &str| ModelError::InvalidAmount(format!("{:?}: {}", text, why));

    let scale = pow10(decimals).ok_or_else(|| unsupported_scale(decimals))?;

    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned.starts_with('-') {
        return Err(invalid("negative amounts are not allowed"));
    }

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("no digits"));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid("not a decimal number"));
    }
    if frac_part.len() > decimals as usize {
        return Err(invalid("more fractional digits than the token supports"));
    }

    let whole = if int_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(int_part).map_err(|_| invalid("too large"))?
    };

    // Right-pad the fraction to exactly `decimals` digits
    let frac = if frac_part.is_empty() {
        U256::zero()
    } else {
        let pad = pow10(decimals - frac_part.len() as u32).ok_or_else(|| invalid("too large"))?;
        let digits = U256::from_dec_str(frac_part).map_err(|_| invalid("too large"))?;
        digits.checked_mul(pad).ok_or_else(|| invalid("too large"))?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| invalid("too large"))
}

/// Render `raw / 10^decimals`, keeping at most `places` fractional digits
/// (truncated) and stripping trailing zeros
///
/// Fails with `InvalidAmount` when 10^decimals does not fit 256 bits.
pub fn format_units(raw: U256, decimals: u32, places: u32) -> Result<String> {
    let scale = pow10(decimals).ok_or_else(|| unsupported_scale(decimals))?;
    Ok(render_units(raw, scale, decimals, places.min(decimals)))
}

/// `scale` must equal 10^decimals and `places` must not exceed `decimals`
fn render_units(raw: U256, scale: U256, decimals: u32, places: u32) -> String {
    let (quotient, remainder) = raw.div_mod(scale);

    if remainder.is_zero() || places == 0 {
        return quotient.to_string();
    }

    // remainder < 10^decimals, so it has at most `decimals` digits
    let digits = remainder.to_string();
    let padded = format!("{}{}", "0".repeat(decimals as usize - digits.len()), digits);
    let trimmed = padded[..places as usize].trim_end_matches('0');

    if trimmed.is_empty() {
        quotient.to_string()
    } else {
        format!("{}.{}", quotient, trimmed)
    }
}
