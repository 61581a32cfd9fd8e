//! Exact 256-bit integer helpers - no floats, no panics, no lossy casts

use primitive_types::{U256, U512};

/// 10^exp, or None if it does not fit 256 bits (exp > 77)
pub fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// floor(a * b / d) through a 512-bit intermediate
///
/// Returns None when d is zero or the quotient does not fit 256 bits.
pub fn mul_div_floor(a: U256, b: U256, d: U256) -> Option<U256> {
    if d.is_zero() {
        return None;
    }
    let quotient = a.full_mul(b) / U512::from(d);
    U256::try_from(quotient).ok()
}
