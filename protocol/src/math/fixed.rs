//! # Q64.64 Fixed-Point Type
//!
//! [`Fixed`] wraps an `i128` whose low 64 bits are the fraction. That gives
//! 63 integer bits plus sign, which covers normalized supplies in the
//! billions with room to spare.
//!
//! Products and quotients are formed in a 256-bit intermediate and then
//! narrowed, so `a * b` never loses high bits silently: anything that does
//! not fit comes back as [`MathError::Overflow`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uint::construct_uint;

use super::MathError;

construct_uint! {
    /// 256-bit intermediate for Q64.64 products and quotients.
    pub(crate) struct U256(4);
}

/// Number of fractional bits.
pub const FRAC_BITS: u32 = 64;

const ONE_RAW: i128 = 1 << FRAC_BITS;
const LOW_MASK: u128 = u64::MAX as u128;

/// A signed Q64.64 fixed-point number.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fixed(i128);

impl Fixed {
    /// Zero.
    pub const ZERO: Fixed = Fixed(0);

    /// One.
    pub const ONE: Fixed = Fixed(ONE_RAW);

    /// Largest representable value.
    pub const MAX: Fixed = Fixed(i128::MAX);

    /// Builds a value from its raw Q64.64 representation.
    pub const fn from_raw(raw: i128) -> Self {
        Fixed(raw)
    }

    /// Returns the raw Q64.64 representation.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Converts a whole number. Fails if `|n| >= 2^63`.
    pub fn from_int(n: i128) -> Result<Self, MathError> {
        n.checked_mul(ONE_RAW).map(Fixed).ok_or(MathError::Overflow)
    }

    /// Exact-as-possible `num / den`, truncated toward zero.
    pub fn from_ratio(num: u128, den: u128) -> Result<Self, MathError> {
        let mag = ratio_q64(num, den)?;
        Ok(Fixed(mag as i128))
    }

    /// Interprets `amount` as a decimal with `decimals` fractional digits,
    /// e.g. `from_scaled(1_500_000, 6) == 1.5`.
    pub fn from_scaled(amount: u128, decimals: u32) -> Result<Self, MathError> {
        let scale = 10u128.checked_pow(decimals).ok_or(MathError::Overflow)?;
        Self::from_ratio(amount, scale)
    }

    /// Converts to an integer with `decimals` fractional digits, rounding
    /// toward negative infinity. Negative values are rejected.
    pub fn to_scaled_floor(self, decimals: u32) -> Result<u128, MathError> {
        if self.0 < 0 {
            return Err(MathError::NegativeInput);
        }
        let scale = 10u128.checked_pow(decimals).ok_or(MathError::Overflow)?;
        let raw = self.0 as u128;
        let int_part = raw >> FRAC_BITS;
        let frac_part = raw & LOW_MASK;

        // frac_part < 2^64 and scale < 2^128, so the shifted product is below 2^128.
        let frac_scaled = narrow(mul_wide(frac_part, scale)? >> FRAC_BITS)?;

        int_part
            .checked_mul(scale)
            .and_then(|v| v.checked_add(frac_scaled))
            .ok_or(MathError::Overflow)
    }

    /// Largest integer not greater than `self`.
    pub fn floor(self) -> i128 {
        self.0 >> FRAC_BITS
    }

    /// Whether the value is strictly negative.
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Whether the value is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Fixed) -> Result<Fixed, MathError> {
        self.0.checked_add(rhs.0).map(Fixed).ok_or(MathError::Overflow)
    }

    pub fn checked_sub(self, rhs: Fixed) -> Result<Fixed, MathError> {
        self.0.checked_sub(rhs.0).map(Fixed).ok_or(MathError::Overflow)
    }

    pub fn checked_neg(self) -> Result<Fixed, MathError> {
        self.0.checked_neg().map(Fixed).ok_or(MathError::Overflow)
    }

    /// `self * rhs`, truncated toward zero.
    pub fn checked_mul(self, rhs: Fixed) -> Result<Fixed, MathError> {
        let negative = (self.0 < 0) != (rhs.0 < 0);
        let product = mul_wide(self.0.unsigned_abs(), rhs.0.unsigned_abs())?;
        let mag = narrow(product >> FRAC_BITS)?;
        apply_sign(mag, negative)
    }

    /// `self / rhs`, truncated toward zero.
    pub fn checked_div(self, rhs: Fixed) -> Result<Fixed, MathError> {
        let negative = (self.0 < 0) != (rhs.0 < 0);
        let mag = ratio_q64(self.0.unsigned_abs(), rhs.0.unsigned_abs())?;
        apply_sign(mag, negative)
    }

    /// `self * n` for a whole-number multiplier.
    pub fn checked_mul_int(self, n: i128) -> Result<Fixed, MathError> {
        self.0.checked_mul(n).map(Fixed).ok_or(MathError::Overflow)
    }

    /// `self / n` for a whole-number divisor, truncated toward zero.
    pub fn checked_div_int(self, n: i128) -> Result<Fixed, MathError> {
        if n == 0 {
            return Err(MathError::DivisionByZero);
        }
        self.0.checked_div(n).map(Fixed).ok_or(MathError::Overflow)
    }

    /// Lossy conversion for logging and test comparisons.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / ONE_RAW as f64
    }
}

impl fmt::Display for Fixed {
    /// Prints up to 12 fractional digits, truncated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DIGITS: u32 = 12;
        let mag = self.0.unsigned_abs();
        let int_part = mag >> FRAC_BITS;
        let frac = ((mag & LOW_MASK) * 10u128.pow(DIGITS)) >> FRAC_BITS;
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{int_part}.{frac:012}")
    }
}

/// Full-width product of two `u128` values.
fn mul_wide(a: u128, b: u128) -> Result<U256, MathError> {
    let (product, overflow) = U256::from(a).overflowing_mul(U256::from(b));
    if overflow {
        return Err(MathError::Overflow);
    }
    Ok(product)
}

/// Narrows a 256-bit intermediate back to `u128`.
fn narrow(value: U256) -> Result<u128, MathError> {
    if value.bits() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

/// Q64.64 magnitude of `num / den`, truncated.
///
/// The integer quotient must stay below 2^63 so the result still fits a
/// signed `Fixed`.
fn ratio_q64(num: u128, den: u128) -> Result<u128, MathError> {
    if den == 0 {
        return Err(MathError::DivisionByZero);
    }
    let quotient = (U256::from(num) << FRAC_BITS) / U256::from(den);
    if quotient.bits() > 63 + FRAC_BITS as usize {
        return Err(MathError::Overflow);
    }
    Ok(quotient.low_u128())
}

fn apply_sign(mag: u128, negative: bool) -> Result<Fixed, MathError> {
    const MIN_MAG: u128 = 1u128 << 127;
    match (negative, mag) {
        (false, m) if m < MIN_MAG => Ok(Fixed(m as i128)),
        (true, m) if m < MIN_MAG => Ok(Fixed(-(m as i128))),
        (true, m) if m == MIN_MAG => Ok(Fixed(i128::MIN)),
        _ => Err(MathError::Overflow),
    }
}
