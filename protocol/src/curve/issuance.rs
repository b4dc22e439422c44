//! Weight function evaluation.
//!
//! `minted_amount` is computed as `C · (Δ + e^(-(s0+Δ)/D) - e^(-s0/D))`
//! rather than by subtracting two full `W` evaluations. The two forms are
//! algebraically identical, but the factored one never materializes the
//! large `x` terms, so no precision is lost to cancellation at high supply.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, CurveConfig, ASSET_DECIMALS};
use crate::math::exp::exp_neg;
use crate::math::{Fixed, MathError};

/// The issuance curve with constants `C` and `D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceCurve {
    c: Fixed,
    d: Fixed,
}

impl IssuanceCurve {
    /// Builds a curve from explicit constants. `C` must be positive and
    /// `D` at least one.
    pub fn new(c: Fixed, d: Fixed) -> Result<Self, ConfigError> {
        if c <= Fixed::ZERO {
            return Err(ConfigError::NonPositiveScale);
        }
        if d < Fixed::ONE {
            return Err(ConfigError::DecayTooSmall);
        }
        Ok(Self { c, d })
    }

    pub fn from_config(config: &CurveConfig) -> Result<Self, ConfigError> {
        Self::new(config.curve_c()?, config.curve_d()?)
    }

    /// `C`, the price the curve converges to.
    pub fn asymptote(&self) -> Fixed {
        self.c
    }

    /// `D`.
    pub fn decay_constant(&self) -> Fixed {
        self.d
    }

    /// `e^(-x/D)`.
    fn decay(&self, x: Fixed) -> Result<Fixed, MathError> {
        exp_neg(x.checked_div(self.d)?)
    }

    /// `W(x)`.
    pub fn weight(&self, x: Fixed) -> Result<Fixed, MathError> {
        if x.is_negative() {
            return Err(MathError::NegativeInput);
        }
        self.c.checked_mul(x.checked_add(self.decay(x)?)?)
    }

    /// `W(s0 + Δ) - W(s0)`: asset units owed for moving the curve from `s0`
    /// to `s0 + Δ`.
    pub fn minted_amount(&self, s0: Fixed, delta: Fixed) -> Result<Fixed, MathError> {
        if s0.is_negative() || delta.is_negative() {
            return Err(MathError::NegativeInput);
        }
        if delta.is_zero() {
            return Ok(Fixed::ZERO);
        }
        let s1 = s0.checked_add(delta)?;
        let e0 = self.decay(s0)?;
        let e1 = self.decay(s1)?;
        let inner = delta.checked_add(e1)?.checked_sub(e0)?;
        if inner.is_negative() {
            // Only reachable for Δ near 2^-64, where the exp rounding
            // exceeds the true difference.
            return Ok(Fixed::ZERO);
        }
        self.c.checked_mul(inner)
    }

    /// [`minted_amount`](Self::minted_amount) floored to asset micro-units.
    pub fn minted_micro(&self, s0: Fixed, delta: Fixed) -> Result<u128, MathError> {
        self.minted_amount(s0, delta)?.to_scaled_floor(ASSET_DECIMALS)
    }

    /// `W'(s)`, the instantaneous marginal price at normalized supply `s`.
    pub fn spot_price(&self, s: Fixed) -> Result<Fixed, MathError> {
        if s.is_negative() {
            return Err(MathError::NegativeInput);
        }
        let subsidy = self.decay(s)?.checked_div(self.d)?;
        self.c.checked_mul(Fixed::ONE.checked_sub(subsidy)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> IssuanceCurve {
        IssuanceCurve::from_config(&CurveConfig::default()).unwrap()
    }

    fn units(n: i128) -> Fixed {
        Fixed::from_int(n).unwrap()
    }

    const C: f64 = 2.7;
    const D: f64 = 200_000.0;

    fn w(x: f64) -> f64 {
        C * (x + (-x / D).exp())
    }

    #[test]
    fn rejects_bad_constants() {
        assert_eq!(
            IssuanceCurve::new(Fixed::ZERO, units(1)),
            Err(ConfigError::NonPositiveScale)
        );
        assert_eq!(
            IssuanceCurve::new(units(1), Fixed::from_ratio(1, 2).unwrap()),
            Err(ConfigError::DecayTooSmall)
        );
    }

    #[test]
    fn weight_at_zero_is_c() {
        let got = curve().weight(Fixed::ZERO).unwrap();
        assert!((got.to_f64() - C).abs() < 1e-15);
    }

    #[test]
    fn first_unit_matches_closed_form() {
        let got = curve().minted_amount(Fixed::ZERO, units(1)).unwrap();
        let want = w(1.0) - w(0.0);
        assert!((got.to_f64() - want).abs() < 1e-12, "{got} vs {want}");
        assert!((got.to_f64() - 2.699_986_500_033_75).abs() < 1e-12);
    }

    #[test]
    fn zero_delta_mints_nothing() {
        assert_eq!(curve().minted_amount(units(50), Fixed::ZERO).unwrap(), Fixed::ZERO);
    }

    #[test]
    fn negative_inputs_rejected() {
        let neg = units(-1);
        assert_eq!(curve().minted_amount(neg, units(1)), Err(MathError::NegativeInput));
        assert_eq!(curve().minted_amount(units(1), neg), Err(MathError::NegativeInput));
        assert_eq!(curve().spot_price(neg), Err(MathError::NegativeInput));
    }

    #[test]
    fn larger_purchases_mint_strictly_more() {
        let c = curve();
        let mut prev = Fixed::ZERO;
        for delta in [1, 10, 100, 1_000, 100_000] {
            let minted = c.minted_amount(Fixed::ZERO, units(delta)).unwrap();
            assert!(minted > prev, "Δ={delta}");
            prev = minted;
        }
    }

    #[test]
    fn step_sequence_from_growing_supply() {
        // 1, then 10, then 100, each starting where the last one ended.
        let c = curve();
        let mut supply = Fixed::ZERO;
        let mut prev = Fixed::ZERO;
        for delta in [1, 10, 100] {
            let minted = c.minted_amount(supply, units(delta)).unwrap();
            assert!(minted > prev);
            let s = supply.to_f64();
            let want = w(s + delta as f64) - w(s);
            assert!((minted.to_f64() - want).abs() < 1e-9);
            supply = supply.checked_add(units(delta)).unwrap();
            prev = minted;
        }
    }

    #[test]
    fn minted_is_additive() {
        let c = curve();
        let s0 = units(12_345);
        let (d1, d2) = (Fixed::from_ratio(7_500_001, 1_000_000).unwrap(), units(321));
        let whole = c.minted_amount(s0, d1.checked_add(d2).unwrap()).unwrap();
        let first = c.minted_amount(s0, d1).unwrap();
        let second = c.minted_amount(s0.checked_add(d1).unwrap(), d2).unwrap();
        let split = first.checked_add(second).unwrap();
        assert!((whole.raw() - split.raw()).abs() < 1 << 12, "{whole} vs {split}");
    }

    #[test]
    fn spot_price_increases_toward_asymptote() {
        let c = curve();
        let p0 = c.spot_price(Fixed::ZERO).unwrap();
        let p1 = c.spot_price(units(100_000)).unwrap();
        let p2 = c.spot_price(units(1_000_000)).unwrap();
        assert!(p0 < p1 && p1 < p2);
        assert!(p2 < c.asymptote());
    }

    #[test]
    fn price_stabilizes_past_six_decay_lengths() {
        let c = curve();
        let s = units(6 * 200_000);
        let here = c.spot_price(s).unwrap();
        let next = c.spot_price(s.checked_add(Fixed::ONE).unwrap()).unwrap();
        assert!(next.checked_sub(here).unwrap().to_f64() < 1e-12);
        assert!((c.asymptote().to_f64() - here.to_f64()).abs() < 1e-5);

        let per_unit = c.minted_amount(s, Fixed::ONE).unwrap();
        assert!((per_unit.to_f64() - C).abs() < 1e-5);
    }

    #[test]
    fn minted_micro_floors() {
        let micro = curve().minted_micro(Fixed::ZERO, units(1)).unwrap();
        assert_eq!(micro, 2_699_986);
    }

    #[test]
    fn large_supply_stays_in_range() {
        let c = curve();
        let s0 = units(5_000_000_000);
        let minted = c.minted_amount(s0, units(1_000_000)).unwrap();
        assert!((minted.to_f64() - C * 1_000_000.0).abs() < 1e-6);
    }
}
