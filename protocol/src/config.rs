//! # Protocol Configuration & Constants
//!
//! Every unit convention in Bondline lives here. The engine converts between
//! native value, local currency, and normalized curve supply in exactly one
//! place, and this module defines the scales it converts with. There is no
//! other scaling step anywhere in the workspace.
//!
//! ```text
//! native value   ── × rate × local_multiplier ──►  local micro-units (6 dp)
//! local micro    ── ÷ NORMALIZED_SCALE       ──►  Δ (normalized, Fixed)
//! W(s0+Δ)-W(s0)  ── × 10^ASSET_DECIMALS      ──►  asset micro-units
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::types::Address;
use crate::math::Fixed;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Decimal places of the native currency paid into the curve.
pub const NATIVE_DECIMALS: u32 = 18;

/// Decimal places of the local settlement currency.
pub const LOCAL_DECIMALS: u32 = 6;

/// Decimal places of the issued asset.
pub const ASSET_DECIMALS: u32 = 6;

/// Micro-units per normalized curve unit.
pub const NORMALIZED_SCALE: u128 = 1_000_000;

/// Basis-point denominator. 1 bp = 0.01%.
pub const BPS_DENOMINATOR: u128 = 10_000;

// ---------------------------------------------------------------------------
// Curve
// ---------------------------------------------------------------------------

/// Currency-scale constant `C` as a ratio: 2.7.
pub const DEFAULT_CURVE_C_NUM: u128 = 27;
pub const DEFAULT_CURVE_C_DEN: u128 = 10;

/// Decay constant `D` of the early-stage subsidy term.
pub const DEFAULT_CURVE_D: u128 = 200_000;

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Lookback of the time-weighted average: one hour.
pub const DEFAULT_TWAP_WINDOW_SECS: u32 = 3_600;

/// Tick base of the reference source: each tick is a 1 bp price move.
pub const TICK_BASE_NUM: u128 = 10_001;
pub const TICK_BASE_DEN: u128 = 10_000;

/// Largest tick magnitude the reference source accepts.
pub const MAX_TICK: i32 = 887_272;

/// Observations retained by the tick oracle.
pub const DEFAULT_OBSERVATION_CAPACITY: usize = 1_024;

// ---------------------------------------------------------------------------
// Limits & Promotions
// ---------------------------------------------------------------------------

/// Default rate-limit ceiling: 1,000,000 local currency units.
pub const DEFAULT_RATE_LIMIT_LOCAL: u128 = 1_000_000 * 1_000_000;

/// Default promotional bonus: 5% of every minted amount.
pub const DEFAULT_PROMO_BONUS_BPS: u32 = 500;

/// Default promotional allocation: 10,000,000 asset units.
pub const DEFAULT_PROMO_POOL: u128 = 10_000_000 * 1_000_000;

/// Default one-time reserve minted to the treasury: 1,000,000 units.
pub const DEFAULT_INITIAL_RESERVE: u128 = 1_000_000 * 1_000_000;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Errors raised by [`CurveConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("curve constant C must be positive")]
    NonPositiveScale,

    #[error("decay constant D must be at least 1")]
    DecayTooSmall,

    #[error("oracle window must be at least one second")]
    ZeroWindow,

    #[error("local multiplier must be positive")]
    NonPositiveMultiplier,

    #[error("promo bonus {0} bps exceeds 100%")]
    PromoBonusTooLarge(u32),

    #[error("treasury address is invalid: {0}")]
    InvalidTreasury(String),
}

/// Runtime parameters of a curve deployment. Fixed at construction; only
/// the rate-limit threshold can change afterwards, through governance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    /// `C` numerator and denominator.
    pub curve_c_num: u128,
    pub curve_c_den: u128,
    /// `D`, in normalized units.
    pub curve_d: u128,
    /// Oracle lookback window in seconds.
    pub twap_window_secs: u32,
    /// Fixed multiplier from the reference currency into local currency,
    /// as a ratio.
    pub local_multiplier_num: u128,
    pub local_multiplier_den: u128,
    /// Initial rate-limit ceiling in local micro-units.
    pub rate_limit_threshold_local: u128,
    /// Promotional bonus on each purchase, in basis points of the minted
    /// amount.
    pub promo_bonus_bps: u32,
    /// Total promotional allocation in asset micro-units.
    pub promo_pool: u128,
    /// Amount minted once by `initialize_reserve`.
    pub initial_reserve: u128,
    /// Recipient of the one-time reserve.
    pub treasury: Address,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            curve_c_num: DEFAULT_CURVE_C_NUM,
            curve_c_den: DEFAULT_CURVE_C_DEN,
            curve_d: DEFAULT_CURVE_D,
            twap_window_secs: DEFAULT_TWAP_WINDOW_SECS,
            local_multiplier_num: 1,
            local_multiplier_den: 1,
            rate_limit_threshold_local: DEFAULT_RATE_LIMIT_LOCAL,
            promo_bonus_bps: DEFAULT_PROMO_BONUS_BPS,
            promo_pool: DEFAULT_PROMO_POOL,
            initial_reserve: DEFAULT_INITIAL_RESERVE,
            treasury: Address::new("0x00000000000000000000000000000000000ba5e5"),
        }
    }
}

impl CurveConfig {
    /// Checks every field for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.curve_c_num == 0 || self.curve_c_den == 0 {
            return Err(ConfigError::NonPositiveScale);
        }
        if self.curve_d == 0 {
            return Err(ConfigError::DecayTooSmall);
        }
        if self.twap_window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.local_multiplier_num == 0 || self.local_multiplier_den == 0 {
            return Err(ConfigError::NonPositiveMultiplier);
        }
        if self.promo_bonus_bps as u128 > BPS_DENOMINATOR {
            return Err(ConfigError::PromoBonusTooLarge(self.promo_bonus_bps));
        }
        if !self.treasury.is_valid() {
            return Err(ConfigError::InvalidTreasury(self.treasury.to_string()));
        }
        Ok(())
    }

    /// `C` as a fixed-point value.
    pub fn curve_c(&self) -> Result<Fixed, ConfigError> {
        Fixed::from_ratio(self.curve_c_num, self.curve_c_den)
            .map_err(|_| ConfigError::NonPositiveScale)
    }

    /// `D` as a fixed-point value.
    pub fn curve_d(&self) -> Result<Fixed, ConfigError> {
        Fixed::from_ratio(self.curve_d, 1).map_err(|_| ConfigError::DecayTooSmall)
    }

    /// Local multiplier as a fixed-point value.
    pub fn local_multiplier(&self) -> Result<Fixed, ConfigError> {
        Fixed::from_ratio(self.local_multiplier_num, self.local_multiplier_den)
            .map_err(|_| ConfigError::NonPositiveMultiplier)
    }
}

/// One whole native unit in its smallest denomination.
pub const fn native_unit() -> u128 {
    10u128.pow(NATIVE_DECIMALS)
}
