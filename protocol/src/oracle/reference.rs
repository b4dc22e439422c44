//! Window + multiplier adapter between a [`PriceSource`] and the engine.

use std::sync::Arc;
use tracing::debug;

use super::{OracleError, PriceSource};
use crate::config::{ConfigError, CurveConfig, LOCAL_DECIMALS, NATIVE_DECIMALS};
use crate::engine::types::NativeAmount;
use crate::math::{Fixed, MathError};

/// Reads a time-weighted rate over a fixed window and converts it into the
/// local settlement currency.
#[derive(Clone)]
pub struct PriceReference {
    source: Arc<dyn PriceSource>,
    window_secs: u32,
    local_multiplier: Fixed,
}

impl std::fmt::Debug for PriceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceReference")
            .field("window_secs", &self.window_secs)
            .field("local_multiplier", &self.local_multiplier)
            .finish_non_exhaustive()
    }
}

impl PriceReference {
    pub fn new(
        source: Arc<dyn PriceSource>,
        window_secs: u32,
        local_multiplier: Fixed,
    ) -> Result<Self, ConfigError> {
        if window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if local_multiplier <= Fixed::ZERO {
            return Err(ConfigError::NonPositiveMultiplier);
        }
        Ok(Self {
            source,
            window_secs,
            local_multiplier,
        })
    }

    pub fn from_config(
        source: Arc<dyn PriceSource>,
        config: &CurveConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(source, config.twap_window_secs, config.local_multiplier()?)
    }

    pub fn window_secs(&self) -> u32 {
        self.window_secs
    }

    /// Local currency per whole native unit.
    pub fn local_rate(&self) -> Result<Fixed, OracleError> {
        let rate = self.source.time_weighted_rate(self.window_secs)?;
        if rate <= Fixed::ZERO {
            return Err(OracleError::Unavailable(format!(
                "non-positive rate {rate} over {}s",
                self.window_secs
            )));
        }
        let local = rate.checked_mul(self.local_multiplier)?;
        debug!(window = self.window_secs, %rate, %local, "price reference read");
        Ok(local)
    }

    /// Converts `value` into local micro-units at the current rate.
    pub fn to_local(&self, value: NativeAmount) -> Result<u128, OracleError> {
        let rate = self.local_rate()?;
        Ok(native_to_local(value, rate)?)
    }
}

/// `floor(value / 10^NATIVE_DECIMALS · rate · 10^LOCAL_DECIMALS)`.
///
/// Rounds toward negative infinity so purchasing power is never overstated.
pub fn native_to_local(value: NativeAmount, local_per_native: Fixed) -> Result<u128, MathError> {
    let whole = Fixed::from_scaled(value.get(), NATIVE_DECIMALS)?;
    whole
        .checked_mul(local_per_native)?
        .to_scaled_floor(LOCAL_DECIMALS)
}
