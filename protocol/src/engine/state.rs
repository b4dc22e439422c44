//! The engine's mutable state, guarded as one unit.

use serde::{Deserialize, Serialize};

use super::ledger::PendingLedger;
use super::limiter::RateLimiter;
use crate::config::CurveConfig;
use crate::math::Fixed;

/// Everything a bond, withdrawal, or initialization touches.
///
/// `total_issued` counts every asset unit the engine has committed to,
/// whether still pending, mid-mint, or already on the registry:
///
/// ```text
/// total_issued == registry supply + Σ pending + in_flight
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveState {
    /// Normalized supply `x` on the issuance curve.
    pub curve_supply: Fixed,
    /// Asset micro-units committed to (see type docs).
    pub total_issued: u128,
    /// Native currency received, smallest denomination.
    pub collateral_received: u128,
    pub limiter: RateLimiter,
    pub promo_pool_remaining: u128,
    pub initialized: bool,
    /// Amount handed to the registry whose mint has not returned yet.
    pub in_flight: u128,
    pub ledger: PendingLedger,
    pub bonds: u64,
    /// Set while `initialize_reserve` is waiting on the registry. Never
    /// persisted: a restart mid-initialization leaves it retryable.
    #[serde(skip)]
    pub initializing: bool,
}

impl CurveState {
    pub fn new(config: &CurveConfig) -> Self {
        Self {
            curve_supply: Fixed::ZERO,
            total_issued: 0,
            collateral_received: 0,
            limiter: RateLimiter::new(config.rate_limit_threshold_local),
            promo_pool_remaining: config.promo_pool,
            initialized: false,
            in_flight: 0,
            ledger: PendingLedger::new(),
            bonds: 0,
            initializing: false,
        }
    }
}
