//! Cumulative intake ceiling, measured in local currency.

use serde::{Deserialize, Serialize};

use super::error::BondError;

/// Tracks total collateral received (in local micro-units) against a
/// governance-set ceiling. The ceiling is inclusive: intake may reach it
/// exactly but never pass it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiter {
    threshold_local: u128,
    received_local: u128,
}

impl RateLimiter {
    pub fn new(threshold_local: u128) -> Self {
        Self {
            threshold_local,
            received_local: 0,
        }
    }

    pub fn threshold(&self) -> u128 {
        self.threshold_local
    }

    pub fn received(&self) -> u128 {
        self.received_local
    }

    /// Headroom left under the ceiling. Zero if the ceiling has been
    /// lowered below what was already received.
    pub fn remaining(&self) -> u128 {
        self.threshold_local.saturating_sub(self.received_local)
    }

    /// Returns the intake total after accepting `value_local`, without
    /// recording it.
    pub fn check(&self, value_local: u128) -> Result<u128, BondError> {
        let total = self
            .received_local
            .checked_add(value_local)
            .ok_or(BondError::ArithmeticOverflow)?;
        if total > self.threshold_local {
            return Err(BondError::RateLimitExceeded {
                attempted: value_local,
                available: self.remaining(),
            });
        }
        Ok(total)
    }

    /// Records a total previously returned by [`check`](Self::check).
    pub fn commit(&mut self, total: u128) {
        self.received_local = total;
    }

    /// Replaces the ceiling. Received intake is untouched.
    pub fn set_threshold(&mut self, threshold_local: u128) {
        self.threshold_local = threshold_local;
    }
}
