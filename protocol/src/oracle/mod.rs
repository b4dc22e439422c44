//! # Price Reference
//!
//! The engine never trusts a spot price. Every conversion from native value
//! into local currency goes through a [`PriceSource`] that averages over a
//! time window, and through a [`PriceReference`] that applies the fixed
//! local-currency multiplier and rejects anything that is not a usable,
//! strictly positive rate.
//!
//! ```text
//! tick.rs       tick-cumulative source with round-toward-−∞ averaging
//! reference.rs  window + multiplier adapter used by the engine
//! ```

pub mod reference;
pub mod tick;

pub use reference::{native_to_local, PriceReference};
pub use tick::TickOracle;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::math::{Fixed, MathError};

/// Errors surfaced by price sources and the reference adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// No usable rate for the requested window. Transient: the caller may
    /// retry later, but must never treat it as a zero price.
    #[error("price reference unavailable: {0}")]
    Unavailable(String),

    /// An observation was rejected (out of order, tick out of range).
    #[error("invalid observation: {0}")]
    InvalidObservation(String),

    /// Converting with the rate overflowed the fixed-point range.
    #[error("price conversion overflow: {0}")]
    Math(#[from] MathError),
}

/// A source of time-weighted exchange rates, quoted as reference currency
/// per whole native unit.
pub trait PriceSource: Send + Sync {
    fn time_weighted_rate(&self, window_secs: u32) -> Result<Fixed, OracleError>;
}

/// Wall-clock seconds, injectable so oracles can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// System time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, secs: u64) {
        self.now.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A source that returns whatever rate it was last given, regardless of
/// window. Used for offline quoting and tests; `None` models an outage.
#[derive(Debug, Default)]
pub struct StaticRateSource {
    rate: RwLock<Option<Fixed>>,
}

impl StaticRateSource {
    pub fn new(rate: Fixed) -> Self {
        Self {
            rate: RwLock::new(Some(rate)),
        }
    }

    /// A source that has never produced a rate.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set_rate(&self, rate: Fixed) {
        *self.rate.write() = Some(rate);
    }

    pub fn set_unavailable(&self) {
        *self.rate.write() = None;
    }
}

impl PriceSource for StaticRateSource {
    fn time_weighted_rate(&self, _window_secs: u32) -> Result<Fixed, OracleError> {
        (*self.rate.read()).ok_or_else(|| OracleError::Unavailable("no rate published".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_source_toggles_availability() {
        let source = StaticRateSource::new(Fixed::from_int(2_000).unwrap());
        assert_eq!(source.time_weighted_rate(3_600).unwrap().floor(), 2_000);

        source.set_unavailable();
        assert!(matches!(
            source.time_weighted_rate(3_600),
            Err(OracleError::Unavailable(_))
        ));

        source.set_rate(Fixed::ONE);
        assert_eq!(source.time_weighted_rate(1).unwrap(), Fixed::ONE);
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now_secs(), 150);
        clock.set(10);
        assert_eq!(clock.now_secs(), 10);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
