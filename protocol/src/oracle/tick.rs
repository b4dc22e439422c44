//! Tick-cumulative price source.
//!
//! Prices are published as integer ticks, where tick `t` means a rate of
//! `1.0001^t`. Each observation stores the running sum of `tick × seconds`
//! up to its timestamp, so the mean tick over any window inside the
//! retained history is one subtraction and one division away:
//!
//! ```text
//! mean_tick = floor((cum(now) - cum(now - w)) / w)
//! rate      = 1.0001 ^ mean_tick
//! ```
//!
//! The division rounds toward negative infinity: a window averaging −0.5
//! yields tick −1, never 0.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{Clock, OracleError, PriceSource};
use crate::config::{MAX_TICK, TICK_BASE_DEN, TICK_BASE_NUM};
use crate::math::exp::powi;
use crate::math::Fixed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    timestamp: u64,
    /// Σ tick·Δt over all time before `timestamp`.
    tick_cumulative: i128,
    /// Tick in effect from `timestamp` until the next observation.
    tick: i32,
}

impl Observation {
    /// Cumulative value extrapolated to `at`, which must not precede
    /// `self.timestamp`.
    fn cumulative_at(&self, at: u64) -> i128 {
        let elapsed = (at - self.timestamp) as i128;
        self.tick_cumulative + self.tick as i128 * elapsed
    }
}

/// A bounded history of tick observations, answering time-weighted rate
/// queries for any window the history still covers.
///
/// While the latest observation sits less than `min_spacing` seconds after
/// the one before it, a new tick moves it forward instead of appending, with
/// its cumulative carried exactly. Every retained timestamp keeps an exact
/// cumulative. Between two observations the cumulative is interpolated
/// linearly, which is exact unless the pair absorbed a merge.
pub struct TickOracle {
    clock: Arc<dyn Clock>,
    capacity: usize,
    min_spacing: u64,
    observations: RwLock<VecDeque<Observation>>,
}

impl TickOracle {
    /// An oracle that keeps every distinct timestamp until `capacity` is
    /// reached, then evicts the oldest.
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self::with_spacing(clock, capacity, 1)
    }

    /// An oracle whose history always reaches back `window_secs` once that
    /// much time has been observed, however often ticks arrive.
    ///
    /// All but the latest observation are kept at least
    /// `ceil(window / (capacity - 2))` seconds apart, so a full history
    /// spans the window before its newest gap.
    pub fn for_window(clock: Arc<dyn Clock>, capacity: usize, window_secs: u32) -> Self {
        let capacity = capacity.max(3);
        let gaps = (capacity - 2) as u64;
        let spacing = (window_secs as u64).div_ceil(gaps).max(1);
        Self::with_spacing(clock, capacity, spacing)
    }

    fn with_spacing(clock: Arc<dyn Clock>, capacity: usize, min_spacing: u64) -> Self {
        let capacity = capacity.max(2);
        Self {
            clock,
            capacity,
            min_spacing,
            observations: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Minimum distance in seconds between anchored observations.
    pub fn min_spacing(&self) -> u64 {
        self.min_spacing
    }

    /// Records `tick` as the current price at the clock's time.
    pub fn record(&self, tick: i32) -> Result<(), OracleError> {
        self.record_at(self.clock.now_secs(), tick)
    }

    /// Records `tick` as the price in effect from `timestamp` onwards.
    ///
    /// A second observation at the same timestamp replaces the tick without
    /// accruing any time. Timestamps older than the newest observation are
    /// rejected.
    pub fn record_at(&self, timestamp: u64, tick: i32) -> Result<(), OracleError> {
        if tick.unsigned_abs() > MAX_TICK as u32 {
            return Err(OracleError::InvalidObservation(format!(
                "tick {tick} outside ±{MAX_TICK}"
            )));
        }

        let mut obs = self.observations.write();
        let next = match obs.back() {
            None => Observation {
                timestamp,
                tick_cumulative: 0,
                tick,
            },
            Some(last) if timestamp < last.timestamp => {
                return Err(OracleError::InvalidObservation(format!(
                    "timestamp {timestamp} precedes latest {}",
                    last.timestamp
                )));
            }
            Some(last) if timestamp == last.timestamp => {
                if let Some(last) = obs.back_mut() {
                    last.tick = tick;
                }
                trace!(timestamp, tick, "tick replaced");
                return Ok(());
            }
            Some(last) => Observation {
                timestamp,
                tick_cumulative: last.cumulative_at(timestamp),
                tick,
            },
        };

        let len = obs.len();
        if len >= 2 && obs[len - 1].timestamp - obs[len - 2].timestamp < self.min_spacing {
            if let Some(last) = obs.back_mut() {
                *last = next;
            }
            trace!(timestamp, tick, "tick merged into latest observation");
            return Ok(());
        }

        if len == self.capacity {
            obs.pop_front();
        }
        obs.push_back(next);
        trace!(timestamp, tick, "tick recorded");
        Ok(())
    }

    /// Number of retained observations.
    pub fn len(&self) -> usize {
        self.observations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.read().is_empty()
    }

    /// Latest published tick, if any.
    pub fn latest_tick(&self) -> Option<i32> {
        self.observations.read().back().map(|o| o.tick)
    }

    /// Arithmetic-mean tick over `[now - window, now]`, floored.
    pub fn mean_tick(&self, window_secs: u32) -> Result<i32, OracleError> {
        if window_secs == 0 {
            return Err(OracleError::Unavailable("zero-length window".into()));
        }
        let now = self.clock.now_secs();
        let then = now.checked_sub(window_secs as u64).ok_or_else(|| {
            OracleError::Unavailable(format!("window {window_secs}s reaches before epoch"))
        })?;

        let obs = self.observations.read();
        let cum_now = cumulative_at(&obs, now)?;
        let cum_then = cumulative_at(&obs, then)?;

        let mean = (cum_now - cum_then).div_euclid(window_secs as i128);
        debug!(window_secs, mean, "mean tick");
        i32::try_from(mean)
            .ok()
            .filter(|t| t.unsigned_abs() <= MAX_TICK as u32)
            .ok_or_else(|| OracleError::Unavailable(format!("mean tick {mean} out of range")))
    }
}

/// Interpolated cumulative at `at`, or `Unavailable` if the history does
/// not reach back that far.
fn cumulative_at(obs: &VecDeque<Observation>, at: u64) -> Result<i128, OracleError> {
    let first = obs
        .front()
        .ok_or_else(|| OracleError::Unavailable("no observations".into()))?;
    if at < first.timestamp {
        return Err(OracleError::Unavailable(format!(
            "history starts at {}, window needs {at}",
            first.timestamp
        )));
    }
    // Last observation at or before `at`.
    let idx = obs.partition_point(|o| o.timestamp <= at) - 1;
    let before = &obs[idx];
    match obs.get(idx + 1) {
        Some(after) if at > before.timestamp => {
            let span = (after.timestamp - before.timestamp) as i128;
            let elapsed = (at - before.timestamp) as i128;
            let rise = after.tick_cumulative - before.tick_cumulative;
            Ok(before.tick_cumulative + (rise * elapsed).div_euclid(span))
        }
        _ => Ok(before.cumulative_at(at)),
    }
}

impl PriceSource for TickOracle {
    fn time_weighted_rate(&self, window_secs: u32) -> Result<Fixed, OracleError> {
        let tick = self.mean_tick(window_secs)?;
        let base = Fixed::from_ratio(TICK_BASE_NUM, TICK_BASE_DEN)?;
        match powi(base, tick as i64) {
            Ok(rate) if rate > Fixed::ZERO => Ok(rate),
            _ => Err(OracleError::Unavailable(format!(
                "tick {tick} has no representable rate"
            ))),
        }
    }
}
