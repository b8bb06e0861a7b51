//! Fixed-window consumption counter.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Fixed-point units per whole request or cent. Costs are kept to at most
/// six decimal places, so accounting in integer units is exact.
pub const UNIT_SCALE: u64 = 1_000_000;

/// Convert a cost to fixed-point units. Negative and NaN costs are zero.
pub fn to_units(cost: f64) -> u64 {
    if cost.is_nan() || cost <= 0.0 {
        return 0;
    }
    // Float-to-int casts saturate.
    (cost * UNIT_SCALE as f64).round() as u64
}

pub fn from_units(units: u64) -> f64 {
    units as f64 / UNIT_SCALE as f64
}

/// Consumption recorded for one limit key within the current window.
///
/// Windows are fixed: once `now` reaches `window_start + window_seconds` the
/// next access starts a fresh window at `now` with nothing consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    window_start: DateTime<Utc>,
    consumed: u64,
    window_seconds: u64,
}

impl WindowState {
    /// Open a new, empty window at `now`.
    pub fn new(now: DateTime<Utc>, window_seconds: u64) -> Self {
        Self {
            window_start: now,
            consumed: 0,
            window_seconds,
        }
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.window_seconds).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs)
            .and_then(|delta| self.window_start.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Amount charged against this window so far.
    pub fn consumed(&self) -> f64 {
        from_units(self.consumed)
    }

    pub fn consumed_units(&self) -> u64 {
        self.consumed
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_end()
    }

    /// Start a fresh window if the current one has ended, or if the window
    /// length changed. Returns `true` when a reset happened.
    pub fn roll(&mut self, now: DateTime<Utc>, window_seconds: u64) -> bool {
        if self.window_seconds != window_seconds || self.is_expired(now) {
            *self = Self::new(now, window_seconds);
            return true;
        }
        false
    }

    /// Budget left under `quota`, in fixed-point units. Zero once the quota
    /// is spent.
    pub fn remaining_units(&self, quota: u64) -> u64 {
        quota
            .saturating_mul(UNIT_SCALE)
            .saturating_sub(self.consumed)
    }

    pub fn remaining(&self, quota: u64) -> f64 {
        from_units(self.remaining_units(quota))
    }

    pub fn record(&mut self, cost: f64) {
        self.record_units(to_units(cost));
    }

    pub fn record_units(&mut self, units: u64) {
        self.consumed = self.consumed.saturating_add(units);
    }

    /// Time until this window ends, zero once it has.
    pub fn duration_until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.window_end() - now).to_std().unwrap_or(Duration::ZERO)
    }
}
