//! Interval clock: timestamp ⇄ interval-index conversion.
//!
//! Interval `i` spans `[start_of(i), end_of(i))`, and
//! `end_of(i) == start_of(i + 1)`. Timestamps before the epoch start map to
//! interval 0.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PreconditionError};
use crate::types::{IntervalIndex, Timestamp};

/// Fixed-length time buckets counted from `epoch_start`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntervalClock {
    epoch_start: Timestamp,
    length: u64,
}

impl IntervalClock {
    /// Create a clock. `length` must be positive.
    pub fn new(epoch_start: Timestamp, length: u64) -> Result<Self, ConfigError> {
        if length == 0 {
            return Err(ConfigError::ZeroIntervalLength);
        }
        if epoch_start.checked_add(length).is_none() {
            return Err(ConfigError::EpochStartTooLarge(epoch_start));
        }
        Ok(Self {
            epoch_start,
            length,
        })
    }

    /// Start of interval 0.
    pub fn epoch_start(&self) -> Timestamp {
        self.epoch_start
    }

    /// Length of each interval in seconds.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Which interval a timestamp falls in.
    ///
    /// # Examples
    ///
    /// ```
    /// use tranche_core::interval::IntervalClock;
    ///
    /// let clock = IntervalClock::new(1000, 100).unwrap();
    /// assert_eq!(clock.interval_of(999), 0);
    /// assert_eq!(clock.interval_of(1099), 0);
    /// assert_eq!(clock.interval_of(1100), 1);
    /// ```
    pub fn interval_of(&self, timestamp: Timestamp) -> IntervalIndex {
        timestamp.saturating_sub(self.epoch_start) / self.length
    }

    /// First timestamp of interval `i`. Saturates at `Timestamp::MAX`.
    pub fn start_of(&self, interval: IntervalIndex) -> Timestamp {
        self.epoch_start
            .saturating_add(interval.saturating_mul(self.length))
    }

    /// First timestamp after interval `i`, i.e. `start_of(i + 1)`.
    pub fn end_of(&self, interval: IntervalIndex) -> Timestamp {
        self.start_of(interval.saturating_add(1))
    }

    /// The interval containing `now`.
    pub fn current_interval(&self, now: Timestamp) -> IntervalIndex {
        self.interval_of(now)
    }

    /// Whether interval `i` is over at `now`.
    pub fn has_ended(&self, interval: IntervalIndex, now: Timestamp) -> bool {
        now >= self.end_of(interval)
    }

    /// Fail with [`PreconditionError::IntervalNotEnded`] unless interval `i`
    /// is over at `now`.
    pub fn require_ended(
        &self,
        interval: IntervalIndex,
        now: Timestamp,
    ) -> Result<(), PreconditionError> {
        if self.has_ended(interval, now) {
            Ok(())
        } else {
            Err(PreconditionError::IntervalNotEnded {
                interval,
                ends_at: self.end_of(interval),
                now,
            })
        }
    }

    /// Number of intervals fully over at `now`.
    pub fn ended_intervals(&self, now: Timestamp) -> u64 {
        if now < self.epoch_start {
            0
        } else {
            self.interval_of(now)
        }
    }
}
