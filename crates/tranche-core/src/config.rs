//! Static pool parameters fixed at engine creation.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_INTERVAL_LENGTH, DEFAULT_MINIMUM_UNITS_PER_INTERVAL};
use crate::error::ConfigError;
use crate::interval::IntervalClock;
use crate::types::Timestamp;
use crate::weights::WeightCurve;

/// Curve and clock parameters of a reward pool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Start of interval 0 (Unix seconds).
    pub epoch_start: Timestamp,
    /// Interval length in seconds.
    #[serde(default = "default_interval_length")]
    pub interval_length: u64,
    /// Percentage of the unallocated pool each interval may allocate.
    pub weights: Vec<u64>,
    /// Below this many units, an interval's allocation is prorated.
    #[serde(default = "default_minimum_units")]
    pub minimum_units_per_interval: u64,
}

fn default_interval_length() -> u64 {
    DEFAULT_INTERVAL_LENGTH
}

fn default_minimum_units() -> u64 {
    DEFAULT_MINIMUM_UNITS_PER_INTERVAL
}

/// Validated form of [`PoolConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolParams {
    pub clock: IntervalClock,
    pub curve: WeightCurve,
    pub minimum_units_per_interval: u64,
}

impl PoolConfig {
    /// Check every parameter and build the clock and curve.
    pub fn validate(&self) -> Result<PoolParams, ConfigError> {
        let clock = IntervalClock::new(self.epoch_start, self.interval_length)?;
        let curve = WeightCurve::new(self.weights.clone())?;
        if self.minimum_units_per_interval == 0 {
            return Err(ConfigError::ZeroMinimumUnits);
        }
        Ok(PoolParams {
            clock,
            curve,
            minimum_units_per_interval: self.minimum_units_per_interval,
        })
    }
}
