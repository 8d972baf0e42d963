//! Weight curve: the percentage of the unallocated pool each interval may
//! claim.
//!
//! Intervals past the configured table repeat the last entry.

use serde::{Deserialize, Serialize};

use crate::constants::WEIGHT_PRECISION;
use crate::error::ConfigError;
use crate::types::IntervalIndex;

/// Per-interval weights, each in `0..=100`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct WeightCurve {
    weights: Vec<u64>,
}

impl WeightCurve {
    /// Build a curve, rejecting an empty table or any weight above 100.
    ///
    /// # Examples
    ///
    /// ```
    /// use tranche_core::weights::WeightCurve;
    ///
    /// let curve = WeightCurve::new(vec![20, 50, 25, 50]).unwrap();
    /// assert_eq!(curve.weight(1), 50);
    /// assert_eq!(curve.weight(100), 50);
    /// assert_eq!(curve.interval_count(), 4);
    /// ```
    pub fn new(weights: Vec<u64>) -> Result<Self, ConfigError> {
        if weights.is_empty() {
            return Err(ConfigError::EmptyWeights);
        }
        if let Some((index, &weight)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| **w > WEIGHT_PRECISION)
        {
            return Err(ConfigError::WeightOutOfRange { index, weight });
        }
        Ok(Self { weights })
    }

    /// Weight of interval `i`; the last entry repeats forever.
    pub fn weight(&self, interval: IntervalIndex) -> u64 {
        let last = self.weights.len() - 1;
        let idx = usize::try_from(interval).map_or(last, |i| i.min(last));
        self.weights[idx]
    }

    /// Number of explicitly configured entries.
    pub fn interval_count(&self) -> u64 {
        self.weights.len() as u64
    }

    /// The configured table.
    pub fn as_slice(&self) -> &[u64] {
        &self.weights
    }
}

impl TryFrom<Vec<u64>> for WeightCurve {
    type Error = ConfigError;

    fn try_from(weights: Vec<u64>) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl From<WeightCurve> for Vec<u64> {
    fn from(curve: WeightCurve) -> Self {
        curve.weights
    }
}
