//! Engine constants.

/// Denominator of interval weights: a weight of `100` allocates the whole
/// unallocated pool.
pub const WEIGHT_PRECISION: u64 = 100;

/// Length of an [`Address`](crate::types::Address) in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Default interval length used by the simulator when a scenario omits it
/// (one day, in seconds).
pub const DEFAULT_INTERVAL_LENGTH: u64 = 86_400;

/// Default minimum number of work units per interval before proration.
pub const DEFAULT_MINIMUM_UNITS_PER_INTERVAL: u64 = 1;
