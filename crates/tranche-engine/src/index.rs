//! Work-unit index: maps creation order into interval buckets.
//!
//! The registry lists units by non-decreasing creation time, so the units of
//! interval `i` are exactly the positions `[endpoint(i - 1), endpoint(i))`,
//! where `endpoint(i)` is the number of units created before `end_of(i)`.
//! Endpoints are found by binary search and memoized once the interval has
//! ended, after which no new unit can fall inside it.

use std::collections::BTreeMap;

use tranche_core::error::PreconditionError;
use tranche_core::interval::IntervalClock;
use tranche_core::traits::WorkUnitRegistry;
use tranche_core::types::{IntervalIndex, Timestamp, UnitId};

/// Position of the first unit created at or after `target`.
///
/// Equivalently, the number of units created strictly before `target`.
/// Fails if `target` is still in the future, since units created between
/// `now` and `target` are not known yet.
pub fn find_endpoint<R: WorkUnitRegistry>(
    registry: &R,
    target: Timestamp,
    now: Timestamp,
) -> Result<u64, PreconditionError> {
    find_endpoint_from(registry, 0, target, now)
}

/// [`find_endpoint`] restricted to positions `>= lower`.
///
/// `lower` must not exceed the true endpoint; callers pass the previous
/// interval's endpoint.
pub fn find_endpoint_from<R: WorkUnitRegistry>(
    registry: &R,
    lower: u64,
    target: Timestamp,
    now: Timestamp,
) -> Result<u64, PreconditionError> {
    if target > now {
        return Err(PreconditionError::EndpointInFuture { target, now });
    }

    let mut lo = lower.min(registry.count());
    let mut hi = registry.count();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let created = registry.created_at(UnitId(mid)).unwrap_or(Timestamp::MAX);
        if created < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// Memoized interval endpoints.
#[derive(Clone, Debug, Default)]
pub struct WorkUnitIndex {
    endpoints: BTreeMap<IntervalIndex, u64>,
}

impl WorkUnitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoized endpoint of interval `i`, if any.
    pub fn memoized(&self, interval: IntervalIndex) -> Option<u64> {
        self.endpoints.get(&interval).copied()
    }

    /// Whether interval `i`'s endpoint has been memoized.
    pub fn is_processed(&self, interval: IntervalIndex) -> bool {
        self.endpoints.contains_key(&interval)
    }

    /// Store the endpoint of an ended interval.
    pub fn record(&mut self, interval: IntervalIndex, endpoint: u64) {
        self.endpoints.insert(interval, endpoint);
    }

    /// Endpoint of interval `i`: the memo if present, else a fresh search.
    ///
    /// Requires `now >= end_of(i)`.
    pub fn endpoint<R: WorkUnitRegistry>(
        &self,
        registry: &R,
        clock: &IntervalClock,
        interval: IntervalIndex,
        now: Timestamp,
    ) -> Result<u64, PreconditionError> {
        clock.require_ended(interval, now)?;
        if let Some(memo) = self.memoized(interval) {
            return Ok(memo);
        }
        // The nearest memoized earlier endpoint bounds the search from below.
        let lower = self
            .endpoints
            .range(..interval)
            .next_back()
            .map_or(0, |(_, e)| *e);
        find_endpoint_from(registry, lower, clock.end_of(interval), now)
    }

    /// Endpoint of the interval before `i`, with `endpoint(-1) == 0`.
    pub fn previous_endpoint<R: WorkUnitRegistry>(
        &self,
        registry: &R,
        clock: &IntervalClock,
        interval: IntervalIndex,
        now: Timestamp,
    ) -> Result<u64, PreconditionError> {
        match interval.checked_sub(1) {
            Some(prev) => self.endpoint(registry, clock, prev, now),
            None => Ok(0),
        }
    }

    /// Number of units created during interval `i`.
    pub fn units_in_interval<R: WorkUnitRegistry>(
        &self,
        registry: &R,
        clock: &IntervalClock,
        interval: IntervalIndex,
        now: Timestamp,
    ) -> Result<u64, PreconditionError> {
        let end = self.endpoint(registry, clock, interval, now)?;
        let start = self.previous_endpoint(registry, clock, interval, now)?;
        Ok(end.saturating_sub(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use proptest::prelude::*;
    use tranche_core::types::Address;

    fn registry(timestamps: &[Timestamp]) -> MemoryRegistry {
        MemoryRegistry::with_units(timestamps, Address::from_label("payee")).unwrap()
    }

    /// `defaultTimestamps[i] == 1000 + i` for 16 units.
    fn default_timestamps() -> Vec<Timestamp> {
        (1000..1016).collect()
    }

    fn clock() -> IntervalClock {
        IntervalClock::new(1000, 100).unwrap()
    }

    #[test]
    fn endpoint_is_zero_without_units() {
        let r = registry(&[]);
        assert_eq!(find_endpoint(&r, 1500, 2000).unwrap(), 0);
    }

    #[test]
    fn endpoint_is_zero_when_all_units_are_later() {
        let r = registry(&default_timestamps());
        assert_eq!(find_endpoint(&r, 500, 2000).unwrap(), 0);
    }

    #[test]
    fn endpoint_is_first_index_outside() {
        let ts = default_timestamps();
        let r = registry(&ts);
        for (i, t) in ts.iter().enumerate() {
            assert_eq!(find_endpoint(&r, *t, 2000).unwrap(), i as u64);
        }
    }

    #[test]
    fn endpoint_counts_all_units_before_target() {
        let r = registry(&default_timestamps());
        assert_eq!(find_endpoint(&r, 2000, 2000).unwrap(), 16);
    }

    #[test]
    fn endpoint_with_duplicates() {
        let r = registry(&[1001, 1001, 1002, 1002]);
        assert_eq!(find_endpoint(&r, 1002, 2000).unwrap(), 2);
        assert_eq!(find_endpoint(&r, 1001, 2000).unwrap(), 0);
        assert_eq!(find_endpoint(&r, 1003, 2000).unwrap(), 4);
    }

    #[test]
    fn endpoint_in_future_fails() {
        let r = registry(&[]);
        assert_eq!(
            find_endpoint(&r, 3000, 2000),
            Err(PreconditionError::EndpointInFuture {
                target: 3000,
                now: 2000
            })
        );
    }

    #[test]
    fn interval_endpoint_includes_all_units_of_interval() {
        let ts = default_timestamps();
        let r = registry(&ts);
        let idx = WorkUnitIndex::new();
        assert_eq!(idx.endpoint(&r, &clock(), 0, 5000).unwrap(), ts.len() as u64);
    }

    #[test]
    fn interval_endpoint_zero_for_empty_interval() {
        let r = registry(&[1200, 1201]);
        let idx = WorkUnitIndex::new();
        assert_eq!(idx.endpoint(&r, &clock(), 1, 5000).unwrap(), 0);
        assert_eq!(idx.endpoint(&r, &clock(), 2, 5000).unwrap(), 2);
    }

    #[test]
    fn interval_endpoint_requires_end() {
        let r = registry(&[]);
        let idx = WorkUnitIndex::new();
        assert!(matches!(
            idx.endpoint(&r, &clock(), 3, 1350),
            Err(PreconditionError::IntervalNotEnded { interval: 3, .. })
        ));
    }

    #[test]
    fn units_per_interval() {
        let ts = [
            1000, 1001, 1099, // interval 0
            1100, 1101, 1102, 1103, // interval 1
            1234, // interval 2
            1300, 1301, // interval 3
            1500, // interval 5
            1600, 1601, // interval 6
        ];
        let r = registry(&ts);
        let idx = WorkUnitIndex::new();
        let counts: Vec<u64> = (0..8)
            .map(|i| idx.units_in_interval(&r, &clock(), i, 5000).unwrap())
            .collect();
        assert_eq!(counts, vec![3, 4, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn memo_takes_precedence() {
        let r = registry(&[1000, 1001]);
        let mut idx = WorkUnitIndex::new();
        assert!(!idx.is_processed(0));
        idx.record(0, 2);
        assert!(idx.is_processed(0));
        assert_eq!(idx.memoized(0), Some(2));
        assert_eq!(idx.units_in_interval(&r, &clock(), 1, 5000).unwrap(), 0);
    }

    fn arb_timestamps() -> impl Strategy<Value = Vec<Timestamp>> {
        prop::collection::vec(1000u64..1600, 0..40).prop_map(|mut ts| {
            ts.sort_unstable();
            ts
        })
    }

    proptest! {
        #[test]
        fn endpoint_matches_linear_scan(timestamps in arb_timestamps(), target in 900u64..1700) {
            let r = registry(&timestamps);
            let expected = timestamps.iter().filter(|&&t| t < target).count() as u64;
            prop_assert_eq!(find_endpoint(&r, target, 2000).unwrap(), expected);
        }

        #[test]
        fn bounded_search_agrees_with_full_search(
            timestamps in arb_timestamps(),
            target in 900u64..1700,
            cut in 0usize..40,
        ) {
            let r = registry(&timestamps);
            let full = find_endpoint(&r, target, 2000).unwrap();
            let lower = (cut as u64).min(full);
            prop_assert_eq!(find_endpoint_from(&r, lower, target, 2000).unwrap(), full);
        }

        #[test]
        fn interval_counts_match_linear_scan(timestamps in arb_timestamps(), interval in 0u64..7) {
            let r = registry(&timestamps);
            let c = clock();
            let expected = timestamps
                .iter()
                .filter(|&&t| c.interval_of(t) == interval)
                .count() as u64;
            let idx = WorkUnitIndex::new();
            prop_assert_eq!(idx.units_in_interval(&r, &c, interval, 5000).unwrap(), expected);
        }
    }
}
