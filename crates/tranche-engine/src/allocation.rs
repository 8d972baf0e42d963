//! Allocation ledger: settles intervals in order and fixes their reward
//! figures forever.
//!
//! For interval `i` with `n` units and unallocated pool `U`:
//!
//! ```text
//! base     = floor(U * weight(i) / 100)
//! adjusted = n < minimum ? floor(base * n / minimum) : base
//! per_unit = n > 0 ? floor(adjusted / n) : 0
//! U       -= adjusted
//! ```
//!
//! Proration savings (`base - adjusted`) stay in the pool and roll forward.
//! Allocated intervals always form a contiguous prefix `0..len`, so the
//! ledger is a plain vector indexed by interval.
//!
//! Settlement is split into [`AllocationLedger::plan`], which is pure, and
//! [`AllocationLedger::commit`], so callers can validate a whole command
//! before mutating anything.

use serde::Serialize;

use tranche_core::config::PoolParams;
use tranche_core::constants::WEIGHT_PRECISION;
use tranche_core::error::PreconditionError;
use tranche_core::math::{div_floor_or_zero, mul_div_floor};
use tranche_core::traits::WorkUnitRegistry;
use tranche_core::types::{Amount, IntervalIndex, Timestamp};

use crate::index::WorkUnitIndex;

/// The fixed outcome of allocating one interval.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntervalRecord {
    pub index: IntervalIndex,
    /// Units created during the interval.
    pub unit_count: u64,
    /// Registry position one past the interval's last unit.
    pub endpoint: u64,
    /// Nominal share before proration.
    pub base_amount: Amount,
    /// Amount removed from the pool for this interval.
    pub allocated_amount: Amount,
    /// Amount each unit of the interval may claim.
    pub reward_per_unit: Amount,
}

/// `(base, adjusted, per_unit)` for one interval.
///
/// # Examples
///
/// ```
/// use tranche_engine::allocation::compute_allocation;
///
/// // 1 unit against a minimum of 2 halves the allocation.
/// assert_eq!(compute_allocation(200_000, 50, 1, 2), (100_000, 50_000, 50_000));
/// // No units: nothing leaves the pool.
/// assert_eq!(compute_allocation(200_000, 50, 0, 2), (100_000, 0, 0));
/// ```
pub fn compute_allocation(
    unallocated: Amount,
    weight: u64,
    unit_count: u64,
    minimum_units: u64,
) -> (Amount, Amount, Amount) {
    let base = mul_div_floor(unallocated, weight, WEIGHT_PRECISION);
    let adjusted = if unit_count < minimum_units {
        mul_div_floor(base, unit_count, minimum_units)
    } else {
        base
    };
    let per_unit = div_floor_or_zero(adjusted, unit_count);
    (base, adjusted, per_unit)
}

/// Intervals allocated by a [`plan`](AllocationLedger::plan) call, not yet
/// committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    records: Vec<IntervalRecord>,
    unallocated_after: Amount,
}

impl Settlement {
    /// A settlement that allocates nothing.
    pub fn empty(unallocated: Amount) -> Self {
        Self {
            records: Vec::new(),
            unallocated_after: unallocated,
        }
    }

    /// Newly allocated intervals, oldest first.
    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    /// The unallocated pool once this settlement is committed.
    pub fn unallocated_after(&self) -> Amount {
        self.unallocated_after
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total removed from the pool by this settlement.
    pub fn total_allocated(&self) -> Amount {
        self.records.iter().map(|r| r.allocated_amount).sum()
    }
}

/// Allocated intervals, indexed by interval number.
#[derive(Clone, Debug, Default)]
pub struct AllocationLedger {
    records: Vec<IntervalRecord>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated intervals; also the first unallocated index.
    pub fn allocated_count(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn is_allocated(&self, interval: IntervalIndex) -> bool {
        interval < self.allocated_count()
    }

    /// The record of an allocated interval.
    pub fn get(&self, interval: IntervalIndex) -> Option<&IntervalRecord> {
        usize::try_from(interval)
            .ok()
            .and_then(|i| self.records.get(i))
    }

    /// The record of `interval` from this ledger or, failing that, from a
    /// pending settlement.
    pub fn lookup<'a>(
        &'a self,
        pending: &'a Settlement,
        interval: IntervalIndex,
    ) -> Option<&'a IntervalRecord> {
        self.get(interval).or_else(|| {
            let offset = interval.checked_sub(self.allocated_count())?;
            pending.records.get(usize::try_from(offset).ok()?)
        })
    }

    /// All allocated records, oldest first.
    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    /// Sum of every allocated amount.
    pub fn total_allocated(&self) -> Amount {
        self.records.iter().map(|r| r.allocated_amount).sum()
    }

    /// Compute the allocation of every interval up to and including `target`
    /// that is not yet allocated, starting from `unallocated`.
    ///
    /// Iterates `target - allocated_count + 1` times; an already-allocated
    /// target yields an empty settlement. Fails with
    /// [`PreconditionError::IntervalNotEnded`] if `target` has not ended, in
    /// which case nothing is planned.
    pub fn plan<R: WorkUnitRegistry>(
        &self,
        target: IntervalIndex,
        registry: &R,
        index: &WorkUnitIndex,
        params: &PoolParams,
        unallocated: Amount,
        now: Timestamp,
    ) -> Result<Settlement, PreconditionError> {
        if self.is_allocated(target) {
            return Ok(Settlement::empty(unallocated));
        }
        params.clock.require_ended(target, now)?;

        let mut pool = unallocated;
        let mut previous_endpoint = self.records.last().map_or(0, |r| r.endpoint);
        let mut records = Vec::new();

        for interval in self.allocated_count()..=target {
            let endpoint = index.endpoint(registry, &params.clock, interval, now)?;
            let unit_count = endpoint.saturating_sub(previous_endpoint);
            let (base, adjusted, per_unit) = compute_allocation(
                pool,
                params.curve.weight(interval),
                unit_count,
                params.minimum_units_per_interval,
            );
            pool -= adjusted;
            previous_endpoint = endpoint;
            records.push(IntervalRecord {
                index: interval,
                unit_count,
                endpoint,
                base_amount: base,
                allocated_amount: adjusted,
                reward_per_unit: per_unit,
            });
        }

        Ok(Settlement {
            records,
            unallocated_after: pool,
        })
    }

    /// Append a planned settlement and memoize its endpoints.
    ///
    /// The settlement must have been planned against this ledger's current
    /// state.
    pub fn commit(&mut self, settlement: &Settlement, index: &mut WorkUnitIndex) {
        debug_assert!(
            settlement
                .records
                .first()
                .is_none_or(|r| r.index == self.allocated_count()),
            "settlement planned against a stale ledger"
        );
        for record in &settlement.records {
            index.record(record.index, record.endpoint);
            self.records.push(*record);
        }
    }
}
