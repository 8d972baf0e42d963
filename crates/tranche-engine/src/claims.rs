//! Claim processor: eligibility checks and the claimed-unit book.
//!
//! Every unit is settled exactly once, either paid out (closed) or clawed
//! back into the pool (terminated). Checks here never mutate; the engine
//! marks units claimed only after the whole command has validated.

use std::collections::HashSet;

use serde::Serialize;

use tranche_core::error::PreconditionError;
use tranche_core::interval::IntervalClock;
use tranche_core::traits::WorkUnitRegistry;
use tranche_core::types::{Address, Amount, IntervalIndex, UnitId};

/// How a unit's share is settled.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Payout,
    ClawBack,
}

/// A validated, not yet applied claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimTicket {
    pub id: UnitId,
    pub kind: ClaimKind,
    /// Interval whose per-unit reward this unit is owed.
    pub interval: IntervalIndex,
    /// Payout destination; `None` for claw-backs.
    pub payee: Option<Address>,
}

/// The outcome of an applied claim.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settled {
    pub id: UnitId,
    pub kind: ClaimKind,
    pub interval: IntervalIndex,
    pub amount: Amount,
    pub payee: Option<Address>,
}

/// Units whose share has been settled.
#[derive(Clone, Debug, Default)]
pub struct ClaimBook {
    claimed: HashSet<UnitId>,
}

impl ClaimBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, id: UnitId) -> bool {
        self.claimed.contains(&id)
    }

    /// Mark `id` claimed. Returns `false` if it already was.
    pub fn mark(&mut self, id: UnitId) -> bool {
        self.claimed.insert(id)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

/// The interval a unit is rewarded from: the one it was created in, which is
/// where the work-unit index counts it.
fn unit_interval<R: WorkUnitRegistry>(
    registry: &R,
    clock: &IntervalClock,
    id: UnitId,
) -> Result<IntervalIndex, PreconditionError> {
    registry
        .created_at(id)
        .map(|t| clock.interval_of(t))
        .ok_or(PreconditionError::IdNotRecognized(id))
}

/// Validate a payout claim for a closed unit.
pub fn check_receivable<R: WorkUnitRegistry>(
    registry: &R,
    clock: &IntervalClock,
    book: &ClaimBook,
    id: UnitId,
) -> Result<ClaimTicket, PreconditionError> {
    if !registry.exists(id) {
        return Err(PreconditionError::IdNotRecognized(id));
    }
    if !registry.is_closed(id) || registry.is_terminated(id) {
        return Err(PreconditionError::NotClosed(id));
    }
    let interval = unit_interval(registry, clock, id)?;
    if book.is_claimed(id) {
        return Err(PreconditionError::AlreadyClaimed(id));
    }
    let payee = registry
        .payout_address_of(id)
        .ok_or(PreconditionError::IdNotRecognized(id))?;
    Ok(ClaimTicket {
        id,
        kind: ClaimKind::Payout,
        interval,
        payee: Some(payee),
    })
}

/// Validate a termination report.
pub fn check_reportable<R: WorkUnitRegistry>(
    registry: &R,
    clock: &IntervalClock,
    book: &ClaimBook,
    id: UnitId,
) -> Result<ClaimTicket, PreconditionError> {
    if !registry.exists(id) {
        return Err(PreconditionError::IdNotRecognized(id));
    }
    if !registry.is_terminated(id) {
        return Err(PreconditionError::NotTerminated(id));
    }
    let interval = unit_interval(registry, clock, id)?;
    if book.is_claimed(id) {
        return Err(PreconditionError::AlreadyClaimed(id));
    }
    Ok(ClaimTicket {
        id,
        kind: ClaimKind::ClawBack,
        interval,
        payee: None,
    })
}

/// Validate every id of a batch with `check`, failing on the first error.
///
/// An id repeated within the batch fails with
/// [`PreconditionError::AlreadyClaimed`], as it would if the batch ran
/// one id at a time.
pub fn check_batch<F>(ids: &[UnitId], mut check: F) -> Result<Vec<ClaimTicket>, PreconditionError>
where
    F: FnMut(UnitId) -> Result<ClaimTicket, PreconditionError>,
{
    let mut seen = HashSet::with_capacity(ids.len());
    let mut tickets = Vec::with_capacity(ids.len());
    for &id in ids {
        let ticket = check(id)?;
        if !seen.insert(id) {
            return Err(PreconditionError::AlreadyClaimed(id));
        }
        tickets.push(ticket);
    }
    Ok(tickets)
}
