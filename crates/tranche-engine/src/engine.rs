//! The reward engine: one pool, its collaborators, and every command and
//! query on them.
//!
//! Every command validates all of its preconditions before it mutates
//! anything, so a failed precondition leaves the engine exactly as it was.
//! Value transfers are issued after a balance pre-check, and each one is
//! booked as soon as it lands: if the ledger rejects a transfer midway, the
//! books record exactly the value that moved.

use serde::Serialize;
use tracing::{debug, info, warn};

use tranche_core::config::{PoolConfig, PoolParams};
use tranche_core::error::{
    AuthorizationError, ConfigError, LedgerError, PreconditionError, TrancheError,
};
use tranche_core::traits::{Authority, TimeSource, ValueLedger, WorkUnitRegistry};
use tranche_core::types::{Address, Amount, IntervalIndex, Timestamp, UnitId};

use crate::allocation::{compute_allocation, AllocationLedger, IntervalRecord, Settlement};
use crate::claims::{self, ClaimBook, ClaimKind, ClaimTicket, Settled};
use crate::events::RewardEvent;
use crate::funding::FundingState;
use crate::index::{self, WorkUnitIndex};
use crate::upgrade::{FinalizedUpgrade, PendingUpgrade, UpgradeState};

/// Position in the engine lifecycle.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing funded and not marked funded.
    Unfunded,
    /// Holding value, waiting for the owner to open allocation.
    Funded,
    /// Allocating and paying.
    Active,
    /// A successor is recorded; the timer is running.
    UpgradeInitiated,
    /// Pool handed to the successor; only allocated intervals still pay.
    UpgradeFinalized,
}

/// Serializable view of the whole pool.
#[derive(Serialize, Clone, Debug)]
pub struct PoolSnapshot {
    pub phase: Phase,
    pub funding: FundingState,
    pub dispensed: Amount,
    pub intervals: Vec<IntervalRecord>,
    pub claimed_units: usize,
    pub upgrade: UpgradeState,
}

/// Interval-based reward allocation and claim engine.
pub struct RewardEngine<R, L, A, T> {
    params: PoolParams,
    funding: FundingState,
    index: WorkUnitIndex,
    ledger: AllocationLedger,
    claims: ClaimBook,
    upgrade: UpgradeState,
    events: Vec<RewardEvent>,
    registry: R,
    value: L,
    authority: A,
    clock: T,
}

impl<R, L, A, T> RewardEngine<R, L, A, T>
where
    R: WorkUnitRegistry,
    L: ValueLedger,
    A: Authority,
    T: TimeSource,
{
    /// Create an unfunded engine.
    pub fn new(
        config: &PoolConfig,
        registry: R,
        value: L,
        authority: A,
        clock: T,
    ) -> Result<Self, ConfigError> {
        let params = config.validate()?;
        info!(
            epoch_start = params.clock.epoch_start(),
            interval_length = params.clock.length(),
            weights = ?params.curve.as_slice(),
            minimum_units = params.minimum_units_per_interval,
            "reward engine created"
        );
        Ok(Self {
            params,
            funding: FundingState::default(),
            index: WorkUnitIndex::new(),
            ledger: AllocationLedger::new(),
            claims: ClaimBook::new(),
            upgrade: UpgradeState::new(),
            events: Vec::new(),
            registry,
            value,
            authority,
            clock,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn emit(&mut self, event: RewardEvent) {
        debug!(?event, "reward event");
        self.events.push(event);
    }

    fn require_owner(&self, caller: &Address) -> Result<(), AuthorizationError> {
        if self.authority.is_owner(caller) {
            Ok(())
        } else {
            Err(AuthorizationError::NotOwner(*caller))
        }
    }

    fn require_balance(&self, need: Amount) -> Result<(), LedgerError> {
        let have = self.value.held_balance();
        if have < need {
            return Err(LedgerError::InsufficientBalance { have, need });
        }
        Ok(())
    }

    /// Plan allocation of every interval through `target`.
    fn plan_settlement(
        &self,
        target: IntervalIndex,
        now: Timestamp,
    ) -> Result<Settlement, PreconditionError> {
        if self.ledger.is_allocated(target) {
            return Ok(Settlement::empty(self.funding.unallocated));
        }
        if !self.funding.marked_funded {
            return Err(PreconditionError::NotFunded);
        }
        self.upgrade.require_not_frozen()?;
        self.ledger.plan(
            target,
            &self.registry,
            &self.index,
            &self.params,
            self.funding.unallocated,
            now,
        )
    }

    fn commit_settlement(&mut self, settlement: &Settlement) {
        if settlement.is_empty() {
            return;
        }
        self.ledger.commit(settlement, &mut self.index);
        self.funding.unallocated = settlement.unallocated_after();
        for record in settlement.records() {
            self.emit(RewardEvent::IntervalAllocated {
                interval: record.index,
                unit_count: record.unit_count,
                allocated: record.allocated_amount,
                reward_per_unit: record.reward_per_unit,
            });
        }
        info!(
            through = self.ledger.allocated_count() - 1,
            allocated = settlement.total_allocated(),
            unallocated = self.funding.unallocated,
            "intervals allocated"
        );
    }

    /// Settle a validated batch of claims atomically.
    fn settle_claims(
        &mut self,
        tickets: Vec<ClaimTicket>,
        now: Timestamp,
    ) -> Result<Vec<Settled>, TrancheError> {
        let Some(target) = tickets.iter().map(|t| t.interval).max() else {
            return Ok(Vec::new());
        };
        let settlement = self.plan_settlement(target, now)?;

        let settled: Vec<Settled> = tickets
            .iter()
            .map(|t| Settled {
                id: t.id,
                kind: t.kind,
                interval: t.interval,
                amount: self
                    .ledger
                    .lookup(&settlement, t.interval)
                    .map_or(0, |r| r.reward_per_unit),
                payee: t.payee,
            })
            .collect();

        let successor = self.upgrade.active_successor();
        let paid: Amount = settled
            .iter()
            .filter(|s| s.kind == ClaimKind::Payout)
            .map(|s| s.amount)
            .sum();
        let clawed: Amount = settled
            .iter()
            .filter(|s| s.kind == ClaimKind::ClawBack)
            .map(|s| s.amount)
            .sum();
        let to_forward = if successor.is_some() { clawed } else { 0 };
        self.require_balance(paid + to_forward)?;

        // Each unit is booked as soon as its value has moved.
        self.commit_settlement(&settlement);
        for s in settled.iter().filter(|s| s.kind == ClaimKind::Payout) {
            if let Some(payee) = s.payee.filter(|_| s.amount > 0) {
                self.value.transfer_out(&payee, s.amount).inspect_err(|e| {
                    warn!(unit = %s.id, amount = s.amount, error = %e, "payout rejected");
                })?;
            }
            self.funding.paid_out += s.amount;
            self.claims.mark(s.id);
            if let Some(beneficiary) = s.payee {
                self.emit(RewardEvent::RewardReceived {
                    unit: s.id,
                    interval: s.interval,
                    beneficiary,
                    amount: s.amount,
                });
            }
        }

        // Claw-backs stay in the pool unless forwarding succeeds.
        self.funding.unallocated += clawed;
        let forwarding = match successor.filter(|_| to_forward > 0) {
            Some(to) => self.value.transfer_out(&to, to_forward),
            None => Ok(()),
        };
        let (forwarded, forwarded_to) = match &forwarding {
            Ok(()) => {
                self.funding.unallocated -= to_forward;
                self.funding.forwarded += to_forward;
                (to_forward, successor)
            }
            Err(e) => {
                warn!(amount = to_forward, error = %e, "forwarding claw-backs rejected");
                (0, None)
            }
        };
        for s in settled.iter().filter(|s| s.kind == ClaimKind::ClawBack) {
            self.claims.mark(s.id);
            self.emit(RewardEvent::TerminationReported {
                unit: s.id,
                interval: s.interval,
                amount: s.amount,
                forwarded_to,
            });
        }
        forwarding?;

        info!(units = settled.len(), paid, clawed, forwarded, "claims settled");
        Ok(settled)
    }

    /// Projected `(base, adjusted, per_unit)` of an unallocated interval
    /// against the current pool.
    fn projection(
        &self,
        interval: IntervalIndex,
    ) -> Result<(Amount, Amount, Amount), PreconditionError> {
        let units = self.index.units_in_interval(
            &self.registry,
            &self.params.clock,
            interval,
            self.clock.now(),
        )?;
        Ok(compute_allocation(
            self.funding.unallocated,
            self.params.curve.weight(interval),
            units,
            self.params.minimum_units_per_interval,
        ))
    }

    // ------------------------------------------------------------------
    // Commands: funding
    // ------------------------------------------------------------------

    /// Pull `declared` from `from`, then sweep any unaccounted held value
    /// into the pool. Returns the amount swept.
    ///
    /// `declared` may be 0 to reconcile only. Once the engine is frozen the
    /// swept value is forwarded to the successor instead.
    pub fn fund(&mut self, from: &Address, declared: Amount) -> Result<Amount, TrancheError> {
        if declared > 0 {
            self.value.pull(from, declared)?;
        }
        let held = self.value.held_balance();
        if held.saturating_add(self.funding.dispensed()) < self.funding.total_funded {
            warn!(
                held,
                total_funded = self.funding.total_funded,
                "held balance below accounted funds"
            );
        }
        let swept = self.funding.surplus(held);
        let successor = self.upgrade.active_successor();
        if let Some(successor) = successor.filter(|_| swept > 0) {
            self.value.transfer_out(&successor, swept)?;
        }

        self.funding.absorb(swept);
        if successor.is_some() {
            self.funding.unallocated -= swept;
            self.funding.forwarded += swept;
        }
        let total_funded = self.funding.total_funded;
        self.emit(RewardEvent::Funded {
            from: *from,
            declared,
            swept,
            total_funded,
        });
        info!(declared, swept, total_funded, "pool funded");
        Ok(swept)
    }

    /// Open allocation. Owner-only and idempotent.
    pub fn mark_funded(&mut self, caller: &Address) -> Result<(), TrancheError> {
        self.require_owner(caller)?;
        if self.funding.mark_funded() {
            self.emit(RewardEvent::MarkedFunded);
            info!(total_funded = self.funding.total_funded, "pool marked as funded");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commands: allocation and claims
    // ------------------------------------------------------------------

    /// Allocate interval `i` and every earlier unallocated interval.
    ///
    /// Returns the interval's fixed record; an allocated interval is
    /// returned unchanged.
    pub fn allocate_rewards(
        &mut self,
        interval: IntervalIndex,
    ) -> Result<IntervalRecord, TrancheError> {
        let settlement = self.plan_settlement(interval, self.clock.now())?;
        self.commit_settlement(&settlement);
        self.ledger
            .get(interval)
            .copied()
            .ok_or_else(|| PreconditionError::IntervalNotAllocated(interval).into())
    }

    /// Pay a closed unit its interval's per-unit reward.
    pub fn receive_reward(&mut self, id: UnitId) -> Result<Settled, TrancheError> {
        let mut settled = self.receive_rewards(&[id])?;
        settled.pop().ok_or_else(|| PreconditionError::IdNotRecognized(id).into())
    }

    /// Pay every unit in `ids`, or none of them.
    pub fn receive_rewards(&mut self, ids: &[UnitId]) -> Result<Vec<Settled>, TrancheError> {
        let now = self.clock.now();
        let tickets = claims::check_batch(ids, |id| {
            claims::check_receivable(&self.registry, &self.params.clock, &self.claims, id)
        })?;
        self.settle_claims(tickets, now)
    }

    /// Return a terminated unit's share to the pool, or to the successor
    /// once the upgrade has finalized.
    pub fn report_termination(&mut self, id: UnitId) -> Result<Settled, TrancheError> {
        let mut settled = self.report_terminations(&[id])?;
        settled.pop().ok_or_else(|| PreconditionError::IdNotRecognized(id).into())
    }

    /// Report every unit in `ids`, or none of them.
    pub fn report_terminations(&mut self, ids: &[UnitId]) -> Result<Vec<Settled>, TrancheError> {
        let now = self.clock.now();
        let tickets = claims::check_batch(ids, |id| {
            claims::check_reportable(&self.registry, &self.params.clock, &self.claims, id)
        })?;
        self.settle_claims(tickets, now)
    }

    // ------------------------------------------------------------------
    // Commands: upgrade
    // ------------------------------------------------------------------

    /// Record `successor` and start the upgrade timer. Owner-only.
    pub fn initiate_upgrade(
        &mut self,
        caller: &Address,
        successor: Address,
    ) -> Result<PendingUpgrade, TrancheError> {
        self.require_owner(caller)?;
        let pending = self
            .upgrade
            .initiate(successor, self.clock.now(), &self.params.clock)?;
        self.emit(RewardEvent::UpgradeInitiated {
            successor,
            interval: pending.initiated_at_interval,
        });
        info!(%successor, interval = pending.initiated_at_interval, "upgrade initiated");
        Ok(pending)
    }

    /// Allocate every ended interval, hand the whole unallocated pool to the
    /// successor, and freeze. Owner-only.
    pub fn finalize_upgrade(&mut self, caller: &Address) -> Result<FinalizedUpgrade, TrancheError> {
        self.require_owner(caller)?;
        let now = self.clock.now();
        let pending = self.upgrade.check_finalize(now, &self.params.clock)?;
        let settlement = match self.params.clock.ended_intervals(now).checked_sub(1) {
            Some(last_ended) => self.plan_settlement(last_ended, now)?,
            None => Settlement::empty(self.funding.unallocated),
        };

        let transferred = settlement.unallocated_after();
        self.require_balance(transferred)?;
        if transferred > 0 {
            self.value.transfer_out(&pending.successor, transferred)?;
        }

        self.commit_settlement(&settlement);
        self.funding.unallocated = 0;
        self.funding.forwarded += transferred;
        let finalized = FinalizedUpgrade {
            successor: pending.successor,
            finalized_at: now,
            transferred,
        };
        self.upgrade.finish(finalized);
        self.emit(RewardEvent::UpgradeFinalized {
            successor: pending.successor,
            transferred,
        });
        info!(successor = %pending.successor, transferred, "upgrade finalized");
        Ok(finalized)
    }

    // ------------------------------------------------------------------
    // Queries: pool
    // ------------------------------------------------------------------

    pub fn total_funded(&self) -> Amount {
        self.funding.total_funded
    }

    pub fn unallocated_rewards(&self) -> Amount {
        self.funding.unallocated
    }

    /// Paid to claimants plus forwarded to a successor.
    pub fn dispensed_rewards(&self) -> Amount {
        self.funding.dispensed()
    }

    pub fn paid_out_rewards(&self) -> Amount {
        self.funding.paid_out
    }

    pub fn forwarded_rewards(&self) -> Amount {
        self.funding.forwarded
    }

    pub fn is_funded(&self) -> bool {
        self.funding.marked_funded
    }

    pub fn funding(&self) -> &FundingState {
        &self.funding
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn minimum_units_per_interval(&self) -> u64 {
        self.params.minimum_units_per_interval
    }

    // ------------------------------------------------------------------
    // Queries: intervals
    // ------------------------------------------------------------------

    pub fn interval_of(&self, timestamp: Timestamp) -> IntervalIndex {
        self.params.clock.interval_of(timestamp)
    }

    pub fn start_of(&self, interval: IntervalIndex) -> Timestamp {
        self.params.clock.start_of(interval)
    }

    pub fn end_of(&self, interval: IntervalIndex) -> Timestamp {
        self.params.clock.end_of(interval)
    }

    pub fn current_interval(&self) -> IntervalIndex {
        self.params.clock.current_interval(self.clock.now())
    }

    pub fn interval_weight(&self, interval: IntervalIndex) -> u64 {
        self.params.curve.weight(interval)
    }

    pub fn interval_count(&self) -> u64 {
        self.params.curve.interval_count()
    }

    /// Position of the first unit created at or after `target`.
    pub fn find_endpoint(&self, target: Timestamp) -> Result<u64, PreconditionError> {
        index::find_endpoint(&self.registry, target, self.clock.now())
    }

    /// Registry position one past the last unit of interval `i`.
    pub fn endpoint(&self, interval: IntervalIndex) -> Result<u64, PreconditionError> {
        self.index
            .endpoint(&self.registry, &self.params.clock, interval, self.clock.now())
    }

    /// Whether interval `i`'s endpoint has been memoized.
    pub fn is_interval_processed(&self, interval: IntervalIndex) -> bool {
        self.index.is_processed(interval)
    }

    pub fn units_in_interval(&self, interval: IntervalIndex) -> Result<u64, PreconditionError> {
        if let Some(record) = self.ledger.get(interval) {
            return Ok(record.unit_count);
        }
        self.index
            .units_in_interval(&self.registry, &self.params.clock, interval, self.clock.now())
    }

    /// Nominal share of interval `i` before proration.
    ///
    /// Fixed once allocated; otherwise computed against the current pool.
    pub fn base_allocation(&self, interval: IntervalIndex) -> Amount {
        match self.ledger.get(interval) {
            Some(record) => record.base_amount,
            None => compute_allocation(
                self.funding.unallocated,
                self.params.curve.weight(interval),
                0,
                0,
            )
            .0,
        }
    }

    /// Share of interval `i` after proration.
    pub fn adjusted_allocation(&self, interval: IntervalIndex) -> Result<Amount, PreconditionError> {
        match self.ledger.get(interval) {
            Some(record) => Ok(record.allocated_amount),
            None => self.projection(interval).map(|(_, adjusted, _)| adjusted),
        }
    }

    /// Per-unit reward of interval `i`.
    pub fn reward_per_unit(&self, interval: IntervalIndex) -> Result<Amount, PreconditionError> {
        match self.ledger.get(interval) {
            Some(record) => Ok(record.reward_per_unit),
            None => self.projection(interval).map(|(_, _, per_unit)| per_unit),
        }
    }

    pub fn is_allocated(&self, interval: IntervalIndex) -> bool {
        self.ledger.is_allocated(interval)
    }

    /// Amount allocated to interval `i`.
    pub fn allocated_rewards(&self, interval: IntervalIndex) -> Result<Amount, PreconditionError> {
        self.ledger
            .get(interval)
            .map(|r| r.allocated_amount)
            .ok_or(PreconditionError::IntervalNotAllocated(interval))
    }

    pub fn interval_record(&self, interval: IntervalIndex) -> Option<&IntervalRecord> {
        self.ledger.get(interval)
    }

    pub fn allocated_interval_count(&self) -> u64 {
        self.ledger.allocated_count()
    }

    /// Sum of every allocated interval's amount.
    pub fn total_allocated(&self) -> Amount {
        self.ledger.total_allocated()
    }

    // ------------------------------------------------------------------
    // Queries: work units
    // ------------------------------------------------------------------

    pub fn eligible_for_reward(&self, id: UnitId) -> bool {
        self.registry.eligible_for_reward(id)
    }

    pub fn eligible_but_terminated(&self, id: UnitId) -> bool {
        self.registry.eligible_but_terminated(id)
    }

    pub fn reward_claimed(&self, id: UnitId) -> bool {
        self.claims.is_claimed(id)
    }

    // ------------------------------------------------------------------
    // Queries: lifecycle
    // ------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        if self.upgrade.finalized().is_some() {
            Phase::UpgradeFinalized
        } else if self.upgrade.pending().is_some() {
            Phase::UpgradeInitiated
        } else if self.funding.marked_funded {
            Phase::Active
        } else if self.funding.total_funded > 0 {
            Phase::Funded
        } else {
            Phase::Unfunded
        }
    }

    /// Nothing further will ever be allocated here: the upgrade finalized,
    /// or every configured interval has ended and the pool is empty.
    pub fn is_finished(&self) -> bool {
        if self.upgrade.finalized().is_some() {
            return true;
        }
        let ended = self.params.clock.ended_intervals(self.clock.now());
        ended >= self.params.curve.interval_count() && self.funding.unallocated == 0
    }

    pub fn upgrade_state(&self) -> &UpgradeState {
        &self.upgrade
    }

    /// The successor recorded by a pending or finalized upgrade.
    pub fn successor(&self) -> Option<Address> {
        self.upgrade
            .finalized()
            .map(|f| f.successor)
            .or_else(|| self.upgrade.pending().map(|p| p.successor))
    }

    pub fn upgrade_initiated_at(&self) -> Option<Timestamp> {
        self.upgrade.pending().map(|p| p.initiated_at)
    }

    pub fn upgrade_finalized_at(&self) -> Option<Timestamp> {
        self.upgrade.finalized().map(|f| f.finalized_at)
    }

    // ------------------------------------------------------------------
    // Events and collaborators
    // ------------------------------------------------------------------

    /// Events journaled since the last call.
    pub fn take_events(&mut self) -> Vec<RewardEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[RewardEvent] {
        &self.events
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn value_ledger(&self) -> &L {
        &self.value
    }

    pub fn time_source(&self) -> &T {
        &self.clock
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            phase: self.phase(),
            funding: self.funding.clone(),
            dispensed: self.funding.dispensed(),
            intervals: self.ledger.records().to_vec(),
            claimed_units: self.claims.len(),
            upgrade: self.upgrade.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{LedgerAccount, ManualClock, MemoryLedger, MemoryRegistry};
    use tranche_core::traits::SingleOwner;

    type TestEngine = RewardEngine<MemoryRegistry, LedgerAccount, SingleOwner, ManualClock>;

    const TOTAL: Amount = 1_000_000;

    const REWARD_TIMESTAMPS: [Timestamp; 13] = [
        1000, 1001, 1099, // interval 0; 0..2
        1100, 1101, 1102, 1103, // interval 1; 3..6
        1234, // interval 2; 7
        1300, 1301, // interval 3; 8..9
        1500, // interval 5; 10
        1600, 1601, // interval 6; 11..12
    ];

    struct Fixture {
        engine: TestEngine,
        registry: MemoryRegistry,
        book: MemoryLedger,
        clock: ManualClock,
    }

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn funder() -> Address {
        Address::from_label("funder")
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn config() -> PoolConfig {
        PoolConfig {
            epoch_start: 1000,
            interval_length: 100,
            weights: vec![20, 50, 25, 50],
            minimum_units_per_interval: 2,
        }
    }

    fn unfunded(timestamps: &[Timestamp], now: Timestamp) -> Fixture {
        let registry = MemoryRegistry::with_units(timestamps, alice()).unwrap();
        let book = MemoryLedger::new();
        book.mint(&funder(), 10 * TOTAL);
        let clock = ManualClock::new(now);
        let engine = RewardEngine::new(
            &config(),
            registry.clone(),
            book.account(Address::from_label("engine")),
            SingleOwner(owner()),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            engine,
            registry,
            book,
            clock,
        }
    }

    fn funded(timestamps: &[Timestamp], now: Timestamp) -> Fixture {
        let mut f = unfunded(timestamps, now);
        f.engine.fund(&funder(), TOTAL).unwrap();
        f.engine.mark_funded(&owner()).unwrap();
        f
    }

    // ------------------------------------------------------------------
    // Funding
    // ------------------------------------------------------------------

    #[test]
    fn fund_accumulates() {
        let mut f = funded(&[], 5000);
        assert_eq!(f.engine.total_funded(), TOTAL);
        f.engine.fund(&funder(), TOTAL).unwrap();
        assert_eq!(f.engine.total_funded(), 2 * TOTAL);
        assert_eq!(f.engine.unallocated_rewards(), 2 * TOTAL);
    }

    #[test]
    fn fund_sweeps_direct_transfers() {
        let mut f = funded(&[], 5000);
        f.book
            .transfer(&funder(), &Address::from_label("engine"), TOTAL)
            .unwrap();
        assert_eq!(f.engine.total_funded(), TOTAL);
        assert_eq!(f.engine.fund(&funder(), 0).unwrap(), TOTAL);
        assert_eq!(f.engine.total_funded(), 2 * TOTAL);
        assert_eq!(f.engine.total_funded(), f.engine.value_ledger().held_balance());
    }

    #[test]
    fn failed_pull_changes_nothing() {
        let mut f = unfunded(&[], 5000);
        let poor = Address::from_label("poor");
        let err = f.engine.fund(&poor, 5).unwrap_err();
        assert!(matches!(err, TrancheError::Ledger(LedgerError::InsufficientBalance { .. })));
        assert_eq!(f.engine.total_funded(), 0);
        assert!(f.engine.events().is_empty());
    }

    #[test]
    fn mark_funded_is_owner_only() {
        let mut f = unfunded(&[], 5000);
        assert_eq!(
            f.engine.mark_funded(&funder()),
            Err(AuthorizationError::NotOwner(funder()).into())
        );
        assert!(!f.engine.is_funded());
    }

    #[test]
    fn allocation_requires_funded_mark() {
        let mut f = unfunded(&[], 5000);
        f.engine.fund(&funder(), TOTAL).unwrap();
        assert_eq!(
            f.engine.allocate_rewards(0),
            Err(PreconditionError::NotFunded.into())
        );
        assert_eq!(f.engine.phase(), Phase::Funded);
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    #[test]
    fn allocates_each_interval_in_turn() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        let expected = [200_000, 400_000, 50_000, 175_000, 0, 43_750, 65_625];
        for (i, amount) in expected.iter().enumerate() {
            let i = i as u64;
            assert!(!f.engine.is_allocated(i));
            let record = f.engine.allocate_rewards(i).unwrap();
            assert!(f.engine.is_allocated(i));
            assert_eq!(record.allocated_amount, *amount);
            assert_eq!(f.engine.allocated_rewards(i).unwrap(), *amount);
        }
        assert_eq!(f.engine.unallocated_rewards(), 65_625);
    }

    #[test]
    fn allocates_prefix_in_one_call() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        f.engine.allocate_rewards(6).unwrap();
        let amounts: Vec<Amount> = (0..7).map(|i| f.engine.allocated_rewards(i).unwrap()).collect();
        assert_eq!(amounts, vec![200_000, 400_000, 50_000, 175_000, 0, 43_750, 65_625]);
        assert_eq!(f.engine.allocated_interval_count(), 7);
        assert!(f.engine.is_interval_processed(6));
        assert!(!f.engine.is_interval_processed(7));
    }

    #[test]
    fn reallocation_is_a_noop() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        let first = f.engine.allocate_rewards(1).unwrap();
        f.engine.take_events();
        let again = f.engine.allocate_rewards(1).unwrap();
        assert_eq!(first, again);
        assert!(f.engine.take_events().is_empty());
    }

    #[test]
    fn unended_interval_is_rejected() {
        let mut f = funded(&REWARD_TIMESTAMPS, 1150);
        assert!(matches!(
            f.engine.allocate_rewards(1),
            Err(TrancheError::Precondition(PreconditionError::IntervalNotEnded { interval: 1, .. }))
        ));
        assert!(!f.engine.is_allocated(0));
    }

    #[test]
    fn unallocated_interval_has_no_allocated_rewards() {
        let f = funded(&REWARD_TIMESTAMPS, 5000);
        assert_eq!(
            f.engine.allocated_rewards(2),
            Err(PreconditionError::IntervalNotAllocated(2))
        );
    }

    #[test]
    fn projections_use_current_pool() {
        let f = funded(&REWARD_TIMESTAMPS, 5000);
        let base: Vec<Amount> = (0..7).map(|i| f.engine.base_allocation(i)).collect();
        assert_eq!(
            base,
            vec![200_000, 500_000, 250_000, 500_000, 500_000, 500_000, 500_000]
        );
        let adjusted: Vec<Amount> = (0..7)
            .map(|i| f.engine.adjusted_allocation(i).unwrap())
            .collect();
        assert_eq!(
            adjusted,
            vec![200_000, 500_000, 125_000, 500_000, 0, 250_000, 500_000]
        );
        let per_unit: Vec<Amount> = (0..7).map(|i| f.engine.reward_per_unit(i).unwrap()).collect();
        assert_eq!(
            per_unit,
            vec![66_666, 125_000, 125_000, 250_000, 0, 250_000, 250_000]
        );
    }

    #[test]
    fn projection_requires_ended_interval() {
        let f = funded(&REWARD_TIMESTAMPS, 1150);
        assert!(f.engine.reward_per_unit(1).is_err());
        assert_eq!(f.engine.base_allocation(1), 500_000);
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    #[test]
    fn closed_unit_receives_reward_once() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        f.registry.close_created_through(REWARD_TIMESTAMPS[0]);
        let settled = f.engine.receive_reward(UnitId(0)).unwrap();
        assert_eq!(settled.amount, 66_666);
        assert_eq!(f.book.balance_of(&alice()), 66_666);
        assert_eq!(f.engine.paid_out_rewards(), 66_666);
        assert!(f.engine.reward_claimed(UnitId(0)));

        assert_eq!(
            f.engine.receive_reward(UnitId(0)),
            Err(PreconditionError::AlreadyClaimed(UnitId(0)).into())
        );
        assert_eq!(f.book.balance_of(&alice()), 66_666);
    }

    #[test]
    fn active_unit_cannot_claim() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        assert_eq!(
            f.engine.receive_reward(UnitId(0)),
            Err(PreconditionError::NotClosed(UnitId(0)).into())
        );
    }

    #[test]
    fn claim_emits_event() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        f.registry.close_created_through(REWARD_TIMESTAMPS[0]);
        f.engine.take_events();
        f.engine.receive_reward(UnitId(0)).unwrap();
        let events = f.engine.take_events();
        assert!(matches!(events[0], RewardEvent::IntervalAllocated { interval: 0, .. }));
        assert_eq!(
            events.last(),
            Some(&RewardEvent::RewardReceived {
                unit: UnitId(0),
                interval: 0,
                beneficiary: alice(),
                amount: 66_666
            })
        );
    }

    #[test]
    fn batch_claims_are_all_or_nothing() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        f.registry.close_created_through(REWARD_TIMESTAMPS[2]);
        // unit 3 is still active
        let err = f
            .engine
            .receive_rewards(&[UnitId(0), UnitId(1), UnitId(3)])
            .unwrap_err();
        assert_eq!(err, PreconditionError::NotClosed(UnitId(3)).into());
        assert_eq!(f.book.balance_of(&alice()), 0);
        assert!(!f.engine.reward_claimed(UnitId(0)));
        assert!(!f.engine.is_allocated(0));

        let settled = f.engine.receive_rewards(&[UnitId(0), UnitId(1)]).unwrap();
        assert_eq!(settled.len(), 2);
        assert_eq!(f.book.balance_of(&alice()), 133_332);
    }

    #[test]
    fn termination_returns_share_to_pool() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        f.engine.allocate_rewards(0).unwrap();
        f.registry.terminate(UnitId(1)).unwrap();
        let before = f.engine.unallocated_rewards();
        let settled = f.engine.report_termination(UnitId(1)).unwrap();
        assert_eq!(settled.kind, ClaimKind::ClawBack);
        assert_eq!(f.engine.unallocated_rewards(), before + 66_666);
        assert_eq!(
            f.engine.report_termination(UnitId(1)),
            Err(PreconditionError::AlreadyClaimed(UnitId(1)).into())
        );
    }

    #[test]
    fn termination_of_closed_unit_is_rejected() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        f.registry.close_created_through(REWARD_TIMESTAMPS[0]);
        assert_eq!(
            f.engine.report_termination(UnitId(0)),
            Err(PreconditionError::NotTerminated(UnitId(0)).into())
        );
    }

    #[test]
    fn claim_before_interval_end_is_rejected() {
        let mut f = funded(&[1150], 1160);
        f.registry.close(UnitId(0), 1155).unwrap();
        assert!(matches!(
            f.engine.receive_reward(UnitId(0)),
            Err(TrancheError::Precondition(PreconditionError::IntervalNotEnded { interval: 1, .. }))
        ));
        f.clock.set(1200);
        assert_eq!(f.engine.receive_reward(UnitId(0)).unwrap().interval, 1);
    }

    #[test]
    fn empty_batch_is_noop() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        assert!(f.engine.receive_rewards(&[]).unwrap().is_empty());
        assert!(f.engine.report_terminations(&[]).unwrap().is_empty());
        assert_eq!(f.engine.allocated_interval_count(), 0);
    }

    // ------------------------------------------------------------------
    // Ledger rejections
    // ------------------------------------------------------------------

    /// An engine account whose `reject_at`-th outgoing transfer fails.
    struct RejectingAccount {
        inner: LedgerAccount,
        reject_at: usize,
        transfers: usize,
    }

    impl ValueLedger for RejectingAccount {
        fn address(&self) -> Address {
            self.inner.address()
        }

        fn held_balance(&self) -> Amount {
            self.inner.held_balance()
        }

        fn pull(&mut self, from: &Address, amount: Amount) -> Result<(), LedgerError> {
            self.inner.pull(from, amount)
        }

        fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
            self.transfers += 1;
            if self.transfers == self.reject_at {
                return Err(LedgerError::TransferRejected("payee account locked".into()));
            }
            self.inner.transfer_out(to, amount)
        }
    }

    type RejectingEngine = RewardEngine<MemoryRegistry, RejectingAccount, SingleOwner, ManualClock>;

    fn rejecting(
        now: Timestamp,
        reject_at: usize,
    ) -> (RejectingEngine, MemoryRegistry, MemoryLedger, ManualClock) {
        let registry = MemoryRegistry::with_units(&REWARD_TIMESTAMPS, alice()).unwrap();
        let book = MemoryLedger::new();
        book.mint(&funder(), TOTAL);
        let clock = ManualClock::new(now);
        let account = RejectingAccount {
            inner: book.account(Address::from_label("engine")),
            reject_at,
            transfers: 0,
        };
        let mut engine = RewardEngine::new(
            &config(),
            registry.clone(),
            account,
            SingleOwner(owner()),
            clock.clone(),
        )
        .unwrap();
        engine.fund(&funder(), TOTAL).unwrap();
        engine.mark_funded(&owner()).unwrap();
        (engine, registry, book, clock)
    }

    #[test]
    fn rejected_payout_keeps_earlier_units_settled() {
        let (mut engine, registry, book, _clock) = rejecting(5000, 2);
        registry.close_created_through(1099);
        let ids = [UnitId(0), UnitId(1), UnitId(2)];

        let err = engine.receive_rewards(&ids).unwrap_err();
        assert!(matches!(err, TrancheError::Ledger(LedgerError::TransferRejected(_))));
        assert_eq!(book.balance_of(&alice()), 66_666);
        assert_eq!(engine.paid_out_rewards(), 66_666);
        assert!(engine.reward_claimed(UnitId(0)));
        assert!(!engine.reward_claimed(UnitId(1)));
        assert!(!engine.reward_claimed(UnitId(2)));
        assert!(engine.is_allocated(0));
        assert!(engine.funding().reconciles_with(engine.value_ledger().held_balance()));
        let received: Vec<UnitId> = engine
            .events()
            .iter()
            .filter_map(|e| match e {
                RewardEvent::RewardReceived { unit, .. } => Some(*unit),
                _ => None,
            })
            .collect();
        assert_eq!(received, vec![UnitId(0)]);

        // Retrying never pays a unit twice.
        assert_eq!(
            engine.receive_rewards(&ids),
            Err(PreconditionError::AlreadyClaimed(UnitId(0)).into())
        );
        let settled = engine.receive_rewards(&[UnitId(1), UnitId(2)]).unwrap();
        assert_eq!(settled.len(), 2);
        assert_eq!(book.balance_of(&alice()), 3 * 66_666);
        assert_eq!(engine.paid_out_rewards(), 3 * 66_666);
        assert!(engine.funding().reconciles_with(engine.value_ledger().held_balance()));
    }

    #[test]
    fn rejected_forward_keeps_claw_back_in_pool() {
        let (mut engine, registry, book, clock) = rejecting(1050, 2);
        let successor = Address::from_label("successor");
        engine.initiate_upgrade(&owner(), successor).unwrap();
        clock.set(1100);
        engine.finalize_upgrade(&owner()).unwrap();
        assert_eq!(book.balance_of(&successor), 800_000);

        registry.terminate(UnitId(2)).unwrap();
        let err = engine.report_termination(UnitId(2)).unwrap_err();
        assert!(matches!(err, TrancheError::Ledger(LedgerError::TransferRejected(_))));
        assert!(engine.reward_claimed(UnitId(2)));
        assert_eq!(engine.unallocated_rewards(), 66_666);
        assert_eq!(engine.forwarded_rewards(), 800_000);
        assert_eq!(book.balance_of(&successor), 800_000);
        assert!(engine.funding().reconciles_with(engine.value_ledger().held_balance()));
        assert!(engine.events().iter().any(|e| matches!(
            e,
            RewardEvent::TerminationReported { forwarded_to: None, .. }
        )));
        assert_eq!(
            engine.report_termination(UnitId(2)),
            Err(PreconditionError::AlreadyClaimed(UnitId(2)).into())
        );
    }

    // ------------------------------------------------------------------
    // Upgrade
    // ------------------------------------------------------------------

    #[test]
    fn upgrade_is_owner_only() {
        let mut f = funded(&REWARD_TIMESTAMPS, 1050);
        let successor = Address::from_label("successor");
        assert_eq!(
            f.engine.initiate_upgrade(&funder(), successor),
            Err(AuthorizationError::NotOwner(funder()).into())
        );
        f.engine.initiate_upgrade(&owner(), successor).unwrap();
        assert_eq!(
            f.engine.finalize_upgrade(&funder()),
            Err(AuthorizationError::NotOwner(funder()).into())
        );
    }

    #[test]
    fn finalize_waits_for_interval_end() {
        let mut f = funded(&REWARD_TIMESTAMPS, 1050);
        let successor = Address::from_label("successor");
        f.engine.initiate_upgrade(&owner(), successor).unwrap();
        assert_eq!(f.engine.phase(), Phase::UpgradeInitiated);
        assert!(matches!(
            f.engine.finalize_upgrade(&owner()),
            Err(TrancheError::Precondition(PreconditionError::UpgradeTimerNotElapsed { .. }))
        ));

        f.clock.set(1100);
        let done = f.engine.finalize_upgrade(&owner()).unwrap();
        assert_eq!(done.transferred, 800_000);
        assert_eq!(f.book.balance_of(&successor), 800_000);
        assert_eq!(f.engine.unallocated_rewards(), 0);
        assert_eq!(f.engine.phase(), Phase::UpgradeFinalized);
        assert!(f.engine.is_finished());
    }

    #[test]
    fn frozen_engine_refuses_new_intervals() {
        let mut f = funded(&REWARD_TIMESTAMPS, 1050);
        let successor = Address::from_label("successor");
        f.engine.initiate_upgrade(&owner(), successor).unwrap();
        f.clock.set(1100);
        f.engine.finalize_upgrade(&owner()).unwrap();
        f.clock.set(5000);
        assert_eq!(
            f.engine.allocate_rewards(1),
            Err(PreconditionError::Frozen { successor }.into())
        );
        // Interval 0 still pays.
        f.registry.close_created_through(REWARD_TIMESTAMPS[0]);
        assert_eq!(f.engine.receive_reward(UnitId(0)).unwrap().amount, 66_666);
    }

    #[test]
    fn frozen_engine_forwards_claw_backs_and_deposits() {
        let mut f = funded(&REWARD_TIMESTAMPS, 1050);
        let successor = Address::from_label("successor");
        f.engine.initiate_upgrade(&owner(), successor).unwrap();
        f.clock.set(1100);
        f.engine.finalize_upgrade(&owner()).unwrap();

        f.registry.terminate(UnitId(2)).unwrap();
        f.engine.report_termination(UnitId(2)).unwrap();
        assert_eq!(f.book.balance_of(&successor), 800_000 + 66_666);
        assert_eq!(f.engine.unallocated_rewards(), 0);

        f.book
            .transfer(&funder(), &Address::from_label("engine"), 10)
            .unwrap();
        assert_eq!(f.engine.fund(&funder(), 0).unwrap(), 10);
        assert_eq!(f.book.balance_of(&successor), 800_000 + 66_666 + 10);
        assert_eq!(f.engine.unallocated_rewards(), 0);
        assert!(f.engine.funding().reconciles_with(f.engine.value_ledger().held_balance()));
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut f = funded(&REWARD_TIMESTAMPS, 5000);
        f.engine.allocate_rewards(2).unwrap();
        let snap = f.engine.snapshot();
        assert_eq!(snap.phase, Phase::Active);
        assert_eq!(snap.intervals.len(), 3);
        assert_eq!(snap.funding.total_funded, TOTAL);
        assert_eq!(snap.claimed_units, 0);
    }
}
