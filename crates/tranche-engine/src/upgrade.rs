//! Upgrade coordinator: a delayed, one-time handoff to a successor engine.
//!
//! Initiation records the successor and the interval active at that moment.
//! Finalization is allowed once that interval has ended, so the successor is
//! never locked in before the interval in progress at initiation settles.
//! Finalizing consumes the pending initiation and freezes the engine.

use serde::Serialize;

use tranche_core::error::PreconditionError;
use tranche_core::interval::IntervalClock;
use tranche_core::types::{Address, Amount, IntervalIndex, Timestamp};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingUpgrade {
    pub successor: Address,
    pub initiated_at: Timestamp,
    pub initiated_at_interval: IntervalIndex,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinalizedUpgrade {
    pub successor: Address,
    pub finalized_at: Timestamp,
    /// Unallocated pool handed over at finalization.
    pub transferred: Amount,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpgradeState {
    pending: Option<PendingUpgrade>,
    finalized: Option<FinalizedUpgrade>,
}

impl UpgradeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingUpgrade> {
        self.pending.as_ref()
    }

    pub fn finalized(&self) -> Option<&FinalizedUpgrade> {
        self.finalized.as_ref()
    }

    /// The successor receiving forwarded value, once finalized.
    pub fn active_successor(&self) -> Option<Address> {
        self.finalized.map(|f| f.successor)
    }

    /// Fail with [`PreconditionError::Frozen`] once finalized.
    pub fn require_not_frozen(&self) -> Result<(), PreconditionError> {
        match self.finalized {
            Some(f) => Err(PreconditionError::Frozen {
                successor: f.successor,
            }),
            None => Ok(()),
        }
    }

    /// Record a pending upgrade, replacing any earlier one.
    pub fn initiate(
        &mut self,
        successor: Address,
        now: Timestamp,
        clock: &IntervalClock,
    ) -> Result<PendingUpgrade, PreconditionError> {
        self.require_not_frozen()?;
        let pending = PendingUpgrade {
            successor,
            initiated_at: now,
            initiated_at_interval: clock.interval_of(now),
        };
        self.pending = Some(pending);
        Ok(pending)
    }

    /// Check that the pending upgrade may be finalized at `now`.
    pub fn check_finalize(
        &self,
        now: Timestamp,
        clock: &IntervalClock,
    ) -> Result<PendingUpgrade, PreconditionError> {
        let pending = self.pending.ok_or(PreconditionError::UpgradeNotInitiated)?;
        let interval = pending.initiated_at_interval;
        if !clock.has_ended(interval, now) {
            return Err(PreconditionError::UpgradeTimerNotElapsed {
                interval,
                ends_at: clock.end_of(interval),
                now,
            });
        }
        Ok(pending)
    }

    /// Consume the pending upgrade and freeze.
    pub fn finish(&mut self, finalized: FinalizedUpgrade) {
        self.pending = None;
        self.finalized = Some(finalized);
    }
}
