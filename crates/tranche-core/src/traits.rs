//! Trait interfaces for the engine's external collaborators.
//!
//! - [`WorkUnitRegistry`]: authoritative list of work units and their lifecycle
//! - [`ValueLedger`]: the account holding the pool's value
//! - [`Authority`]: the privileged principal for administrative commands
//! - [`TimeSource`]: the current time
//!
//! In-memory implementations for tests and simulation live in
//! `tranche-engine::memory`.

use crate::error::LedgerError;
use crate::types::{Address, Amount, Timestamp, UnitId};

/// Read-only view of the work units eligible for rewards.
///
/// Units must be exposed in non-decreasing creation-time order: for
/// positions `a < b`, `created_at(a) <= created_at(b)`.
pub trait WorkUnitRegistry: Send + Sync {
    /// Whether `id` names a known unit.
    fn exists(&self, id: UnitId) -> bool;

    /// Number of units created so far.
    fn count(&self) -> u64;

    /// Creation time of a unit. `None` if unknown.
    fn created_at(&self, id: UnitId) -> Option<Timestamp>;

    /// Whether the unit completed normally.
    fn is_closed(&self, id: UnitId) -> bool;

    /// Whether the unit terminated abnormally.
    fn is_terminated(&self, id: UnitId) -> bool;

    /// When the unit closed. `None` while active or if terminated.
    fn closed_at(&self, id: UnitId) -> Option<Timestamp>;

    /// Where the unit's reward is paid. `None` if unknown.
    fn payout_address_of(&self, id: UnitId) -> Option<Address>;

    /// Recognized, closed, and not terminated.
    ///
    /// Default implementation combines [`exists`](Self::exists),
    /// [`is_closed`](Self::is_closed), and [`is_terminated`](Self::is_terminated).
    fn eligible_for_reward(&self, id: UnitId) -> bool {
        self.exists(id) && self.is_closed(id) && !self.is_terminated(id)
    }

    /// Recognized and terminated.
    fn eligible_but_terminated(&self, id: UnitId) -> bool {
        self.exists(id) && self.is_terminated(id)
    }
}

/// The ledger account that holds this engine's value.
pub trait ValueLedger: Send + Sync {
    /// This engine's own address on the ledger.
    fn address(&self) -> Address;

    /// Balance currently held by this engine.
    fn held_balance(&self) -> Amount;

    /// Move `amount` from `from` into this engine's account.
    fn pull(&mut self, from: &Address, amount: Amount) -> Result<(), LedgerError>;

    /// Move `amount` out of this engine's account to `to`.
    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), LedgerError>;
}

/// Authorization check for owner-only commands.
pub trait Authority: Send + Sync {
    /// Whether `caller` may run owner-only commands.
    fn is_owner(&self, caller: &Address) -> bool;
}

/// Source of the current time.
pub trait TimeSource: Send + Sync {
    /// Current Unix time in seconds.
    fn now(&self) -> Timestamp;
}

/// An [`Authority`] with exactly one owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SingleOwner(pub Address);

impl Authority for SingleOwner {
    fn is_owner(&self, caller: &Address) -> bool {
        *caller == self.0
    }
}

/// Wall-clock [`TimeSource`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}
