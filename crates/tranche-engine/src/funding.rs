//! Funding reconciler: keeps the accounted pool in step with the value the
//! engine actually holds.
//!
//! Value leaves the engine only through payouts and successor forwarding, both
//! of which are counted in `dispensed`, so at reconciliation
//! `total_funded == held + dispensed`. Anything held beyond that arrived by a
//! path the engine did not see and is swept into the pool.

use serde::Serialize;

use tranche_core::types::Amount;

/// Funding and disbursement totals.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FundingState {
    /// Every unit of value ever accounted into this engine.
    pub total_funded: Amount,
    /// Funded value not yet assigned to any interval.
    pub unallocated: Amount,
    /// Paid to claimants.
    pub paid_out: Amount,
    /// Handed to a successor engine.
    pub forwarded: Amount,
    /// Set once by the owner; allocation is refused until then.
    pub marked_funded: bool,
}

impl FundingState {
    /// Total value that has left the engine.
    pub fn dispensed(&self) -> Amount {
        self.paid_out + self.forwarded
    }

    /// Value held beyond what the books account for.
    ///
    /// Returns 0 if the ledger holds less than expected; that shortfall is
    /// not something a deposit sweep can repair.
    pub fn surplus(&self, held: Amount) -> Amount {
        held.saturating_add(self.dispensed())
            .saturating_sub(self.total_funded)
    }

    /// Whether the books reconcile exactly with `held`.
    pub fn reconciles_with(&self, held: Amount) -> bool {
        held.checked_add(self.dispensed()) == Some(self.total_funded)
    }

    /// Account `amount` as newly funded and return it to the pool.
    pub fn absorb(&mut self, amount: Amount) {
        self.total_funded += amount;
        self.unallocated += amount;
    }

    /// Set the funded gate. Returns `true` on the first call.
    pub fn mark_funded(&mut self) -> bool {
        !std::mem::replace(&mut self.marked_funded, true)
    }
}
