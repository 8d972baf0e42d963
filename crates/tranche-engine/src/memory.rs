//! In-memory collaborators for tests and simulation.
//!
//! Each type is a cheap shared handle: clone it before handing it to an
//! engine and keep the clone to drive the world (create and close units,
//! move time, inspect balances). Several engines can share one
//! [`MemoryLedger`], which is how a successor sees value forwarded to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use tranche_core::error::{LedgerError, RegistryError};
use tranche_core::traits::{TimeSource, ValueLedger, WorkUnitRegistry};
use tranche_core::types::{Address, Amount, Timestamp, UnitId};

// ---------------------------------------------------------------------------
// MemoryRegistry
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
struct UnitEntry {
    created_at: Timestamp,
    payout: Address,
    closed_at: Option<Timestamp>,
    terminated: bool,
}

/// Append-only registry of work units in creation order.
#[derive(Clone, Debug, Default)]
pub struct MemoryRegistry {
    units: Arc<RwLock<Vec<UnitEntry>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with one active unit per timestamp, all paying `payout`.
    pub fn with_units(timestamps: &[Timestamp], payout: Address) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for &t in timestamps {
            registry.add_unit(t, payout)?;
        }
        Ok(registry)
    }

    /// Append an active unit. Creation times must be non-decreasing.
    pub fn add_unit(&self, created_at: Timestamp, payout: Address) -> Result<UnitId, RegistryError> {
        let mut units = self.units.write();
        if let Some(last) = units.last() {
            if created_at < last.created_at {
                return Err(RegistryError::OutOfOrder {
                    previous: last.created_at,
                    created_at,
                });
            }
        }
        units.push(UnitEntry {
            created_at,
            payout,
            closed_at: None,
            terminated: false,
        });
        Ok(UnitId(units.len() as u64 - 1))
    }

    fn with_unit<T>(
        &self,
        id: UnitId,
        f: impl FnOnce(&mut UnitEntry) -> T,
    ) -> Result<T, RegistryError> {
        let mut units = self.units.write();
        usize::try_from(id.0)
            .ok()
            .and_then(|i| units.get_mut(i))
            .map(f)
            .ok_or(RegistryError::UnknownUnit(id))
    }

    /// Close a unit normally at `at`.
    pub fn close(&self, id: UnitId, at: Timestamp) -> Result<(), RegistryError> {
        self.with_unit(id, |u| {
            u.closed_at = Some(at);
            u.terminated = false;
        })
    }

    /// Close every unit created at or before `at` that is still active.
    pub fn close_created_through(&self, at: Timestamp) {
        for unit in self.units.write().iter_mut() {
            if unit.created_at <= at && unit.closed_at.is_none() && !unit.terminated {
                unit.closed_at = Some(at);
            }
        }
    }

    /// Mark a unit abnormally terminated.
    pub fn terminate(&self, id: UnitId) -> Result<(), RegistryError> {
        self.with_unit(id, |u| {
            u.closed_at = None;
            u.terminated = true;
        })
    }

    fn get(&self, id: UnitId) -> Option<UnitEntry> {
        let units = self.units.read();
        usize::try_from(id.0).ok().and_then(|i| units.get(i)).cloned()
    }
}

impl WorkUnitRegistry for MemoryRegistry {
    fn exists(&self, id: UnitId) -> bool {
        id.0 < self.count()
    }

    fn count(&self) -> u64 {
        self.units.read().len() as u64
    }

    fn created_at(&self, id: UnitId) -> Option<Timestamp> {
        self.get(id).map(|u| u.created_at)
    }

    fn is_closed(&self, id: UnitId) -> bool {
        self.get(id).is_some_and(|u| u.closed_at.is_some() && !u.terminated)
    }

    fn is_terminated(&self, id: UnitId) -> bool {
        self.get(id).is_some_and(|u| u.terminated)
    }

    fn closed_at(&self, id: UnitId) -> Option<Timestamp> {
        self.get(id).and_then(|u| u.closed_at)
    }

    fn payout_address_of(&self, id: UnitId) -> Option<Address> {
        self.get(id).map(|u| u.payout)
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// A shared book of balances.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    balances: Arc<Mutex<HashMap<Address, Amount>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create value out of thin air for `to`.
    pub fn mint(&self, to: &Address, amount: Amount) {
        *self.balances.lock().entry(*to).or_default() += amount;
    }

    pub fn balance_of(&self, who: &Address) -> Amount {
        self.balances.lock().get(who).copied().unwrap_or(0)
    }

    /// Move value between two accounts.
    pub fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        let mut balances = self.balances.lock();
        let have = balances.get(from).copied().unwrap_or(0);
        let remaining = have
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance { have, need: amount })?;
        balances.insert(*from, remaining);
        *balances.entry(*to).or_default() += amount;
        Ok(())
    }

    /// A [`ValueLedger`] view of this book for the account `address`.
    pub fn account(&self, address: Address) -> LedgerAccount {
        LedgerAccount {
            ledger: self.clone(),
            address,
        }
    }
}

/// One account of a [`MemoryLedger`], as seen by the engine that owns it.
#[derive(Clone, Debug)]
pub struct LedgerAccount {
    ledger: MemoryLedger,
    address: Address,
}

impl LedgerAccount {
    /// The shared book behind this account.
    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }
}

impl ValueLedger for LedgerAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn held_balance(&self) -> Amount {
        self.ledger.balance_of(&self.address)
    }

    fn pull(&mut self, from: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.ledger.transfer(from, &self.address, amount)
    }

    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.ledger.transfer(&self.address, to, amount)
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(now)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
