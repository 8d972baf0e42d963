//! Shared fixtures for scenario and adversarial tests.

use tranche_core::config::PoolConfig;
use tranche_core::traits::{SingleOwner, TimeSource, ValueLedger};
use tranche_core::types::{Address, Amount, Timestamp};
use tranche_engine::memory::{LedgerAccount, ManualClock, MemoryLedger, MemoryRegistry};
use tranche_engine::RewardEngine;

pub type TestEngine = RewardEngine<MemoryRegistry, LedgerAccount, SingleOwner, ManualClock>;

/// Pool funding used by most scenarios.
pub const TOTAL_REWARDS: Amount = 1_000_000;

/// Unit creation times for the reference scenario: a 100-second interval
/// starting at 1000, with `[3, 4, 1, 2, 0, 1, 2]` units in intervals 0..=6.
pub const REWARD_TIMESTAMPS: [Timestamp; 13] = [
    1000, 1001, 1099, // interval 0; units 0..=2
    1100, 1101, 1102, 1103, // interval 1; units 3..=6
    1234, // interval 2; unit 7
    1300, 1301, // interval 3; units 8..=9
    // interval 4 is empty
    1500, // interval 5; unit 10
    1600, 1601, // interval 6; units 11..=12
];

/// Deterministic address from a short label.
pub fn addr(label: &str) -> Address {
    Address::from_label(label)
}

pub fn owner() -> Address {
    addr("owner")
}

pub fn funder() -> Address {
    addr("funder")
}

pub fn beneficiary() -> Address {
    addr("beneficiary")
}

pub fn engine_address() -> Address {
    addr("engine")
}

/// Weights `[20, 50, 25, 50]`, minimum 2, 100-second intervals from 1000.
pub fn reference_config() -> PoolConfig {
    PoolConfig {
        epoch_start: 1000,
        interval_length: 100,
        weights: vec![20, 50, 25, 50],
        minimum_units_per_interval: 2,
    }
}

/// An engine with its collaborators, the handles kept for driving them.
pub struct World {
    pub engine: TestEngine,
    pub registry: MemoryRegistry,
    pub book: MemoryLedger,
    pub clock: ManualClock,
}

impl World {
    /// An unfunded engine over units created at `timestamps`, all paying
    /// [`beneficiary`]. The funder holds ten times [`TOTAL_REWARDS`].
    pub fn new(config: &PoolConfig, timestamps: &[Timestamp], now: Timestamp) -> Self {
        let registry = MemoryRegistry::with_units(timestamps, beneficiary()).unwrap();
        let book = MemoryLedger::new();
        book.mint(&funder(), 10 * TOTAL_REWARDS);
        let clock = ManualClock::new(now);
        let engine = RewardEngine::new(
            config,
            registry.clone(),
            book.account(engine_address()),
            SingleOwner(owner()),
            clock.clone(),
        )
        .unwrap();
        Self {
            engine,
            registry,
            book,
            clock,
        }
    }

    /// As [`World::new`], then funded with `amount` and marked funded.
    pub fn funded(
        config: &PoolConfig,
        timestamps: &[Timestamp],
        now: Timestamp,
        amount: Amount,
    ) -> Self {
        let mut world = Self::new(config, timestamps, now);
        world.engine.fund(&funder(), amount).unwrap();
        world.engine.mark_funded(&owner()).unwrap();
        world
    }

    /// The reference scenario funded with [`TOTAL_REWARDS`], observed at
    /// `now`.
    pub fn reference(now: Timestamp) -> Self {
        Self::funded(&reference_config(), &REWARD_TIMESTAMPS, now, TOTAL_REWARDS)
    }

    /// Value the engine currently holds.
    pub fn held(&self) -> Amount {
        self.engine.value_ledger().held_balance()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn balance_of(&self, who: &Address) -> Amount {
        self.book.balance_of(who)
    }

    /// `total_funded == held + dispensed`.
    pub fn reconciles(&self) -> bool {
        self.engine.funding().reconciles_with(self.held())
    }
}
