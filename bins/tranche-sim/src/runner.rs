//! Replays a [`Scenario`] against an engine over in-memory collaborators.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use tranche_core::error::TrancheError;
use tranche_core::traits::{SingleOwner, ValueLedger};
use tranche_core::types::{Address, Amount, Timestamp, UnitId};
use tranche_engine::engine::PoolSnapshot;
use tranche_engine::memory::{LedgerAccount, ManualClock, MemoryLedger, MemoryRegistry};
use tranche_engine::{RewardEngine, RewardEvent};

use crate::scenario::{Action, Scenario};

type SimEngine = RewardEngine<MemoryRegistry, LedgerAccount, SingleOwner, ManualClock>;

/// Label of the engine's own account in reports.
pub const ENGINE_LABEL: &str = "engine";

/// What happened at one step.
#[derive(Serialize, Clone, Debug)]
pub struct StepOutcome {
    pub at: Timestamp,
    pub action: &'static str,
    pub ok: bool,
    pub expected: bool,
    pub detail: String,
}

/// Final state after every step has run.
#[derive(Serialize, Debug)]
pub struct Report {
    pub steps: Vec<StepOutcome>,
    pub pool: PoolSnapshot,
    pub reconciles: bool,
    pub balances: BTreeMap<String, Amount>,
    pub events: Vec<RewardEvent>,
}

impl Report {
    /// Steps whose outcome differed from what the scenario expected.
    pub fn unexpected(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.expected)
    }
}

pub struct Simulation {
    engine: SimEngine,
    registry: MemoryRegistry,
    book: MemoryLedger,
    clock: ManualClock,
    owner: Address,
    labels: BTreeMap<String, Address>,
}

impl Simulation {
    /// Build the world described by `scenario`, before any step runs.
    pub fn new(scenario: &Scenario) -> Result<Self> {
        let mut labels = BTreeMap::new();
        let mut label = |name: &str| {
            let address = Address::from_label(name);
            labels.insert(name.to_string(), address);
            address
        };

        let owner = label(&scenario.owner);
        let engine_address = label(ENGINE_LABEL);

        let registry = MemoryRegistry::new();
        for (i, unit) in scenario.units.iter().enumerate() {
            registry
                .add_unit(unit.created_at, label(&unit.payee))
                .with_context(|| format!("unit {i} is out of creation order"))?;
        }

        let book = MemoryLedger::new();
        for (name, amount) in &scenario.balances {
            book.mint(&label(name), Amount::from(*amount));
        }
        for step in &scenario.steps {
            match &step.action {
                Action::Fund { from, .. } | Action::Deposit { from, .. } => {
                    label(from);
                }
                Action::InitiateUpgrade { successor, .. } => {
                    label(successor);
                }
                _ => {}
            }
        }

        let clock = ManualClock::new(scenario.pool.epoch_start);
        let engine = RewardEngine::new(
            &scenario.pool,
            registry.clone(),
            book.account(engine_address),
            SingleOwner(owner),
            clock.clone(),
        )
        .context("invalid pool parameters")?;

        info!(
            units = scenario.units.len(),
            steps = scenario.steps.len(),
            accounts = labels.len(),
            "simulation ready"
        );
        Ok(Self {
            engine,
            registry,
            book,
            clock,
            owner,
            labels,
        })
    }

    fn address(&self, label: &str) -> Address {
        self.labels
            .get(label)
            .copied()
            .unwrap_or_else(|| Address::from_label(label))
    }

    fn caller(&self, caller: &Option<String>) -> Address {
        caller.as_deref().map_or(self.owner, |c| self.address(c))
    }

    fn apply(&mut self, action: &Action, now: Timestamp) -> Result<String, TrancheError> {
        match action {
            Action::Fund { from, amount } => {
                let from = self.address(from);
                let swept = self.engine.fund(&from, Amount::from(*amount))?;
                Ok(format!("swept {swept}"))
            }
            Action::Deposit { from, amount } => {
                let engine = self.engine.value_ledger().address();
                self.book
                    .transfer(&self.address(from), &engine, Amount::from(*amount))?;
                Ok(format!("deposited {amount}"))
            }
            Action::MarkFunded { caller } => {
                let caller = self.caller(caller);
                self.engine.mark_funded(&caller)?;
                Ok("marked funded".to_string())
            }
            Action::Close { unit } => {
                self.registry.close(UnitId(*unit), now)?;
                Ok(format!("closed {}", UnitId(*unit)))
            }
            Action::Terminate { unit } => {
                self.registry.terminate(UnitId(*unit))?;
                Ok(format!("terminated {}", UnitId(*unit)))
            }
            Action::Allocate { interval } => {
                let record = self.engine.allocate_rewards(*interval)?;
                Ok(format!(
                    "interval {} allocated {} to {} units",
                    record.index, record.allocated_amount, record.unit_count
                ))
            }
            Action::Receive { units } => {
                let ids: Vec<UnitId> = units.iter().copied().map(UnitId).collect();
                let settled = self.engine.receive_rewards(&ids)?;
                let paid: Amount = settled.iter().map(|s| s.amount).sum();
                Ok(format!("paid {paid} to {} units", settled.len()))
            }
            Action::Report { units } => {
                let ids: Vec<UnitId> = units.iter().copied().map(UnitId).collect();
                let settled = self.engine.report_terminations(&ids)?;
                let clawed: Amount = settled.iter().map(|s| s.amount).sum();
                Ok(format!("clawed back {clawed} from {} units", settled.len()))
            }
            Action::InitiateUpgrade { successor, caller } => {
                let (caller, address) = (self.caller(caller), self.address(successor));
                let pending = self.engine.initiate_upgrade(&caller, address)?;
                Ok(format!(
                    "upgrade to {successor} initiated in interval {}",
                    pending.initiated_at_interval
                ))
            }
            Action::FinalizeUpgrade { caller } => {
                let caller = self.caller(caller);
                let done = self.engine.finalize_upgrade(&caller)?;
                Ok(format!("transferred {} to successor", done.transferred))
            }
        }
    }

    /// Run every step of `scenario` in order and report the final state.
    pub fn run(mut self, scenario: &Scenario) -> Report {
        let mut steps = Vec::with_capacity(scenario.steps.len());
        for step in &scenario.steps {
            self.clock.set(step.at);
            let result = self.apply(&step.action, step.at);
            let ok = result.is_ok();
            let expected = ok != step.expect_error;
            let detail = match result {
                Ok(detail) => detail,
                Err(e) => e.to_string(),
            };
            if expected {
                debug!(at = step.at, action = step.action.name(), ok, %detail, "step applied");
            } else {
                warn!(at = step.at, action = step.action.name(), ok, %detail, "unexpected outcome");
            }
            steps.push(StepOutcome {
                at: step.at,
                action: step.action.name(),
                ok,
                expected,
                detail,
            });
        }

        let balances = self
            .labels
            .iter()
            .map(|(name, address)| (name.clone(), self.book.balance_of(address)))
            .collect();
        let reconciles = self
            .engine
            .funding()
            .reconciles_with(self.engine.value_ledger().held_balance());
        Report {
            steps,
            pool: self.engine.snapshot(),
            reconciles,
            balances,
            events: self.engine.take_events(),
        }
    }
}
