//! Scenario files: a pool, its participants, and a timed list of actions.
//!
//! Scenarios are read with the `config` crate, so any format it recognises by
//! extension works (TOML, JSON, YAML). Environment variables prefixed with
//! `TRANCHE_` override file values, with `__` separating nested keys, e.g.
//! `TRANCHE_POOL__MINIMUM_UNITS_PER_INTERVAL=3`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use tranche_core::config::PoolConfig;
use tranche_core::types::{IntervalIndex, Timestamp};

/// A complete simulation input.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Scenario {
    pub pool: PoolConfig,
    /// Label of the owner account.
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Starting balances by account label.
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
    /// Work units in creation order.
    #[serde(default)]
    pub units: Vec<UnitSpec>,
    /// Actions, in the order they are applied.
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_owner() -> String {
    "owner".to_string()
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UnitSpec {
    pub created_at: Timestamp,
    /// Account label the unit pays out to.
    pub payee: String,
}

/// One action applied with the clock set to `at`.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub at: Timestamp,
    #[serde(flatten)]
    pub action: Action,
    /// The step is expected to be rejected by the engine.
    #[serde(default)]
    pub expect_error: bool,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Pull `amount` from `from` into the pool.
    Fund { from: String, amount: u64 },
    /// Move value into the engine's account without telling the engine.
    Deposit { from: String, amount: u64 },
    MarkFunded {
        #[serde(default)]
        caller: Option<String>,
    },
    Close { unit: u64 },
    Terminate { unit: u64 },
    Allocate { interval: IntervalIndex },
    Receive { units: Vec<u64> },
    Report { units: Vec<u64> },
    InitiateUpgrade {
        successor: String,
        #[serde(default)]
        caller: Option<String>,
    },
    FinalizeUpgrade {
        #[serde(default)]
        caller: Option<String>,
    },
}

impl Action {
    /// Short name used in reports and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Fund { .. } => "fund",
            Action::Deposit { .. } => "deposit",
            Action::MarkFunded { .. } => "mark_funded",
            Action::Close { .. } => "close",
            Action::Terminate { .. } => "terminate",
            Action::Allocate { .. } => "allocate",
            Action::Receive { .. } => "receive",
            Action::Report { .. } => "report",
            Action::InitiateUpgrade { .. } => "initiate_upgrade",
            Action::FinalizeUpgrade { .. } => "finalize_upgrade",
        }
    }
}

impl Scenario {
    /// Load a scenario file, applying `TRANCHE_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("TRANCHE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let scenario: Scenario = settings
            .try_deserialize()
            .with_context(|| format!("invalid scenario {}", path.display()))?;
        scenario.pool.validate().context("invalid pool parameters")?;
        Ok(scenario)
    }
}
