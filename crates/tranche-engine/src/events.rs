//! Events journaled by successful engine commands.

use serde::Serialize;

use tranche_core::types::{Address, Amount, IntervalIndex, UnitId};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RewardEvent {
    Funded {
        from: Address,
        declared: Amount,
        swept: Amount,
        total_funded: Amount,
    },
    MarkedFunded,
    IntervalAllocated {
        interval: IntervalIndex,
        unit_count: u64,
        allocated: Amount,
        reward_per_unit: Amount,
    },
    RewardReceived {
        unit: UnitId,
        interval: IntervalIndex,
        beneficiary: Address,
        amount: Amount,
    },
    TerminationReported {
        unit: UnitId,
        interval: IntervalIndex,
        amount: Amount,
        /// Where the share went; `None` when it returned to this pool.
        forwarded_to: Option<Address>,
    },
    UpgradeInitiated {
        successor: Address,
        interval: IntervalIndex,
    },
    UpgradeFinalized {
        successor: Address,
        transferred: Amount,
    },
}
