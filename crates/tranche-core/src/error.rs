//! Error types for the Tranche engine.
use thiserror::Error;

use crate::types::{Address, Amount, IntervalIndex, Timestamp, UnitId};

/// A command's precondition did not hold. The command made no state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("rewards already claimed for {0}")] AlreadyClaimed(UnitId),
    #[error("work unit is not closed: {0}")] NotClosed(UnitId),
    #[error("work unit is not terminated: {0}")] NotTerminated(UnitId),
    #[error("work unit not recognized by registry: {0}")] IdNotRecognized(UnitId),
    #[error("interval {interval} has not ended yet (ends at {ends_at}, now {now})")] IntervalNotEnded { interval: IntervalIndex, ends_at: Timestamp, now: Timestamp },
    #[error("timestamp {target} is in the future (now {now})")] EndpointInFuture { target: Timestamp, now: Timestamp },
    #[error("pool has not been marked as funded")] NotFunded,
    #[error("interval {0} not allocated yet")] IntervalNotAllocated(IntervalIndex),
    #[error("upgrade not initiated")] UpgradeNotInitiated,
    #[error("upgrade timer not elapsed: interval {interval} ends at {ends_at}, now {now}")] UpgradeTimerNotElapsed { interval: IntervalIndex, ends_at: Timestamp, now: Timestamp },
    #[error("engine frozen: rewards were migrated to {successor}")] Frozen { successor: Address },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("caller is not the owner: {0}")] NotOwner(Address),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: Amount, need: Amount },
    #[error("transfer rejected: {0}")] TransferRejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("interval weights must not be empty")] EmptyWeights,
    #[error("interval weight {weight} at index {index} exceeds 100")] WeightOutOfRange { index: usize, weight: u64 },
    #[error("interval length must be positive")] ZeroIntervalLength,
    #[error("minimum units per interval must be positive")] ZeroMinimumUnits,
    #[error("epoch start {0} overflows interval arithmetic")] EpochStartTooLarge(Timestamp),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("work unit created at {created_at} precedes previous unit at {previous}")] OutOfOrder { previous: Timestamp, created_at: Timestamp },
    #[error("unknown work unit: {0}")] UnknownUnit(UnitId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid length: {0} hex digits")] InvalidLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrancheError {
    #[error(transparent)] Precondition(#[from] PreconditionError),
    #[error(transparent)] Authorization(#[from] AuthorizationError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Registry(#[from] RegistryError),
}

impl TrancheError {
    /// The precondition that failed, if this is a precondition error.
    pub fn precondition(&self) -> Option<&PreconditionError> {
        match self {
            Self::Precondition(e) => Some(e),
            _ => None,
        }
    }
}
