//! # tranche-core
//! Foundation types, interval math, and collaborator traits for the Tranche
//! reward engine.
//!
//! All amounts are integers in the smallest unit of the underlying ledger.

pub mod config;
pub mod constants;
pub mod error;
pub mod interval;
pub mod math;
pub mod traits;
pub mod types;
pub mod weights;

pub use config::PoolConfig;
pub use error::TrancheError;
pub use interval::IntervalClock;
pub use types::{Address, Amount, IntervalIndex, Timestamp, UnitId};
pub use weights::WeightCurve;
