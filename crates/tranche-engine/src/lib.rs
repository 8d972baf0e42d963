//! # tranche-engine: interval-based reward allocation and claim engine.
//!
//! All calculations use integer arithmetic only.
//!
//! The engine turns funding events, work-unit completions, and termination
//! reports into per-interval reward figures and payouts:
//! - **Allocation**: each ended interval takes `weight(i)%` of the
//!   unallocated pool, prorated when fewer than the minimum number of units
//!   completed in it. Settlement always covers a contiguous prefix of
//!   intervals.
//! - **Claims**: closed units receive their interval's per-unit reward once;
//!   terminated units return it to the pool.
//! - **Funding**: deposits from any path are swept into the accounted total.
//! - **Upgrade**: a delayed, one-time handoff of the residual pool to a
//!   successor engine, after which this engine only winds down.

pub mod allocation;
pub mod claims;
pub mod engine;
pub mod events;
pub mod funding;
pub mod index;
pub mod memory;
pub mod shared;
pub mod upgrade;

pub use engine::{Phase, RewardEngine};
pub use events::RewardEvent;
pub use shared::SharedEngine;
