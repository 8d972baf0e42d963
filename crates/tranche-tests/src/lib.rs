//! Scenario and adversarial test suite for the Tranche reward engine.
//!
//! This crate drives complete engines against in-memory collaborators and
//! checks the accounting invariants from the outside: conservation of value,
//! reconciliation against held balances, exactly-once settlement, and the
//! upgrade handoff.

pub mod helpers;
