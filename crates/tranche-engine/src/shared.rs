//! Thread-safe handle to a [`RewardEngine`].
//!
//! Commands on one engine are serialized by a single mutex, so each command
//! observes and leaves a consistent pool.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::engine::RewardEngine;

/// Cloneable, lock-protected engine.
pub struct SharedEngine<R, L, A, T> {
    inner: Arc<Mutex<RewardEngine<R, L, A, T>>>,
}

impl<R, L, A, T> Clone for SharedEngine<R, L, A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, L, A, T> SharedEngine<R, L, A, T> {
    pub fn new(engine: RewardEngine<R, L, A, T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Lock the engine for a sequence of calls.
    pub fn lock(&self) -> MutexGuard<'_, RewardEngine<R, L, A, T>> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&mut RewardEngine<R, L, A, T>) -> O,
    {
        f(&mut self.inner.lock())
    }
}
