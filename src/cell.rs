//! Critical-section cell (C1).
//!
//! A thin wrapper around [`std::sync::Mutex`] carrying some state `S`.
//! Exposes a single operation, [`CriticalSection::with_critical_region`],
//! that locks, runs a closure, and unlocks, returning the computed value.
//!
//! **Constraint**: no suspension point (`.await`) may occur inside the
//! closure: the lock is a plain `std::sync::Mutex`, not an async one, and
//! is never meant to be held across an await point. Every state machine in
//! this crate follows the same discipline: the closure returns an "output"
//! describing which continuations to resume or tasks to abort, and the
//! caller applies that output *after* the guard has dropped.

use std::sync::Mutex;

pub(crate) struct CriticalSection<S> {
    state: Mutex<S>,
}

impl<S> CriticalSection<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Runs `f` with exclusive access to the protected state and returns
    /// whatever `f` computes. `f` must not suspend (no `.await`).
    ///
    /// A poisoned lock (a previous critical region panicked while holding
    /// it) is recovered rather than propagated: the state machines in this
    /// crate are built to fail closed on their own terms, not via poisoning.
    pub(crate) fn with_critical_region<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
