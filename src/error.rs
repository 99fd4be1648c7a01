//! Crate-wide error taxonomy.
//!
//! [`CoreError`] only ever represents *internal* failures of this crate's own
//! state machines and broadcast primitives: a violated precondition, a lost
//! continuation, a misconfigured subject. Failures produced by upstream
//! iterators are never wrapped here: they travel through the generic `E`
//! type parameter threaded through every combinator and subject.

use thiserror::Error;

/// Internal failure modes of the combinator/broadcast core.
///
/// None of these are ever surfaced as the `E` of an [`crate::iter::AsyncIterator`];
/// they either panic (precondition violations the caller can't recover from),
/// or are logged and degraded to `Ok(None)` as described in each call site.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A continuation (a suspended `next()` caller) was dropped without being
    /// resumed. This is always a bug in this crate's state machines: every
    /// installed continuation must be resumed by some transition.
    #[error("a continuation was dropped without being resumed")]
    LostContinuation,

    /// [`crate::subject::ReplaySubject::new`] was asked for a zero-capacity
    /// replay buffer (see the design notes on replay capacity 0): capacity 0
    /// is rejected rather than silently treated as "never replays".
    #[error("replay subject buffer size must be at least 1")]
    ZeroReplayCapacity,

    /// A driver task observed a base/upstream violating the protocol it is
    /// expected to follow, e.g. producing a second element before its first
    /// was consumed by a demand. The state machine fails closed (transitions
    /// to `Finished`) rather than hang; this is the diagnostic describing why.
    #[error("state machine precondition violated: {0}")]
    PreconditionViolated(&'static str),
}
