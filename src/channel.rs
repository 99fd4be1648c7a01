//! Buffered channel (C2).
//!
//! An unbounded, single-consumer FIFO between one or more producers and one
//! consumer. `send` never blocks; `next()` suspends only when the buffer is
//! empty and no terminal has been latched yet.
//!
//! ## How It Works
//!
//! ```text
//!  producers --send()--> [ VecDeque<T> ] --next()--> consumer
//!                               |
//!                         terminal latch
//! ```
//!
//! - A `send` either resumes a parked consumer directly or pushes to the
//!   buffer.
//! - A `send_terminal` latches the terminal; once latched it is returned on
//!   every subsequent `next()`, after any elements already buffered.
//! - At most one consumer may be parked at a time: this channel is the
//!   per-consumer fan-out leaf used by [`crate::subject`] and the interleaving
//!   fabric used by [`crate::merge`], never a shared multi-consumer queue
//!   itself.
//!
//! ## Cancellation
//!
//! `next()` returns a future ([`NextFuture`]) that, if dropped before
//! completion, clears its own parked slot under the critical region. This is
//! what lets a combiner abort a consumer's pending `next()` without leaking
//! the channel's internal state, mirroring the cancel-safety contract a
//! lock-free `RecvFuture` documents for its own suspension point.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::cell::CriticalSection;
use crate::termination::Termination;

struct Inner<T, E> {
    buffer: VecDeque<T>,
    awaiting: Option<oneshot::Sender<Result<Option<T>, E>>>,
    terminal: Option<Termination<E>>,
}

impl<T, E> Default for Inner<T, E> {
    fn default() -> Self {
        Self {
            buffer: VecDeque::new(),
            awaiting: None,
            terminal: None,
        }
    }
}

/// Unbounded single-consumer FIFO with non-blocking send and a latched
/// terminal. See the module documentation for the protocol.
pub struct BufferedChannel<T, E> {
    inner: CriticalSection<Inner<T, E>>,
}

impl<T, E> Default for BufferedChannel<T, E> {
    fn default() -> Self {
        Self {
            inner: CriticalSection::new(Inner::default()),
        }
    }
}

impl<T, E: Clone> BufferedChannel<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking send. Resumes a parked consumer if one is waiting, else
    /// buffers the value. A no-op once the terminal has been latched.
    pub fn send(&self, value: T) {
        let resumed = self.inner.with_critical_region(|s| {
            if s.terminal.is_some() {
                return None;
            }
            match s.awaiting.take() {
                Some(tx) => Some((tx, Ok(Some(value)))),
                None => {
                    s.buffer.push_back(value);
                    None
                }
            }
        });
        if let Some((tx, result)) = resumed {
            // A dropped receiver means the consumer already cancelled; that
            // is not an error, the value is simply not delivered.
            let _ = tx.send(result);
        }
    }

    /// Latches the terminal. Idempotent: a second call is a no-op (invariant
    /// I, §8: no send after terminal).
    pub fn send_terminal(&self, termination: Termination<E>) {
        let resumed = self.inner.with_critical_region(|s| {
            if s.terminal.is_some() {
                return None;
            }
            let result = termination.clone().into_result();
            s.terminal = Some(termination);
            s.awaiting.take().map(|tx| (tx, result))
        });
        if let Some((tx, result)) = resumed {
            let _ = tx.send(result);
        }
    }

    /// Pops the next element, returns the latched terminal, or suspends.
    pub fn next(&self) -> NextFuture<'_, T, E> {
        let state = self.inner.with_critical_region(|s| {
            if let Some(v) = s.buffer.pop_front() {
                return FastPath::Ready(Ok(Some(v)));
            }
            if let Some(t) = &s.terminal {
                return FastPath::Ready(t.clone().into_result());
            }
            let (tx, rx) = oneshot::channel();
            s.awaiting = Some(tx);
            FastPath::Pending(rx)
        });
        NextFuture {
            channel: self,
            state: match state {
                FastPath::Ready(r) => NextFutureState::Ready(Some(r)),
                FastPath::Pending(rx) => NextFutureState::Pending(rx),
            },
        }
    }

    /// Snapshot predicate used by the multicast machine (§4.8) to decide
    /// whether it needs to pull the upstream or can just await this channel.
    pub fn has_buffered_elements(&self) -> bool {
        self.inner.with_critical_region(|s| !s.buffer.is_empty())
    }

    fn clear_awaiting(&self) {
        self.inner.with_critical_region(|s| {
            s.awaiting = None;
        });
    }
}

enum FastPath<T, E> {
    Ready(Result<Option<T>, E>),
    Pending(oneshot::Receiver<Result<Option<T>, E>>),
}

enum NextFutureState<T, E> {
    Ready(Option<Result<Option<T>, E>>),
    Pending(oneshot::Receiver<Result<Option<T>, E>>),
    Done,
}

/// Future returned by [`BufferedChannel::next`].
///
/// # Cancel safety
///
/// Cancel-safe: dropping this future before it resolves clears the parked
/// slot it installed (if any), so the channel never retains a stale
/// continuation for a consumer that gave up.
#[must_use = "futures do nothing unless polled"]
pub struct NextFuture<'a, T, E> {
    channel: &'a BufferedChannel<T, E>,
    state: NextFutureState<T, E>,
}

impl<T, E> Future for NextFuture<'_, T, E> {
    type Output = Result<Option<T>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            NextFutureState::Ready(r) => {
                let out = r.take().expect("polled after completion");
                this.state = NextFutureState::Done;
                Poll::Ready(out)
            }
            NextFutureState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(v)) => {
                    this.state = NextFutureState::Done;
                    Poll::Ready(v)
                }
                // The sender side was dropped without resuming us. This can
                // only happen if the channel itself was torn down mid-wait;
                // degrade to end-of-stream rather than hang.
                Poll::Ready(Err(_)) => {
                    tracing::error!("buffered channel lost a continuation while suspended");
                    this.state = NextFutureState::Done;
                    Poll::Ready(Ok(None))
                }
                Poll::Pending => Poll::Pending,
            },
            NextFutureState::Done => panic!("polled after completion"),
        }
    }
}

impl<T, E> Drop for NextFuture<'_, T, E> {
    fn drop(&mut self) {
        if matches!(self.state, NextFutureState::Pending(_)) {
            self.channel.clear_awaiting();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_buffered_elements_in_fifo_order() {
        let chan: BufferedChannel<i32, ()> = BufferedChannel::new();
        chan.send(1);
        chan.send(2);
        assert_eq!(chan.next().await, Ok(Some(1)));
        assert_eq!(chan.next().await, Ok(Some(2)));
    }

    #[tokio::test]
    async fn suspends_on_empty_and_resumes_on_send() {
        let chan: std::sync::Arc<BufferedChannel<i32, ()>> = std::sync::Arc::new(BufferedChannel::new());
        let c2 = chan.clone();
        let handle = tokio::spawn(async move { c2.next().await });
        tokio::task::yield_now().await;
        chan.send(42);
        assert_eq!(handle.await.unwrap(), Ok(Some(42)));
    }

    #[tokio::test]
    async fn terminal_is_returned_after_all_buffered_elements_and_then_forever() {
        let chan: BufferedChannel<i32, &'static str> = BufferedChannel::new();
        chan.send(1);
        chan.send_terminal(Termination::Finished);
        assert_eq!(chan.next().await, Ok(Some(1)));
        assert_eq!(chan.next().await, Ok(None));
        assert_eq!(chan.next().await, Ok(None));
    }

    #[tokio::test]
    async fn failure_terminal_is_mapped_to_err() {
        let chan: BufferedChannel<i32, &'static str> = BufferedChannel::new();
        chan.send_terminal(Termination::Failure("boom"));
        assert_eq!(chan.next().await, Err("boom"));
        assert_eq!(chan.next().await, Err("boom"));
    }

    #[tokio::test]
    async fn send_after_terminal_is_a_silent_no_op() {
        let chan: BufferedChannel<i32, &'static str> = BufferedChannel::new();
        chan.send_terminal(Termination::Finished);
        chan.send(99);
        assert_eq!(chan.next().await, Ok(None));
    }

    #[tokio::test]
    async fn dropping_a_pending_next_clears_the_parked_slot() {
        let chan: BufferedChannel<i32, ()> = BufferedChannel::new();
        {
            let fut = chan.next();
            drop(fut);
        }
        // the slot must have been cleared, otherwise this send would try to
        // resume a dead oneshot sender instead of buffering
        chan.send(7);
        assert_eq!(chan.next().await, Ok(Some(7)));
    }
}
