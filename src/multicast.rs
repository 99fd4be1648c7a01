//! Multicast/Share/AutoConnect (C8): shares a single pull against an
//! upstream iterator through a provided subject, so any number of consumers
//! registered on that subject observe the same upstream elements.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::cell::CriticalSection;
use crate::iter::AsyncIterator;
use crate::subject::{PassthroughSubject, SubjectIterator};
use crate::termination::Termination;

/// Connection gate: starts closed (for explicit `connect()`), opened exactly
/// once either by an explicit `connect()` call or implicitly by the first
/// `make_iterator()` under `autoconnect`.
struct Gate {
    notify: Notify,
    opened: CriticalSection<bool>,
}

impl Gate {
    fn new(initially_open: bool) -> Self {
        Self { notify: Notify::new(), opened: CriticalSection::new(initially_open) }
    }

    fn open(&self) {
        let was_closed = self.opened.with_critical_region(|o| {
            let was_closed = !*o;
            *o = true;
            was_closed
        });
        if was_closed {
            self.notify.notify_waiters();
        }
    }

    async fn wait(&self) {
        if self.opened.with_critical_region(|o| *o) {
            return;
        }
        self.notify.notified().await;
    }
}

/// Serializes pulls against a boxed upstream iterator, publishing each
/// outcome to `subject`. At most one pull is ever in flight; a second
/// `advance_if_needed` arriving mid-pull simply returns, leaving the caller
/// to read the result off `subject`'s own channel once it lands.
struct SharedPull<T, E> {
    upstream: CriticalSection<Option<Box<dyn AsyncIterator<T, E>>>>,
    pulling: CriticalSection<bool>,
    subject: PassthroughSubject<T, E>,
}

impl<T, E> SharedPull<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    async fn advance_if_needed(&self) {
        let should_pull = self.pulling.with_critical_region(|p| {
            let was_pulling = *p;
            *p = true;
            !was_pulling
        });
        if !should_pull {
            return;
        }
        let mut taken = self.upstream.with_critical_region(|slot| slot.take());
        let outcome = match &mut taken {
            Some(it) => {
                let result = it.next().await;
                self.upstream.with_critical_region(|slot| *slot = taken.take());
                result
            }
            None => Ok(None),
        };
        match outcome {
            Ok(Some(v)) => self.subject.send(v),
            Ok(None) => self.subject.send_terminal(Termination::Finished),
            Err(e) => self.subject.send_terminal(Termination::Failure(e)),
        }
        self.pulling.with_critical_region(|p| *p = false);
    }
}

/// Coordinates a single in-flight pull against an upstream iterator on
/// behalf of however many consumers register against the shared subject.
pub struct Multicast<T, E> {
    gate: Arc<Gate>,
    pull: Arc<SharedPull<T, E>>,
}

impl<T, E> Multicast<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// `autoconnect = false`: consumers registered via `make_iterator()`
    /// block until `connect()` is called.
    pub fn new<I>(upstream: I, subject: PassthroughSubject<T, E>, autoconnect: bool) -> Self
    where
        I: AsyncIterator<T, E> + 'static,
    {
        Self {
            gate: Arc::new(Gate::new(autoconnect)),
            pull: Arc::new(SharedPull {
                upstream: CriticalSection::new(Some(Box::new(upstream) as Box<_>)),
                pulling: CriticalSection::new(false),
                subject,
            }),
        }
    }

    /// `share()`: multicast into a fresh passthrough subject, autoconnected.
    pub fn share<I>(upstream: I) -> Self
    where
        I: AsyncIterator<T, E> + 'static,
    {
        Self::new(upstream, PassthroughSubject::new(), true)
    }

    /// Opens the connection gate. Idempotent; a no-op if already open.
    pub fn connect(&self) {
        self.gate.open();
    }

    /// Returns a consumer iterator over the shared subject. Blocks until the
    /// connection gate opens before registering against the subject.
    pub async fn make_iterator(&self) -> MulticastIterator<T, E> {
        self.gate.wait().await;
        MulticastIterator {
            inner: self.pull.subject.make_iterator(),
            gate: self.gate.clone(),
            pull: self.pull.clone(),
        }
    }
}

/// Consumer-side handle over a [`Multicast`]: reads from the shared subject,
/// advancing the upstream whenever no pull against it is already in flight.
pub struct MulticastIterator<T, E> {
    inner: SubjectIterator<T, E>,
    gate: Arc<Gate>,
    pull: Arc<SharedPull<T, E>>,
}

impl<T, E> AsyncIterator<T, E> for MulticastIterator<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        Box::pin(async move {
            self.gate.wait().await;
            if !self.inner.has_buffered_elements() {
                self.pull.advance_if_needed().await;
            }
            self.inner.next().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::from_iter;

    #[tokio::test]
    async fn share_broadcasts_one_upstream_pull_to_every_consumer() {
        let upstream = from_iter(vec![1, 2, 3], None);
        let shared: Multicast<i32, std::convert::Infallible> = Multicast::share(upstream);
        let mut a = shared.make_iterator().await;
        let mut b = shared.make_iterator().await;
        assert_eq!(AsyncIterator::next(&mut a).await, Ok(Some(1)));
        assert_eq!(AsyncIterator::next(&mut b).await, Ok(Some(1)));
        assert_eq!(AsyncIterator::next(&mut a).await, Ok(Some(2)));
        assert_eq!(AsyncIterator::next(&mut b).await, Ok(Some(2)));
    }

    #[tokio::test]
    async fn explicit_connect_gates_registration() {
        let upstream = from_iter(vec![1], None);
        let shared: Multicast<i32, std::convert::Infallible> =
            Multicast::new(upstream, PassthroughSubject::new(), false);
        let handle = tokio::spawn({
            let gate = shared.gate.clone();
            let pull = shared.pull.clone();
            async move {
                gate.wait().await;
                let mut it = MulticastIterator { inner: pull.subject.make_iterator(), gate, pull };
                AsyncIterator::next(&mut it).await
            }
        });
        tokio::task::yield_now().await;
        shared.connect();
        assert_eq!(handle.await.unwrap(), Ok(Some(1)));
    }

    #[tokio::test]
    async fn upstream_end_is_broadcast_as_a_terminal() {
        let upstream = from_iter(Vec::<i32>::new(), None);
        let shared: Multicast<i32, std::convert::Infallible> = Multicast::share(upstream);
        let mut it = shared.make_iterator().await;
        assert_eq!(AsyncIterator::next(&mut it).await, Ok(None));
    }
}
