//! Deterministic test helpers (C13). Not exported; used only by this crate's
//! own unit and integration tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::iter::AsyncIterator;

/// Replays a fixed script of results, optionally paced with a sleep between
/// each. Exists so combinator tests can assert exact interleavings without
/// depending on `from_iter`'s "elements only" shape.
pub struct ScriptedIterator<T, E> {
    script: std::collections::VecDeque<Result<Option<T>, E>>,
    interval: Option<std::time::Duration>,
}

impl<T: Send + 'static, E: Send + 'static> ScriptedIterator<T, E> {
    pub fn new(script: Vec<Result<Option<T>, E>>, interval: Option<std::time::Duration>) -> Self {
        Self { script: script.into(), interval }
    }
}

impl<T: Send + 'static, E: Send + 'static> AsyncIterator<T, E> for ScriptedIterator<T, E> {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        Box::pin(async move {
            if let Some(interval) = self.interval {
                tokio::time::sleep(interval).await;
            }
            match self.script.pop_front() {
                Some(r) => r,
                None => Ok(None),
            }
        })
    }
}

/// Wraps an iterator and records whether it was dropped before it ever
/// yielded a terminal outcome on its own (i.e. whether it was cut short by
/// cancellation rather than reaching `Ok(None)`/`Err` through its own logic).
///
/// Only meaningful for iterators that never terminate themselves (infinite
/// generators): for those, any `Drop` can only be explained by the owning
/// driver task being aborted out from under it.
pub struct CancelProbe {
    cancelled: Arc<AtomicBool>,
}

impl CancelProbe {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn wrap<T, E, I>(&self, inner: I) -> Probed<T, E, I>
    where
        I: AsyncIterator<T, E>,
    {
        Probed { inner, cancelled: self.cancelled.clone(), _marker: std::marker::PhantomData }
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancelProbe {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Probed<T, E, I> {
    inner: I,
    cancelled: Arc<AtomicBool>,
    _marker: std::marker::PhantomData<(T, E)>,
}

impl<T, E, I> AsyncIterator<T, E> for Probed<T, E, I>
where
    T: Send,
    E: Send,
    I: AsyncIterator<T, E>,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        self.inner.next()
    }
}

impl<T, E, I> Drop for Probed<T, E, I> {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_iterator_replays_in_order_then_ends() {
        let mut it: ScriptedIterator<i32, ()> = ScriptedIterator::new(vec![Ok(Some(1)), Ok(Some(2))], None);
        assert_eq!(AsyncIterator::next(&mut it).await, Ok(Some(1)));
        assert_eq!(AsyncIterator::next(&mut it).await, Ok(Some(2)));
        assert_eq!(AsyncIterator::next(&mut it).await, Ok(None));
    }

    #[tokio::test]
    async fn cancel_probe_observes_a_drop() {
        let probe = CancelProbe::new();
        {
            let _wrapped = probe.wrap(ScriptedIterator::<i32, ()>::new(vec![], None));
            assert!(!probe.was_cancelled());
        }
        assert!(probe.was_cancelled());
    }
}
