//! Integration test reproducing the "switch_to_latest cancels its previous
//! inner" scenario end to end through the crate's public API.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use confluence::{from_iter, AsyncIterator, SwitchToLatest};

/// Infinite counter starting at `next`, ticking every `interval`.
struct Counter {
    next: i32,
    interval: Duration,
}

impl AsyncIterator<i32, ()> for Counter {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<i32>, ()>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.interval).await;
            let v = self.next;
            self.next += 1;
            Ok(Some(v))
        })
    }
}

/// Wraps an iterator and records whether it was dropped before yielding its
/// own terminal outcome — the only way that can happen for an infinite
/// generator is the owning driver task being aborted out from under it.
struct CancelProbe<I> {
    inner: I,
    cancelled: Arc<AtomicBool>,
}

impl<I, T, E> AsyncIterator<T, E> for CancelProbe<I>
where
    I: AsyncIterator<T, E>,
    T: Send,
    E: Send,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        self.inner.next()
    }
}

impl<I> Drop for CancelProbe<I> {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn switching_inners_cancels_the_ones_left_behind() {
    // Inner generators [0,1,2,..], [4,5,6,..], and the finite [8,9,10,11];
    // the outer hands over a new inner every 15ms, each infinite inner ticks
    // every 10ms, so each of the first two produces exactly one element
    // before being switched out.
    let cancelled0 = Arc::new(AtomicBool::new(false));
    let cancelled1 = Arc::new(AtomicBool::new(false));

    let inner0 = CancelProbe {
        inner: Counter { next: 0, interval: Duration::from_millis(10) },
        cancelled: cancelled0.clone(),
    };
    let inner1 = CancelProbe {
        inner: Counter { next: 4, interval: Duration::from_millis(10) },
        cancelled: cancelled1.clone(),
    };
    let inner2 = from_iter(vec![8, 9, 10, 11], None);

    let outer = from_iter(
        vec![
            Box::new(inner0) as Box<dyn AsyncIterator<i32, ()>>,
            Box::new(inner1),
            Box::new(inner2),
        ],
        Some(Duration::from_millis(15)),
    );
    let mut switched: SwitchToLatest<i32, ()> = SwitchToLatest::new(outer);

    let mut seen = Vec::new();
    for _ in 0..6 {
        if let Ok(Some(v)) = switched.next().await {
            seen.push(v);
        }
    }
    assert_eq!(seen, vec![0, 4, 8, 9, 10, 11]);
    assert!(cancelled0.load(Ordering::SeqCst));
    assert!(cancelled1.load(Ordering::SeqCst));
}
