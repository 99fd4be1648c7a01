//! SwitchToLatest state machine (C6): sequence-of-sequences flattening,
//! cancelling the previous inner sequence as soon as a new one arrives.
//!
//! The outer driver task and each inner task write into a shared
//! [`BufferedChannel`] the consumer drains; a generation counter under the
//! critical section lets a just-aborted inner's trailing report (the race
//! between `JoinHandle::abort` taking effect and an in-flight `send`) be
//! told apart from a live one's.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cell::CriticalSection;
use crate::channel::BufferedChannel;
use crate::iter::AsyncIterator;
use crate::spawn::SpawnConfig;
use crate::termination::Termination;

struct SwitchState {
    outer_finished: bool,
    inner_finished: bool,
    generation: u64,
}

/// Flattens an iterator-of-iterators, always following the most recently
/// produced inner. The outer finishing does not end the stream while the
/// current inner is still running; the stream ends once both have finished.
pub struct SwitchToLatest<T, E> {
    channel: Arc<BufferedChannel<T, E>>,
    state: Arc<CriticalSection<SwitchState>>,
    outer_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    inner_task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
    started: bool,
    outer: Option<Box<dyn AsyncIterator<Box<dyn AsyncIterator<T, E>>, E>>>,
    config: Option<SpawnConfig>,
}

impl<T, E> SwitchToLatest<T, E>
where
    T: Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new<O>(outer: O) -> Self
    where
        O: AsyncIterator<Box<dyn AsyncIterator<T, E>>, E> + 'static,
    {
        Self::with_config(outer, None)
    }

    pub fn with_config<O>(outer: O, config: Option<SpawnConfig>) -> Self
    where
        O: AsyncIterator<Box<dyn AsyncIterator<T, E>>, E> + 'static,
    {
        Self {
            channel: Arc::new(BufferedChannel::new()),
            state: Arc::new(CriticalSection::new(SwitchState {
                outer_finished: false,
                inner_finished: true,
                generation: 0,
            })),
            outer_task: std::sync::Mutex::new(None),
            inner_task: Arc::new(std::sync::Mutex::new(None)),
            started: false,
            outer: Some(Box::new(outer)),
            config,
        }
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let mut outer = self.outer.take().expect("outer taken exactly once");
        let channel = self.channel.clone();
        let state = self.state.clone();
        let inner_task = self.inner_task.clone();
        let config = self.config;
        let handle = SpawnConfig::spawn(self.config.as_ref(), async move {
            loop {
                match outer.next().await {
                    Ok(Some(mut inner)) => {
                        let generation = state.with_critical_region(|s| {
                            s.generation += 1;
                            s.inner_finished = false;
                            s.generation
                        });
                        if let Some(prev) = inner_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
                            prev.abort();
                        }
                        let channel = channel.clone();
                        let state = state.clone();
                        let handle = SpawnConfig::spawn(config.as_ref(), async move {
                            loop {
                                match inner.next().await {
                                    Ok(Some(v)) => channel.send(v),
                                    Ok(None) => {
                                        let should_finalize = state.with_critical_region(|s| {
                                            if s.generation != generation {
                                                return false;
                                            }
                                            s.inner_finished = true;
                                            s.outer_finished
                                        });
                                        if should_finalize {
                                            channel.send_terminal(Termination::Finished);
                                        }
                                        break;
                                    }
                                    Err(e) => {
                                        let applicable = state.with_critical_region(|s| s.generation == generation);
                                        if applicable {
                                            channel.send_terminal(Termination::Failure(e));
                                        }
                                        break;
                                    }
                                }
                            }
                        });
                        *inner_task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
                    }
                    Ok(None) => {
                        let should_finalize = state.with_critical_region(|s| {
                            s.outer_finished = true;
                            s.inner_finished
                        });
                        if should_finalize {
                            channel.send_terminal(Termination::Finished);
                        }
                        break;
                    }
                    Err(e) => {
                        channel.send_terminal(Termination::Failure(e));
                        if let Some(prev) = inner_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
                            prev.abort();
                        }
                        break;
                    }
                }
            }
        });
        *self.outer_task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }
}

impl<T, E> AsyncIterator<T, E> for SwitchToLatest<T, E>
where
    T: Send + 'static,
    E: Clone + Send + 'static,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        self.ensure_started();
        let channel = self.channel.clone();
        Box::pin(async move { channel.next().await })
    }
}

impl<T, E> Drop for SwitchToLatest<T, E> {
    fn drop(&mut self) {
        if let Some(h) = self.outer_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            h.abort();
        }
        if let Some(h) = self.inner_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::{from_iter, AsyncIterator as _};
    use crate::testutil::CancelProbe;
    use std::time::Duration;

    /// Infinite counter starting at `start`, ticking every `interval`.
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

    #[tokio::test(start_paused = true)]
    async fn switch_to_latest_cancelling_two_inners_scenario_from_spec_section_8() {
        // Inner generators [0,1,2,..], [4,5,6,..], and the finite [8,9,10,11];
        // the outer hands over a new inner every 15ms, each infinite inner
        // ticks every 10ms, so each of the first two produces exactly one
        // element before being switched out.
        let probe0 = CancelProbe::new();
        let probe1 = CancelProbe::new();

        let inner0 = probe0.wrap(Counter { next: 0, interval: Duration::from_millis(10) });
        let inner1 = probe1.wrap(Counter { next: 4, interval: Duration::from_millis(10) });
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
            if let Ok(Some(v)) = AsyncIterator::next(&mut switched).await {
                seen.push(v);
            }
        }
        assert_eq!(seen, vec![0, 4, 8, 9, 10, 11]);
        assert!(probe0.was_cancelled());
        assert!(probe1.was_cancelled());
    }

    #[tokio::test]
    async fn outer_finishing_does_not_end_the_stream_before_the_current_inner_does() {
        let inner = from_iter(vec![1, 2], None);
        let outer = from_iter(vec![Box::new(inner) as Box<dyn AsyncIterator<i32, ()>>], None);
        let mut switched: SwitchToLatest<i32, ()> = SwitchToLatest::new(outer);
        assert_eq!(AsyncIterator::next(&mut switched).await, Ok(Some(1)));
        assert_eq!(AsyncIterator::next(&mut switched).await, Ok(Some(2)));
        assert_eq!(AsyncIterator::next(&mut switched).await, Ok(None));
    }
}
