//! Merge state machine (C5): parallel pull from N upstreams, interleaved
//! delivery in whatever order their pulls complete, terminal once every
//! upstream has finished (or immediately on the first failure).
//!
//! Unlike [`crate::zip`], Merge needs no bespoke state enum: the interleaving
//! fabric *is* a [`BufferedChannel`], and the only shared state is a
//! finished-upstream counter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cell::CriticalSection;
use crate::channel::BufferedChannel;
use crate::iter::AsyncIterator;
use crate::spawn::SpawnConfig;
use crate::termination::Termination;

struct Counter {
    finished: usize,
    total: usize,
}

struct TaskSlots {
    handles: std::sync::Mutex<Vec<Option<tokio::task::JoinHandle<()>>>>,
}

impl TaskSlots {
    fn new(n: usize) -> Self {
        Self { handles: std::sync::Mutex::new((0..n).map(|_| None).collect()) }
    }

    fn install(&self, i: usize, handle: tokio::task::JoinHandle<()>) {
        self.handles.lock().unwrap_or_else(|p| p.into_inner())[i] = Some(handle);
    }

    /// Aborts every child task except `origin`, used when one upstream
    /// fails and the rest must stop pulling rather than run to completion
    /// uselessly against an already-terminal channel.
    fn abort_all_except(&self, origin: usize) {
        let mut guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        for (i, slot) in guard.iter_mut().enumerate() {
            if i != origin {
                if let Some(h) = slot.take() {
                    h.abort();
                }
            }
        }
    }

    fn abort_all(&self) {
        let mut guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        for slot in guard.iter_mut() {
            if let Some(h) = slot.take() {
                h.abort();
            }
        }
    }
}

/// Merges N async iterators of the same element/error type into one,
/// delivering elements in whatever order the upstreams produce them.
pub struct Merge<T, E> {
    channel: Arc<BufferedChannel<T, E>>,
    counter: Arc<CriticalSection<Counter>>,
    tasks: Arc<TaskSlots>,
    started: bool,
    bases: Vec<Option<Box<dyn AsyncIterator<T, E>>>>,
    config: Option<SpawnConfig>,
}

impl<T, E> Merge<T, E>
where
    T: Send + 'static,
    E: Clone + Send + 'static,
{
    /// # Panics
    ///
    /// Panics if `bases` is empty.
    pub fn new(bases: Vec<Box<dyn AsyncIterator<T, E>>>) -> Self {
        Self::with_config(bases, None)
    }

    pub fn with_config(bases: Vec<Box<dyn AsyncIterator<T, E>>>, config: Option<SpawnConfig>) -> Self {
        assert!(!bases.is_empty(), "Merge requires at least one upstream");
        let total = bases.len();
        Self {
            channel: Arc::new(BufferedChannel::new()),
            counter: Arc::new(CriticalSection::new(Counter { finished: 0, total })),
            tasks: Arc::new(TaskSlots::new(total)),
            started: false,
            bases: bases.into_iter().map(Some).collect(),
            config,
        }
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        for (i, slot) in self.bases.iter_mut().enumerate() {
            let mut base = slot.take().expect("each base taken exactly once");
            let channel = self.channel.clone();
            let counter = self.counter.clone();
            let tasks = self.tasks.clone();
            let handle = SpawnConfig::spawn(self.config.as_ref(), async move {
                loop {
                    match base.next().await {
                        Ok(Some(v)) => channel.send(v),
                        Ok(None) => {
                            let all_done = counter.with_critical_region(|c| {
                                c.finished += 1;
                                c.finished == c.total
                            });
                            if all_done {
                                channel.send_terminal(Termination::Finished);
                            }
                            break;
                        }
                        Err(e) => {
                            channel.send_terminal(Termination::Failure(e));
                            tasks.abort_all_except(i);
                            break;
                        }
                    }
                }
            });
            tasks.install(i, handle);
        }
    }
}

impl<T, E> AsyncIterator<T, E> for Merge<T, E>
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

impl<T, E> Drop for Merge<T, E> {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}
