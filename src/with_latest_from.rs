//! WithLatestFrom (C7): sample-and-hold. Each base element is paired with
//! the most recently observed value of an "other" iterator; base elements
//! that arrive before the first other element is available are discarded
//! rather than delivered or counted against the consumer's demand.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cell::CriticalSection;
use crate::iter::AsyncIterator;
use crate::spawn::SpawnConfig;

enum OtherState<O, E> {
    Empty,
    Available(O),
    Failed(E),
}

/// Combines a base iterator with the latest value of an "other" iterator,
/// discarding base elements produced before `other`'s first value.
pub struct WithLatestFrom<B, O, T, E> {
    base: B,
    other: Option<Box<dyn AsyncIterator<O, E>>>,
    state: Arc<CriticalSection<OtherState<O, E>>>,
    started: bool,
    done: bool,
    other_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    config: Option<SpawnConfig>,
    _marker: std::marker::PhantomData<T>,
}

impl<B, O, T, E> WithLatestFrom<B, O, T, E>
where
    B: AsyncIterator<T, E> + Send,
    O: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<OI>(base: B, other: OI) -> Self
    where
        OI: AsyncIterator<O, E> + 'static,
    {
        Self::with_config(base, other, None)
    }

    pub fn with_config<OI>(base: B, other: OI, config: Option<SpawnConfig>) -> Self
    where
        OI: AsyncIterator<O, E> + 'static,
    {
        Self {
            base,
            other: Some(Box::new(other)),
            state: Arc::new(CriticalSection::new(OtherState::Empty)),
            started: false,
            done: false,
            other_task: std::sync::Mutex::new(None),
            config,
            _marker: std::marker::PhantomData,
        }
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let mut other = self.other.take().expect("other taken exactly once");
        let state = self.state.clone();
        let handle = SpawnConfig::spawn(self.config.as_ref(), async move {
            loop {
                match other.next().await {
                    Ok(Some(v)) => state.with_critical_region(|s| *s = OtherState::Available(v)),
                    Ok(None) => break,
                    Err(e) => {
                        state.with_critical_region(|s| *s = OtherState::Failed(e));
                        break;
                    }
                }
            }
        });
        *self.other_task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }
}

impl<B, O, T, E> AsyncIterator<(T, O), E> for WithLatestFrom<B, O, T, E>
where
    B: AsyncIterator<T, E> + Send,
    O: Clone + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<(T, O)>, E>> + Send + '_>> {
        self.ensure_started();
        Box::pin(async move {
            if self.done {
                return Ok(None);
            }
            loop {
                match self.base.next().await {
                    Ok(Some(t)) => {
                        let sampled = self.state.with_critical_region(|s| match s {
                            OtherState::Available(latest) => Some(Ok(latest.clone())),
                            OtherState::Failed(_) => {
                                let OtherState::Failed(e) = std::mem::replace(s, OtherState::Empty) else {
                                    unreachable!()
                                };
                                Some(Err(e))
                            }
                            OtherState::Empty => None,
                        });
                        match sampled {
                            Some(Ok(o)) => return Ok(Some((t, o))),
                            Some(Err(e)) => {
                                self.done = true;
                                return Err(e);
                            }
                            // other hasn't produced anything yet: this base
                            // element is discarded, keep pulling.
                            None => continue,
                        }
                    }
                    Ok(None) => {
                        self.done = true;
                        return Ok(None);
                    }
                    Err(e) => {
                        self.done = true;
                        return Err(e);
                    }
                }
            }
        })
    }
}

impl<B, O, T, E> Drop for WithLatestFrom<B, O, T, E> {
    fn drop(&mut self) {
        if let Some(h) = self.other_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            h.abort();
        }
    }
}
