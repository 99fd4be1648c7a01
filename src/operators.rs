//! Plain value-level operators (`AsyncIteratorExt`): thin adapters layered
//! on top of the core combinators and broadcast primitives. None of these
//! need their own state machine: each is a direct, single-purpose wrapper
//! around [`AsyncIterator::next`].

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use crate::iter::{AsyncIterator, BoxIterator};
use crate::multicast::Multicast;
use crate::subject::PassthroughSubject;
use crate::switch::SwitchToLatest;
use crate::with_latest_from::WithLatestFrom;

/// Optional callbacks for [`AsyncIteratorExt::handle_events`]. Every field
/// defaults to `None`; only the hooks a caller installs run.
#[derive(Default)]
pub struct EventHandlers<T, E> {
    pub start: Option<Box<dyn FnMut() + Send>>,
    pub element: Option<Box<dyn FnMut(&T) + Send>>,
    pub cancel: Option<Box<dyn FnMut() + Send>>,
    pub finish: Option<Box<dyn FnMut(Option<&E>) + Send>>,
}

/// Extension trait installing every plain operator on top of any
/// [`AsyncIterator`]. Stateful combinators (`Zip*`, `Merge`) are constructed
/// directly rather than through this trait, since they take more than one
/// upstream.
pub trait AsyncIteratorExt<T, E>: AsyncIterator<T, E> + Sized {
    /// Drives the iterator to completion, collecting every element.
    async fn collect(mut self) -> Result<Vec<T>, E>
    where
        Self: 'static,
    {
        let mut out = Vec::new();
        loop {
            match self.next().await? {
                Some(v) => out.push(v),
                None => return Ok(out),
            }
        }
    }

    /// Drives the iterator to completion, calling `setter` synchronously for
    /// every element. `setter` is total: it is never skipped, never spawned
    /// onto a task, and a panic inside it propagates exactly as any other
    /// panic in synchronous code would.
    async fn assign(mut self, mut setter: impl FnMut(T) + Send) -> Result<(), E>
    where
        Self: 'static,
    {
        loop {
            match self.next().await? {
                Some(v) => setter(v),
                None => return Ok(()),
            }
        }
    }

    /// Installs lifecycle callbacks: `start` before the first pull, `element`
    /// after every delivered value, `finish` when the iterator reaches
    /// `Ok(None)`/`Err`, `cancel` if it is instead dropped beforehand.
    fn handle_events(self, handlers: EventHandlers<T, E>) -> HandleEvents<Self, T, E>
    where
        Self: Sized,
    {
        HandleEvents { inner: self, handlers, started: false, finished: false }
    }

    /// Stateful map: threads an accumulator `Acc` through every element,
    /// producing one `Out` per input element.
    fn scan<Acc, Out, F>(self, init: Acc, f: F) -> Scan<Self, Acc, F>
    where
        Self: Sized,
        F: FnMut(&mut Acc, T) -> Out + Send,
    {
        Scan { inner: self, acc: init, f }
    }

    /// Yields `value` before the first element of the wrapped iterator.
    fn prepend(self, value: T) -> Prepend<Self, T>
    where
        Self: Sized,
    {
        Prepend { value: Some(value), inner: self }
    }

    /// Turns a fallible iterator into an infallible one of `Result<T, E>`:
    /// the single `Err(e)` this iterator ever produces is instead delivered
    /// as one final `Ok(Some(Err(e)))` element.
    fn map_to_result(self) -> MapToResult<Self, T, E>
    where
        Self: Sized,
    {
        MapToResult { inner: self, _marker: PhantomData }
    }

    /// Type-erases this iterator behind [`BoxIterator`].
    fn erase_to_any(self) -> BoxIterator<T, E>
    where
        Self: 'static,
    {
        BoxIterator::new(self)
    }

    /// Combines each element with the most recently observed value of
    /// `other`, discarding elements produced before `other`'s first value.
    fn with_latest_from<O, OI>(self, other: OI) -> WithLatestFrom<Self, O, T, E>
    where
        Self: Send + 'static,
        OI: AsyncIterator<O, E> + 'static,
        O: Clone + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        WithLatestFrom::new(self, other)
    }

    /// Flattens a sequence of sequences, always following the most recently
    /// produced inner.
    fn switch_to_latest<Out>(self) -> SwitchToLatest<Out, E>
    where
        Self: AsyncIterator<Box<dyn AsyncIterator<Out, E>>, E> + 'static,
        Out: Send + 'static,
        E: Clone + Send + 'static,
    {
        SwitchToLatest::new(self)
    }

    /// `map(f).switch_to_latest()`: maps each element to an inner sequence
    /// and follows only the most recently produced one.
    fn flat_map_latest<Out, F>(self, f: F) -> SwitchToLatest<Out, E>
    where
        Self: 'static,
        F: FnMut(T) -> Box<dyn AsyncIterator<Out, E>> + Send + 'static,
        T: Send + 'static,
        Out: Send + 'static,
        E: Clone + Send + 'static,
    {
        SwitchToLatest::new(FlatMapInner { inner: self, f })
    }

    /// Shares a single pull against `subject`. Consumers must call
    /// [`Multicast::connect`] explicitly before any registration proceeds.
    fn multicast(self, subject: PassthroughSubject<T, E>) -> Multicast<T, E>
    where
        Self: 'static,
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        Multicast::new(self, subject, false)
    }

    /// `multicast` into a fresh passthrough subject, autoconnected.
    fn share(self) -> Multicast<T, E>
    where
        Self: 'static,
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        Multicast::share(self)
    }
}

impl<T, E, I> AsyncIteratorExt<T, E> for I where I: AsyncIterator<T, E> {}

pub struct HandleEvents<I, T, E> {
    inner: I,
    handlers: EventHandlers<T, E>,
    started: bool,
    finished: bool,
}

impl<I, T, E> AsyncIterator<T, E> for HandleEvents<I, T, E>
where
    I: AsyncIterator<T, E>,
    T: Send,
    E: Send,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        Box::pin(async move {
            if !self.started {
                self.started = true;
                if let Some(start) = &mut self.handlers.start {
                    start();
                }
            }
            let result = self.inner.next().await;
            match &result {
                Ok(Some(v)) => {
                    if let Some(element) = &mut self.handlers.element {
                        element(v);
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    if let Some(finish) = &mut self.handlers.finish {
                        finish(None);
                    }
                }
                Err(e) => {
                    self.finished = true;
                    if let Some(finish) = &mut self.handlers.finish {
                        finish(Some(e));
                    }
                }
            }
            result
        })
    }
}

impl<I, T, E> Drop for HandleEvents<I, T, E> {
    fn drop(&mut self) {
        if self.started && !self.finished {
            if let Some(cancel) = &mut self.handlers.cancel {
                cancel();
            }
        }
    }
}

pub struct Scan<I, Acc, F> {
    inner: I,
    acc: Acc,
    f: F,
}

impl<I, T, E, Acc, Out, F> AsyncIterator<Out, E> for Scan<I, Acc, F>
where
    I: AsyncIterator<T, E>,
    F: FnMut(&mut Acc, T) -> Out + Send,
    Acc: Send,
    Out: Send,
    E: Send,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Out>, E>> + Send + '_>> {
        Box::pin(async move {
            match self.inner.next().await? {
                Some(v) => Ok(Some((self.f)(&mut self.acc, v))),
                None => Ok(None),
            }
        })
    }
}

pub struct Prepend<I, T> {
    value: Option<T>,
    inner: I,
}

impl<I, T, E> AsyncIterator<T, E> for Prepend<I, T>
where
    I: AsyncIterator<T, E>,
    T: Send,
    E: Send,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        if let Some(v) = self.value.take() {
            return Box::pin(async move { Ok(Some(v)) });
        }
        self.inner.next()
    }
}

pub struct MapToResult<I, T, E> {
    inner: I,
    _marker: PhantomData<(T, E)>,
}

impl<I, T, E> AsyncIterator<Result<T, E>, std::convert::Infallible> for MapToResult<I, T, E>
where
    I: AsyncIterator<T, E>,
    T: Send,
    E: Send,
{
    fn next(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Result<T, E>>, std::convert::Infallible>> + Send + '_>> {
        Box::pin(async move {
            match self.inner.next().await {
                Ok(Some(v)) => Ok(Some(Ok(v))),
                Ok(None) => Ok(None),
                Err(e) => Ok(Some(Err(e))),
            }
        })
    }
}

struct FlatMapInner<I, F> {
    inner: I,
    f: F,
}

impl<I, T, Out, E, F> AsyncIterator<Box<dyn AsyncIterator<Out, E>>, E> for FlatMapInner<I, F>
where
    I: AsyncIterator<T, E>,
    F: FnMut(T) -> Box<dyn AsyncIterator<Out, E>> + Send,
    Out: Send,
    E: Send,
{
    fn next(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Box<dyn AsyncIterator<Out, E>>>, E>> + Send + '_>> {
        Box::pin(async move {
            match self.inner.next().await? {
                Some(v) => Ok(Some((self.f)(v))),
                None => Ok(None),
            }
        })
    }
}
