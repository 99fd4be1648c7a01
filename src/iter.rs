//! Async iterator trait and small ancillaries (C9).
//!
//! [`AsyncIterator`] is the minimum contract every component in this crate
//! consumes and exposes: a handle whose `next()` produces, in order,
//! `Ok(Some(t))` elements, then ends with `Ok(None)` (normal completion) or
//! `Err(e)` (failure), and thereafter only yields `Ok(None)`.
//!
//! The trait returns a boxed future rather than an associated type so that
//! it stays object-safe: [`BoxIterator`] relies on this to type-erase any
//! concrete iterator behind a trait object, the same way the combinators in
//! this crate erase their own driver-task plumbing behind a single
//! `next()` entry point.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Minimum contract all components in this crate consume and expose.
///
/// Implementations must be safe against the caller dropping the future
/// returned by `next()` mid-poll (cancellation): they must either have
/// delivered a value already, or leave no dangling registration behind.
pub trait AsyncIterator<T, E>: Send {
    /// Produces the next element, end-of-stream, or a failure. May suspend.
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>>;
}

/// An opaque wrapper capturing an iterator and exposing `next()` without
/// exposing its concrete type. Operators are monomorphized until this is
/// called (via `erase_to_any()`).
pub struct BoxIterator<T, E> {
    inner: Box<dyn AsyncIterator<T, E>>,
}

impl<T, E> BoxIterator<T, E> {
    pub fn new<I>(iter: I) -> Self
    where
        I: AsyncIterator<T, E> + 'static,
    {
        Self { inner: Box::new(iter) }
    }
}

impl<T, E> AsyncIterator<T, E> for BoxIterator<T, E> {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        self.inner.next()
    }
}

/// Iterator that immediately and forever yields `Ok(None)`.
pub struct Empty;

impl<T: Send, E: Send> AsyncIterator<T, E> for Empty {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        Box::pin(async { Ok(None) })
    }
}

pub fn empty<T, E>() -> Empty {
    Empty
}

/// Iterator that yields a single value, then ends.
pub struct Just<T> {
    value: Option<T>,
}

impl<T: Send, E: Send> AsyncIterator<T, E> for Just<T> {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        Box::pin(async { Ok(self.value.take()) })
    }
}

pub fn just<T>(value: T) -> Just<T> {
    Just { value: Some(value) }
}

/// Iterator that fails once with `err`, then ends.
pub struct Fail<E> {
    err: Option<E>,
}

impl<T: Send, E: Send> AsyncIterator<T, E> for Fail<E> {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        Box::pin(async { match self.err.take() {
            Some(e) => Err(e),
            None => Ok(None),
        } })
    }
}

pub fn fail<E>(err: E) -> Fail<E> {
    Fail { err: Some(err) }
}

/// Iterator over a finite collection, optionally paced with a fixed sleep
/// between elements.
pub struct FromIter<T> {
    items: VecDeque<T>,
    interval: Option<Duration>,
}

impl<T: Send, E: Send> AsyncIterator<T, E> for FromIter<T> {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        Box::pin(async {
            if let Some(interval) = self.interval {
                tokio::time::sleep(interval).await;
            }
            Ok(self.items.pop_front())
        })
    }
}

pub fn from_iter<T, I>(iter: I, interval: Option<Duration>) -> FromIter<T>
where
    I: IntoIterator<Item = T>,
{
    FromIter {
        items: iter.into_iter().collect(),
        interval,
    }
}

/// Infinite iterator: each `next()` sleeps for `interval` then yields
/// `tokio::time::Instant::now()`. Ends only through cancellation (the
/// caller stops polling / drops the iterator).
pub struct Timer {
    interval: Duration,
}

impl<E: Send> AsyncIterator<tokio::time::Instant, E> for Timer {
    fn next(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<tokio::time::Instant>, E>> + Send + '_>> {
        Box::pin(async {
            tokio::time::sleep(self.interval).await;
            Ok(Some(tokio::time::Instant::now()))
        })
    }
}

pub fn timer(interval: Duration) -> Timer {
    Timer { interval }
}
