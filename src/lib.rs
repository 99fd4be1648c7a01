//! Reactive asynchronous sequence combinators and hot broadcast primitives.
//!
//! This crate supplies the operators and multi-consumer publication points
//! that real applications need on top of a minimal pull-based async
//! iterator abstraction ([`AsyncIterator`]): time-coordinated combiners
//! ([`Zip2`]/[`Zip3`]/[`ZipN`], [`Merge`], [`SwitchToLatest`],
//! [`WithLatestFrom`]), broadcast points ([`PassthroughSubject`],
//! [`CurrentValueSubject`], [`ReplaySubject`], and the [`BufferedChannel`]
//! they are built on), and lifecycle/utility operators on [`AsyncIteratorExt`].
//!
//! ## How It Works
//!
//! ```text
//!  upstream iterators --> combiner/broadcast core --> per-consumer
//!                                                      `AsyncIterator`
//!                                                      driven by next()
//! ```
//!
//! Every stateful component in this crate follows the same discipline: all
//! mutable state lives behind a [`cell::CriticalSection`] (a plain
//! `std::sync::Mutex`, never held across an `.await`); a transition computes
//! an "output" describing which suspended callers to resume and which tasks
//! to abort, and that output is applied only after the lock has been
//! released.
//!
//! ## Example
//!
//! ```
//! use confluence::{from_iter, AsyncIterator, AsyncIteratorExt};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut doubled = from_iter(vec![1, 2, 3], None).scan(0, |_, v| v * 2);
//! assert_eq!(doubled.next().await, Ok(Some(2)));
//! assert_eq!(doubled.next().await, Ok(Some(4)));
//! # }
//! ```

mod cell;
mod channel;
mod error;
mod iter;
mod merge;
mod multicast;
mod operators;
mod spawn;
mod streamed;
mod subject;
#[cfg(test)]
mod testutil;
mod termination;
mod switch;
mod with_latest_from;
mod zip;

pub use error::CoreError;
pub use iter::{empty, fail, from_iter, just, timer, AsyncIterator, BoxIterator, Empty, Fail, FromIter, Just, Timer};
pub use merge::Merge;
pub use multicast::{Multicast, MulticastIterator};
pub use operators::AsyncIteratorExt;
pub use spawn::SpawnConfig;
pub use streamed::StreamedProperty;
pub use subject::{CurrentValueSubject, PassthroughSubject, ReplaySubject, SubjectIterator};
pub use switch::SwitchToLatest;
pub use termination::Termination;
pub use with_latest_from::WithLatestFrom;
pub use zip::{Zip2, Zip3, ZipN};

pub use channel::BufferedChannel;
