//! Zip state machine (C4): parallel pull from N upstreams, one combined
//! tuple per consumer demand, shorter-input / first-failure semantics.
//!
//! [`Zip2`] and [`ZipN`] carry their own state machine, built around the
//! four-state model (`Initial` / `Started` / `AwaitingDemand` /
//! `AwaitingResults`) described in the design notes: a driver spawns one
//! child task per upstream, each looping "park for permission, pull, report"
//! under a shared critical section. [`Zip3`] is deliberately *not* a third
//! copy of that machine; see its module doc for why composing two `Zip2`s
//! is enough.

mod n;
mod three;
mod two;

pub use n::ZipN;
pub use three::Zip3;
pub use two::Zip2;
