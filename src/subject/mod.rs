//! Subjects (C3): hot, multi-consumer broadcast built atop [`crate::channel::BufferedChannel`].
//!
//! Three flavors, each generic over an error type `E` that defaults to
//! [`std::convert::Infallible`] for the common non-throwing case:
//!
//! - [`PassthroughSubject`]: no replay, consumers only see values sent
//!   after they register.
//! - [`CurrentValueSubject`]: always remembers the latest value and
//!   replays it to every new consumer.
//! - [`ReplaySubject`]: remembers the last `buffer_size` values and
//!   replays them, in order, to every new consumer.
//!
//! All three share the same consumer registry shape ([`Registry`]) and the
//! same consumer-side iterator ([`SubjectIterator`]); what differs is what
//! extra state they seed a freshly registered consumer's channel with.

use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::BufferedChannel;
use crate::termination::Termination;

mod consumer;
mod current_value;
mod passthrough;
mod replay;

pub use consumer::SubjectIterator;
pub use current_value::CurrentValueSubject;
pub use passthrough::PassthroughSubject;
pub use replay::ReplaySubject;

/// Consumer map shared by every subject flavor: one channel per live
/// consumer, keyed by a monotonically increasing id, plus the latched
/// terminal.
pub(crate) struct Registry<T, E> {
    pub(crate) consumers: HashMap<u64, Arc<BufferedChannel<T, E>>>,
    pub(crate) next_id: u64,
    pub(crate) terminal: Option<Termination<E>>,
}

impl<T, E> Default for Registry<T, E> {
    fn default() -> Self {
        Self {
            consumers: HashMap::new(),
            next_id: 0,
            terminal: None,
        }
    }
}

impl<T: Clone, E: Clone> Registry<T, E> {
    /// Latches the terminal and drains the consumer map, returning the
    /// terminal and the channels it must be forwarded to. `None` if a
    /// terminal was already latched (send_terminal is then a no-op).
    pub(crate) fn latch_terminal(
        &mut self,
        termination: Termination<E>,
    ) -> Option<(Termination<E>, Vec<Arc<BufferedChannel<T, E>>>)> {
        if self.terminal.is_some() {
            return None;
        }
        self.terminal = Some(termination.clone());
        Some((termination, self.consumers.drain().map(|(_, c)| c).collect()))
    }

    pub(crate) fn unregister(&mut self, id: u64) {
        self.consumers.remove(&id);
    }
}
