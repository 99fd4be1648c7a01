use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

use crate::cell::CriticalSection;
use crate::channel::BufferedChannel;
use crate::error::CoreError;
use crate::termination::Termination;

use super::{Registry, SubjectIterator};

struct ReplayState<T, E> {
    base: Registry<T, E>,
    ring: VecDeque<T>,
    capacity: usize,
}

/// Hot broadcast source that remembers the last `buffer_size` values and
/// replays them, in order, to every newly registered consumer (invariant
/// (F), "replay monotonicity").
///
/// `buffer_size` must be at least 1: per the design notes, a capacity of
/// zero is a configuration error rather than a silent "never replays".
pub struct ReplaySubject<T, E = Infallible> {
    state: Arc<CriticalSection<ReplayState<T, E>>>,
}

impl<T, E> Clone for ReplaySubject<T, E> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<T: Clone + Send + 'static, E: Clone + Send + 'static> ReplaySubject<T, E> {
    /// # Panics
    ///
    /// Panics if `buffer_size` is 0.
    pub fn new(buffer_size: usize) -> Self {
        assert!(buffer_size >= 1, "{}", CoreError::ZeroReplayCapacity);
        Self {
            state: Arc::new(CriticalSection::new(ReplayState {
                base: Registry::default(),
                ring: VecDeque::with_capacity(buffer_size),
                capacity: buffer_size,
            })),
        }
    }

    /// Pushes `value` into the ring (dropping the oldest once full) and
    /// broadcasts it. A no-op once terminal.
    pub fn send(&self, value: T) {
        let snapshot = self.state.with_critical_region(|s| {
            if s.base.terminal.is_some() {
                return None;
            }
            if s.ring.len() == s.capacity {
                s.ring.pop_front();
            }
            s.ring.push_back(value.clone());
            Some(s.base.consumers.values().cloned().collect::<Vec<_>>())
        });
        if let Some(consumers) = snapshot {
            for c in consumers {
                c.send(value.clone());
            }
        }
    }

    /// Latches the terminal, forwards it to every registered consumer, and
    /// clears the ring (replaying after termination is never meaningful).
    pub fn send_terminal(&self, termination: Termination<E>) {
        let latched = self.state.with_critical_region(|s| {
            let out = s.base.latch_terminal(termination);
            if out.is_some() {
                s.ring.clear();
                s.capacity = 0;
            }
            out
        });
        if let Some((term, consumers)) = latched {
            for c in consumers {
                c.send_terminal(term.clone());
            }
        }
    }

    pub fn make_iterator(&self) -> SubjectIterator<T, E> {
        let state = self.state.clone();
        let (id, channel) = self.state.with_critical_region(|s| {
            let channel = Arc::new(BufferedChannel::new());
            if let Some(t) = &s.base.terminal {
                channel.send_terminal(t.clone());
                return (None, channel);
            }
            for item in s.ring.iter() {
                channel.send(item.clone());
            }
            let id = s.base.next_id;
            s.base.next_id += 1;
            s.base.consumers.insert(id, channel.clone());
            (Some(id), channel)
        });
        let unregister: Arc<dyn Fn(u64) + Send + Sync> = Arc::new(move |id| {
            state.with_critical_region(|s| s.base.unregister(id));
        });
        SubjectIterator::new(channel, id, unregister)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::AsyncIterator;

    #[tokio::test]
    #[should_panic]
    fn rejects_zero_capacity() {
        let _ = ReplaySubject::<i32>::new(0);
    }

    #[tokio::test]
    async fn replay_with_buffer_3_scenario_from_spec_section_8() {
        let subject = ReplaySubject::<i32>::new(3);
        for v in [1, 2, 3, 4, 5, 6] {
            subject.send(v);
        }
        let mut it = subject.make_iterator();
        assert_eq!(it.next().await, Ok(Some(4)));
        assert_eq!(it.next().await, Ok(Some(5)));
        assert_eq!(it.next().await, Ok(Some(6)));
    }

    #[tokio::test]
    async fn replays_fewer_than_capacity_when_fewer_were_sent() {
        let subject = ReplaySubject::<i32>::new(5);
        subject.send(1);
        subject.send(2);
        let mut it = subject.make_iterator();
        assert_eq!(it.next().await, Ok(Some(1)));
        assert_eq!(it.next().await, Ok(Some(2)));
    }

    #[tokio::test]
    async fn terminal_clears_the_ring_so_later_registrants_only_see_the_terminal() {
        let subject = ReplaySubject::<i32>::new(3);
        subject.send(1);
        subject.send_terminal(Termination::Finished);
        let mut it = subject.make_iterator();
        assert_eq!(it.next().await, Ok(None));
    }
}
