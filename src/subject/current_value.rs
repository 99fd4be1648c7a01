use std::convert::Infallible;
use std::sync::Arc;

use crate::cell::CriticalSection;
use crate::channel::BufferedChannel;
use crate::termination::Termination;

use super::{Registry, SubjectIterator};

struct CurrentState<T, E> {
    base: Registry<T, E>,
    current: T,
}

/// Hot broadcast source that always remembers its latest value. A new
/// consumer's first delivered element is the value most recently installed
/// by `send` (or the constructor value) at or before registration time,
/// invariant (G), "read-your-writes".
pub struct CurrentValueSubject<T, E = Infallible> {
    state: Arc<CriticalSection<CurrentState<T, E>>>,
}

impl<T, E> Clone for CurrentValueSubject<T, E> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<T: Clone + Send + 'static, E: Clone + Send + 'static> CurrentValueSubject<T, E> {
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(CriticalSection::new(CurrentState {
                base: Registry::default(),
                current: initial,
            })),
        }
    }

    /// Snapshot of the current value. Reads go through this cache rather
    /// than touching any consumer's channel.
    pub fn value(&self) -> T {
        self.state.with_critical_region(|s| s.current.clone())
    }

    /// Updates the current value and broadcasts it, atomically with the
    /// consumer snapshot so no consumer can register between the update and
    /// the broadcast and see a stale value. A no-op once terminal.
    pub fn send(&self, value: T) {
        let snapshot = self.state.with_critical_region(|s| {
            if s.base.terminal.is_some() {
                return None;
            }
            s.current = value.clone();
            Some(s.base.consumers.values().cloned().collect::<Vec<_>>())
        });
        if let Some(consumers) = snapshot {
            for c in consumers {
                c.send(value.clone());
            }
        }
    }

    pub fn send_terminal(&self, termination: Termination<E>) {
        let latched = self.state.with_critical_region(|s| s.base.latch_terminal(termination));
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
            // seed with the current value before this channel is ever
            // exposed to the caller, so there is no window where a fresh
            // consumer's next() could return anything else first
            channel.send(s.current.clone());
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
    async fn new_consumer_replays_the_constructor_value_first() {
        let subject = CurrentValueSubject::<i32>::new(1);
        let mut it = subject.make_iterator();
        assert_eq!(it.next().await, Ok(Some(1)));
    }

    #[tokio::test]
    async fn new_consumer_replays_the_latest_sent_value() {
        let subject = CurrentValueSubject::<i32>::new(1);
        subject.send(2);
        subject.send(3);
        let mut it = subject.make_iterator();
        assert_eq!(it.next().await, Ok(Some(3)));
        assert_eq!(subject.value(), 3);
    }

    #[tokio::test]
    async fn merge_scenario_from_spec_section_8() {
        // "Merge of subjects": A=CurrentValue(1). After consuming the
        // initial 1, a consumer keeps receiving subsequent sends in order.
        let a = CurrentValueSubject::<i32>::new(1);
        let mut it = a.make_iterator();
        assert_eq!(it.next().await, Ok(Some(1)));
        a.send(6);
        assert_eq!(it.next().await, Ok(Some(6)));
    }
}
