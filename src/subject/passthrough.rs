use std::convert::Infallible;
use std::sync::Arc;

use crate::cell::CriticalSection;
use crate::channel::BufferedChannel;
use crate::termination::Termination;

use super::{Registry, SubjectIterator};

/// Hot broadcast source with no replay: a consumer only sees values sent
/// *after* it registers (§4.3, passthrough: "no seed").
///
/// `E` defaults to [`Infallible`] for the non-throwing variant; supply a
/// concrete error type and call [`PassthroughSubject::send_terminal`] with
/// [`Termination::Failure`] for the throwing variant, which then propagates
/// to every live and future consumer.
pub struct PassthroughSubject<T, E = Infallible> {
    registry: Arc<CriticalSection<Registry<T, E>>>,
}

impl<T, E> Clone for PassthroughSubject<T, E> {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone() }
    }
}

impl<T, E> Default for PassthroughSubject<T, E> {
    fn default() -> Self {
        Self { registry: Arc::new(CriticalSection::new(Registry::default())) }
    }
}

impl<T: Clone + Send + 'static, E: Clone + Send + 'static> PassthroughSubject<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts `value` to every currently registered consumer. A no-op
    /// once the terminal has been latched.
    pub fn send(&self, value: T) {
        let snapshot = self.registry.with_critical_region(|r| {
            if r.terminal.is_some() {
                return None;
            }
            Some(r.consumers.values().cloned().collect::<Vec<_>>())
        });
        if let Some(consumers) = snapshot {
            for c in consumers {
                c.send(value.clone());
            }
        }
    }

    /// Latches the terminal and forwards it to every registered consumer.
    /// Subsequent registrants receive it immediately. Idempotent.
    pub fn send_terminal(&self, termination: Termination<E>) {
        let latched = self.registry.with_critical_region(|r| r.latch_terminal(termination));
        if let Some((term, consumers)) = latched {
            for c in consumers {
                c.send_terminal(term.clone());
            }
        }
    }

    /// Registers a new consumer, or (if the subject is already terminal)
    /// returns an iterator pre-seeded with the terminal and never
    /// registered.
    pub fn make_iterator(&self) -> SubjectIterator<T, E> {
        let registry = self.registry.clone();
        let (id, channel) = self.registry.with_critical_region(|r| {
            let channel = Arc::new(BufferedChannel::new());
            if let Some(t) = &r.terminal {
                channel.send_terminal(t.clone());
                return (None, channel);
            }
            let id = r.next_id;
            r.next_id += 1;
            r.consumers.insert(id, channel.clone());
            (Some(id), channel)
        });
        let unregister: Arc<dyn Fn(u64) + Send + Sync> = Arc::new(move |id| {
            registry.with_critical_region(|r| r.unregister(id));
        });
        SubjectIterator::new(channel, id, unregister)
    }
}
