//! Thin ergonomic shell over [`CurrentValueSubject`] (§6): wraps a plain
//! property so that assignments become an observable sequence and reads go
//! through the subject's cached value, without introducing any contract the
//! subject itself doesn't already have.

use std::convert::Infallible;

use crate::subject::{CurrentValueSubject, SubjectIterator};

/// A property backed by a [`CurrentValueSubject`]. `set` both updates the
/// cached value and broadcasts it to every registered observer; `get` reads
/// the cache directly, never touching a consumer channel.
pub struct StreamedProperty<T, E = Infallible> {
    subject: CurrentValueSubject<T, E>,
}

impl<T: Clone + Send + 'static, E: Clone + Send + 'static> StreamedProperty<T, E> {
    pub fn new(initial: T) -> Self {
        Self { subject: CurrentValueSubject::new(initial) }
    }

    /// Current cached value (read-your-writes, invariant (G)).
    pub fn get(&self) -> T {
        self.subject.value()
    }

    /// Updates the cached value and broadcasts it to every observer.
    pub fn set(&self, value: T) {
        self.subject.send(value);
    }

    /// An observable sequence of this property's assignments, seeded with
    /// the value current at registration time.
    pub fn observe(&self) -> SubjectIterator<T, E> {
        self.subject.make_iterator()
    }

    /// The underlying subject, for callers that want to drive it directly
    /// (e.g. latch a terminal with [`CurrentValueSubject::send_terminal`]).
    pub fn subject(&self) -> &CurrentValueSubject<T, E> {
        &self.subject
    }
}

impl<T: Clone + Send + 'static, E: Clone + Send + 'static> Clone for StreamedProperty<T, E> {
    fn clone(&self) -> Self {
        Self { subject: self.subject.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::AsyncIterator;

    #[test]
    fn get_reflects_the_constructor_value_before_any_set() {
        let prop = StreamedProperty::<i32>::new(7);
        assert_eq!(prop.get(), 7);
    }

    #[test]
    fn set_updates_the_cached_read() {
        let prop = StreamedProperty::<i32>::new(1);
        prop.set(2);
        assert_eq!(prop.get(), 2);
    }

    #[tokio::test]
    async fn observe_replays_the_latest_value_to_a_new_consumer() {
        let prop = StreamedProperty::<i32>::new(1);
        prop.set(2);
        let mut it = prop.observe();
        assert_eq!(it.next().await, Ok(Some(2)));
        prop.set(3);
        assert_eq!(it.next().await, Ok(Some(3)));
    }

    #[tokio::test]
    async fn assign_operator_drives_a_streamed_property_from_an_iterator() {
        use crate::iter::from_iter;
        use crate::operators::AsyncIteratorExt;

        let prop = StreamedProperty::<i32>::new(0);
        let p2 = prop.clone();
        let it: crate::iter::FromIter<i32> = from_iter(vec![1, 2, 3], None);
        let result: Result<(), ()> = it.assign(move |v| p2.set(v)).await;
        assert_eq!(result, Ok(()));
        assert_eq!(prop.get(), 3);
    }
}
