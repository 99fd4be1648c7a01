use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::channel::BufferedChannel;
use crate::iter::AsyncIterator;

/// Consumer-side handle over a subject: delegates `next()` to the
/// underlying per-consumer channel, and unregisters from the subject
/// exactly once when dropped (or never, if it was handed a pre-terminated
/// channel that never registered in the first place).
pub struct SubjectIterator<T, E> {
    channel: Arc<BufferedChannel<T, E>>,
    id: Option<u64>,
    unregister: Arc<dyn Fn(u64) + Send + Sync>,
}

impl<T, E> SubjectIterator<T, E> {
    pub(crate) fn new(
        channel: Arc<BufferedChannel<T, E>>,
        id: Option<u64>,
        unregister: Arc<dyn Fn(u64) + Send + Sync>,
    ) -> Self {
        Self { channel, id, unregister }
    }
}

impl<T, E: Clone> SubjectIterator<T, E> {
    /// Used by [`crate::multicast`] to skip pulling the shared upstream when
    /// this consumer already has something of its own to deliver.
    pub(crate) fn has_buffered_elements(&self) -> bool {
        self.channel.has_buffered_elements()
    }
}

impl<T: Send + 'static, E: Send + 'static> AsyncIterator<T, E> for SubjectIterator<T, E> {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<T>, E>> + Send + '_>> {
        let channel = self.channel.clone();
        Box::pin(async move { channel.next().await })
    }
}

impl<T, E> Drop for SubjectIterator<T, E> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            (self.unregister)(id);
        }
    }
}
