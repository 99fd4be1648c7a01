//! Runtime configuration (C12): the single optional priority hint threaded
//! through every driver-task spawn site.

use std::future::Future;

use tokio::task::JoinHandle;

/// Carries the one allowed task-name hint. Absent by default, in which case
/// every spawn site still just spawns the task, unnamed.
///
/// `tokio::task::Builder::name` would be the natural home for this hint, but
/// it sits behind `tokio_unstable` plus the `tracing` feature, neither of
/// which this crate turns on; the hint is instead attached as a `tracing`
/// span around the spawned future, which needs no unstable cfg.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnConfig {
    pub name: Option<&'static str>,
}

impl SpawnConfig {
    pub fn named(name: &'static str) -> Self {
        Self { name: Some(name) }
    }

    /// Spawns `fut` via `tokio::spawn`, wrapped in a named `tracing` span
    /// when a name is configured.
    pub(crate) fn spawn<F>(config: Option<&SpawnConfig>, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match config.and_then(|c| c.name) {
            Some(name) => {
                let span = tracing::info_span!("driver_task", name);
                tokio::spawn(tracing::Instrument::instrument(fut, span))
            }
            None => tokio::spawn(fut),
        }
    }
}
