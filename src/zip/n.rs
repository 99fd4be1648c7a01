use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cell::CriticalSection;
use crate::iter::AsyncIterator;
use crate::spawn::SpawnConfig;

type Demand<T, E> = oneshot::Sender<Result<Option<Vec<T>>, E>>;
type Permission = oneshot::Sender<()>;

enum State<T, E> {
    Initial,
    Started,
    AwaitingDemand {
        parked: HashMap<usize, Permission>,
    },
    AwaitingResults {
        results: HashMap<usize, T>,
        parked: HashMap<usize, Permission>,
        demand: Option<Demand<T, E>>,
    },
    Finished,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Abort {
    None,
    Other(usize),
    All,
}

struct Outputs<T, E> {
    resume: Vec<Permission>,
    resolve: Option<(Demand<T, E>, Result<Option<Vec<T>>, E>)>,
    abort: Abort,
}

impl<T, E> Default for Outputs<T, E> {
    fn default() -> Self {
        Self { resume: Vec::new(), resolve: None, abort: Abort::None }
    }
}

impl<T, E> Outputs<T, E> {
    fn apply(self, tasks: &TaskSlots) {
        for tx in self.resume {
            let _ = tx.send(());
        }
        if let Some((tx, result)) = self.resolve {
            let _ = tx.send(result);
        }
        match self.abort {
            Abort::None => {}
            Abort::Other(origin) => tasks.abort_all_except(origin),
            Abort::All => tasks.abort_all(),
        }
    }
}

struct TaskSlots {
    handles: std::sync::Mutex<Vec<Option<JoinHandle<()>>>>,
}

impl TaskSlots {
    fn new(n: usize) -> Self {
        Self { handles: std::sync::Mutex::new((0..n).map(|_| None).collect()) }
    }

    fn install(&self, i: usize, handle: JoinHandle<()>) {
        self.handles.lock().unwrap_or_else(|p| p.into_inner())[i] = Some(handle);
    }

    fn abort_all_except(&self, origin: usize) {
        let mut guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        for (i, slot) in guard.iter_mut().enumerate() {
            if i != origin {
                if let Some(h) = slot.take() {
                    h.abort();
                }
            }
        }
    }

    fn abort_all(&self) {
        let mut guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        for slot in guard.iter_mut() {
            if let Some(h) = slot.take() {
                h.abort();
            }
        }
    }
}

enum Decision {
    Proceed,
    Stop,
    Park(oneshot::Receiver<()>),
}

fn request_permission<T, E>(state: &mut State<T, E>, i: usize, n: usize) -> Decision {
    match state {
        State::Finished => Decision::Stop,
        State::Initial => unreachable!("child tasks only run after task_started"),
        State::Started => {
            let (tx, rx) = oneshot::channel();
            let mut parked = HashMap::with_capacity(n);
            parked.insert(i, tx);
            *state = State::AwaitingDemand { parked };
            Decision::Park(rx)
        }
        State::AwaitingDemand { parked } => {
            let (tx, rx) = oneshot::channel();
            if parked.insert(i, tx).is_some() {
                tracing::error!("zip: base {i} requested permission twice without being resumed");
            }
            Decision::Park(rx)
        }
        State::AwaitingResults { results, parked, .. } => {
            if results.contains_key(&i) {
                let (tx, rx) = oneshot::channel();
                parked.insert(i, tx);
                Decision::Park(rx)
            } else {
                Decision::Proceed
            }
        }
    }
}

fn new_demand<T, E>(state: &mut State<T, E>, n: usize, demand: Demand<T, E>) -> Outputs<T, E> {
    match std::mem::replace(state, State::Finished) {
        State::Initial | State::Started => {
            *state = State::AwaitingResults { results: HashMap::with_capacity(n), parked: HashMap::new(), demand: Some(demand) };
            Outputs::default()
        }
        State::AwaitingDemand { parked } => {
            *state = State::AwaitingResults { results: HashMap::with_capacity(n), parked: HashMap::new(), demand: Some(demand) };
            Outputs { resume: parked.into_values().collect(), ..Default::default() }
        }
        State::AwaitingResults { parked, demand: old, .. } => {
            tracing::error!("zip: new demand arrived while one was already pending");
            if let Some(old_demand) = old {
                let _ = old_demand.send(Ok(None));
            }
            *state = State::Finished;
            Outputs { resume: parked.into_values().collect(), resolve: Some((demand, Ok(None))), abort: Abort::All }
        }
        State::Finished => {
            let _ = demand.send(Ok(None));
            *state = State::Finished;
            Outputs::default()
        }
    }
}

fn base_produced<T, E>(state: &mut State<T, E>, i: usize, n: usize, v: T) -> Outputs<T, E> {
    match state {
        State::AwaitingResults { results, demand, .. } => {
            results.insert(i, v);
            if results.len() == n {
                let demand = demand.take().expect("demand present while results incomplete");
                let tuple: Vec<T> = (0..n).map(|idx| results.remove(&idx).expect("every index populated")).collect();
                *state = State::AwaitingDemand { parked: HashMap::new() };
                Outputs { resolve: Some((demand, Ok(Some(tuple)))), ..Default::default() }
            } else {
                Outputs::default()
            }
        }
        _ => {
            tracing::error!("zip: base {i} produced an element outside AwaitingResults");
            Outputs::default()
        }
    }
}

fn base_ended<T, E>(state: &mut State<T, E>, i: usize, outcome: Result<(), E>) -> Outputs<T, E> {
    let result = outcome.map(|()| None);
    let taken = std::mem::replace(state, State::Finished);
    let (demand, resume) = match taken {
        State::AwaitingResults { parked, demand, .. } => (demand, parked.into_values().collect()),
        State::AwaitingDemand { parked } => (None, parked.into_values().collect()),
        _ => (None, Vec::new()),
    };
    Outputs { resume, resolve: demand.map(|d| (d, result)), abort: Abort::Other(i) }
}

/// Homogeneous N-ary zip: `N` same-typed upstreams zipped into `Vec<T>`
/// tuples of length `N`, one per consumer demand, with shorter-input /
/// first-failure semantics identical to [`super::Zip2`].
pub struct ZipN<T, E> {
    state: Arc<CriticalSection<State<T, E>>>,
    tasks: Arc<TaskSlots>,
    started: bool,
    bases: Vec<Option<Box<dyn AsyncIterator<T, E>>>>,
    config: Option<SpawnConfig>,
}

impl<T, E> ZipN<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// # Panics
    ///
    /// Panics if `bases` is empty.
    pub fn new(bases: Vec<Box<dyn AsyncIterator<T, E>>>) -> Self {
        Self::with_config(bases, None)
    }

    pub fn with_config(bases: Vec<Box<dyn AsyncIterator<T, E>>>, config: Option<SpawnConfig>) -> Self {
        assert!(!bases.is_empty(), "ZipN requires at least one upstream");
        let n = bases.len();
        Self {
            state: Arc::new(CriticalSection::new(State::Initial)),
            tasks: Arc::new(TaskSlots::new(n)),
            started: false,
            bases: bases.into_iter().map(Some).collect(),
            config,
        }
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let n = self.bases.len();
        self.state.with_critical_region(|s| *s = State::Started);

        for i in 0..n {
            let mut base = self.bases[i].take().expect("each base taken exactly once");
            let state = self.state.clone();
            let tasks = self.tasks.clone();
            let handle = SpawnConfig::spawn(self.config.as_ref(), async move {
                loop {
                    let decision = state.with_critical_region(|s| request_permission(s, i, n));
                    let proceed = match decision {
                        Decision::Proceed => true,
                        Decision::Stop => false,
                        Decision::Park(rx) => rx.await.is_ok(),
                    };
                    if !proceed {
                        break;
                    }
                    let outputs = match base.next().await {
                        Ok(Some(v)) => state.with_critical_region(|s| base_produced(s, i, n, v)),
                        Ok(None) => state.with_critical_region(|s| base_ended(s, i, Ok(()))),
                        Err(e) => state.with_critical_region(|s| base_ended(s, i, Err(e))),
                    };
                    let done = state.with_critical_region(|s| matches!(s, State::Finished));
                    outputs.apply(&tasks);
                    if done {
                        break;
                    }
                }
            });
            self.tasks.install(i, handle);
        }
    }
}

impl<T, E> AsyncIterator<Vec<T>, E> for ZipN<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<T>>, E>> + Send + '_>> {
        self.ensure_started();
        let n = self.bases.len();
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            let outputs = self.state.with_critical_region(|s| new_demand(s, n, tx));
            outputs.apply(&self.tasks);
            match rx.await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!("zip: demand continuation dropped without being resumed");
                    Ok(None)
                }
            }
        })
    }
}

impl<T, E> Drop for ZipN<T, E> {
    fn drop(&mut self) {
        self.state.with_critical_region(|s| *s = State::Finished);
        self.tasks.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::from_iter;

    #[tokio::test]
    async fn zips_three_homogeneous_bases_into_vecs() {
        let bases: Vec<Box<dyn AsyncIterator<i32, ()>>> = vec![
            Box::new(from_iter(vec![1, 2], None)),
            Box::new(from_iter(vec![10, 20], None)),
            Box::new(from_iter(vec![100, 200], None)),
        ];
        let mut zip: ZipN<i32, ()> = ZipN::new(bases);
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some(vec![1, 10, 100])));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some(vec![2, 20, 200])));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(None));
    }

    #[tokio::test]
    async fn ends_on_the_shortest_base() {
        let bases: Vec<Box<dyn AsyncIterator<i32, ()>>> = vec![
            Box::new(from_iter(vec![1, 2, 3], None)),
            Box::new(from_iter(vec![10], None)),
        ];
        let mut zip: ZipN<i32, ()> = ZipN::new(bases);
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some(vec![1, 10])));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(None));
    }

    #[tokio::test]
    #[should_panic]
    fn rejects_an_empty_base_list() {
        let bases: Vec<Box<dyn AsyncIterator<i32, ()>>> = Vec::new();
        let _: ZipN<i32, ()> = ZipN::new(bases);
    }
}
