use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cell::CriticalSection;
use crate::iter::AsyncIterator;
use crate::spawn::SpawnConfig;

type Demand<T0, T1, E> = oneshot::Sender<Result<Option<(T0, T1)>, E>>;
type Permission = oneshot::Sender<()>;

enum State<T0, T1, E> {
    Initial,
    Started,
    AwaitingDemand {
        parked0: Option<Permission>,
        parked1: Option<Permission>,
    },
    AwaitingResults {
        result0: Option<T0>,
        result1: Option<T1>,
        parked0: Option<Permission>,
        parked1: Option<Permission>,
        demand: Option<Demand<T0, T1, E>>,
    },
    Finished,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Abort {
    None,
    Other,
    Both,
}

/// What the owning [`Zip2`] must do *outside* the critical region after a
/// transition: resume parked bases, resolve the consumer's demand, and/or
/// abort child task(s).
struct Outputs<T0, T1, E> {
    resume: Vec<Permission>,
    resolve: Option<(Demand<T0, T1, E>, Result<Option<(T0, T1)>, E>)>,
    abort: Abort,
}

impl<T0, T1, E> Default for Outputs<T0, T1, E> {
    fn default() -> Self {
        Self { resume: Vec::new(), resolve: None, abort: Abort::None }
    }
}

impl<T0, T1, E> Outputs<T0, T1, E> {
    fn apply(self, tasks: &TaskSlots, origin: usize) {
        for tx in self.resume {
            let _ = tx.send(());
        }
        if let Some((tx, result)) = self.resolve {
            let _ = tx.send(result);
        }
        match self.abort {
            Abort::None => {}
            Abort::Other => tasks.abort_other(origin),
            Abort::Both => tasks.abort_all(),
        }
    }
}

struct TaskSlots {
    task0: std::sync::Mutex<Option<JoinHandle<()>>>,
    task1: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlots {
    fn new() -> Self {
        Self {
            task0: std::sync::Mutex::new(None),
            task1: std::sync::Mutex::new(None),
        }
    }

    fn abort_other(&self, origin: usize) {
        let slot = if origin == 0 { &self.task1 } else { &self.task0 };
        if let Some(handle) = slot.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }

    fn abort_all(&self) {
        if let Some(h) = self.task0.lock().unwrap_or_else(|p| p.into_inner()).take() {
            h.abort();
        }
        if let Some(h) = self.task1.lock().unwrap_or_else(|p| p.into_inner()).take() {
            h.abort();
        }
    }
}

/// Permission to pull the next element, or an instruction to stop looping
/// because the machine already reached [`State::Finished`].
enum Decision {
    Proceed,
    Stop,
    Park(oneshot::Receiver<()>),
}

fn set_parked(i: usize, tx: Permission, parked0: &mut Option<Permission>, parked1: &mut Option<Permission>) {
    let slot = if i == 0 { parked0 } else { parked1 };
    if slot.is_some() {
        tracing::error!("zip: base {i} requested permission twice without being resumed");
    }
    *slot = Some(tx);
}

fn request_permission<T0, T1, E>(state: &mut State<T0, T1, E>, i: usize) -> Decision {
    match state {
        State::Finished => Decision::Stop,
        State::Initial => unreachable!("child tasks only run after task_started"),
        State::Started => {
            let (tx, rx) = oneshot::channel();
            let mut parked0 = None;
            let mut parked1 = None;
            set_parked(i, tx, &mut parked0, &mut parked1);
            *state = State::AwaitingDemand { parked0, parked1 };
            Decision::Park(rx)
        }
        State::AwaitingDemand { parked0, parked1 } => {
            let (tx, rx) = oneshot::channel();
            set_parked(i, tx, parked0, parked1);
            Decision::Park(rx)
        }
        State::AwaitingResults { result0, result1, parked0, parked1, .. } => {
            let has_result = if i == 0 { result0.is_some() } else { result1.is_some() };
            if has_result {
                let (tx, rx) = oneshot::channel();
                set_parked(i, tx, parked0, parked1);
                Decision::Park(rx)
            } else {
                Decision::Proceed
            }
        }
    }
}

fn new_demand<T0, T1, E>(state: &mut State<T0, T1, E>, demand: Demand<T0, T1, E>) -> Outputs<T0, T1, E> {
    match std::mem::replace(state, State::Finished) {
        State::Initial | State::Started => {
            *state = State::AwaitingResults {
                result0: None,
                result1: None,
                parked0: None,
                parked1: None,
                demand: Some(demand),
            };
            Outputs::default()
        }
        State::AwaitingDemand { parked0, parked1 } => {
            *state = State::AwaitingResults {
                result0: None,
                result1: None,
                parked0: None,
                parked1: None,
                demand: Some(demand),
            };
            Outputs {
                resume: parked0.into_iter().chain(parked1).collect(),
                ..Default::default()
            }
        }
        State::AwaitingResults { parked0, parked1, demand: old, .. } => {
            tracing::error!("zip: new demand arrived while one was already pending");
            if let Some(old_demand) = old {
                let _ = old_demand.send(Ok(None));
            }
            *state = State::Finished;
            Outputs {
                resume: parked0.into_iter().chain(parked1).collect(),
                resolve: Some((demand, Ok(None))),
                abort: Abort::Both,
            }
        }
        State::Finished => {
            let _ = demand.send(Ok(None));
            *state = State::Finished;
            Outputs::default()
        }
    }
}

fn base_produced<T0, T1, E>(state: &mut State<T0, T1, E>, i: usize, value: Value<T0, T1>) -> Outputs<T0, T1, E> {
    match state {
        State::AwaitingResults { result0, result1, demand, .. } => {
            match (i, value) {
                (0, Value::Zero(v)) => *result0 = Some(v),
                (1, Value::One(v)) => *result1 = Some(v),
                _ => unreachable!("base index/value kind mismatch"),
            }
            if result0.is_some() && result1.is_some() {
                let tuple = (result0.take().unwrap(), result1.take().unwrap());
                let demand = demand.take().expect("demand present while both results pending");
                *state = State::AwaitingDemand { parked0: None, parked1: None };
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

enum Value<T0, T1> {
    Zero(T0),
    One(T1),
}

fn base_ended<T0, T1, E>(state: &mut State<T0, T1, E>, _i: usize, outcome: Result<(), E>) -> Outputs<T0, T1, E> {
    let result = outcome.map(|()| None);
    let taken = std::mem::replace(state, State::Finished);
    let (demand, resume) = match taken {
        State::AwaitingResults { parked0, parked1, demand, .. } => {
            (demand, parked0.into_iter().chain(parked1).collect())
        }
        State::AwaitingDemand { parked0, parked1 } => (None, parked0.into_iter().chain(parked1).collect()),
        _ => (None, Vec::new()),
    };
    Outputs {
        resume,
        resolve: demand.map(|d| (d, result)),
        abort: Abort::Other,
    }
}

/// Zips two async iterators into one of pairs, per the shorter-input /
/// first-failure semantics: the combined sequence ends as soon as either
/// input ends or fails.
pub struct Zip2<T0, T1, E> {
    state: Arc<CriticalSection<State<T0, T1, E>>>,
    tasks: Arc<TaskSlots>,
    started: bool,
    base0: Option<Box<dyn AsyncIterator<T0, E>>>,
    base1: Option<Box<dyn AsyncIterator<T1, E>>>,
    config: Option<SpawnConfig>,
}

impl<T0, T1, E> Zip2<T0, T1, E>
where
    T0: Send + 'static,
    T1: Send + 'static,
    E: Send + 'static,
{
    pub fn new<A, B>(base0: A, base1: B) -> Self
    where
        A: AsyncIterator<T0, E> + 'static,
        B: AsyncIterator<T1, E> + 'static,
    {
        Self::with_config(base0, base1, None)
    }

    pub fn with_config<A, B>(base0: A, base1: B, config: Option<SpawnConfig>) -> Self
    where
        A: AsyncIterator<T0, E> + 'static,
        B: AsyncIterator<T1, E> + 'static,
    {
        Self {
            state: Arc::new(CriticalSection::new(State::Initial)),
            tasks: Arc::new(TaskSlots::new()),
            started: false,
            base0: Some(Box::new(base0)),
            base1: Some(Box::new(base1)),
            config,
        }
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.state.with_critical_region(|s| *s = State::Started);

        let mut base0 = self.base0.take().expect("base0 taken exactly once");
        let state = self.state.clone();
        let tasks = self.tasks.clone();
        let handle0 = SpawnConfig::spawn(self.config.as_ref(), async move {
            loop {
                let decision = state.with_critical_region(|s| request_permission(s, 0));
                let proceed = match decision {
                    Decision::Proceed => true,
                    Decision::Stop => false,
                    Decision::Park(rx) => rx.await.is_ok(),
                };
                if !proceed {
                    break;
                }
                let outputs = match base0.next().await {
                    Ok(Some(v)) => state.with_critical_region(|s| base_produced(s, 0, Value::Zero(v))),
                    Ok(None) => state.with_critical_region(|s| base_ended(s, 0, Ok(()))),
                    Err(e) => state.with_critical_region(|s| base_ended(s, 0, Err(e))),
                };
                let done = state.with_critical_region(|s| matches!(s, State::Finished));
                outputs.apply(&tasks, 0);
                if done {
                    break;
                }
            }
        });

        let mut base1 = self.base1.take().expect("base1 taken exactly once");
        let state = self.state.clone();
        let tasks = self.tasks.clone();
        let handle1 = SpawnConfig::spawn(self.config.as_ref(), async move {
            loop {
                let decision = state.with_critical_region(|s| request_permission(s, 1));
                let proceed = match decision {
                    Decision::Proceed => true,
                    Decision::Stop => false,
                    Decision::Park(rx) => rx.await.is_ok(),
                };
                if !proceed {
                    break;
                }
                let outputs = match base1.next().await {
                    Ok(Some(v)) => state.with_critical_region(|s| base_produced(s, 1, Value::One(v))),
                    Ok(None) => state.with_critical_region(|s| base_ended(s, 1, Ok(()))),
                    Err(e) => state.with_critical_region(|s| base_ended(s, 1, Err(e))),
                };
                let done = state.with_critical_region(|s| matches!(s, State::Finished));
                outputs.apply(&tasks, 1);
                if done {
                    break;
                }
            }
        });

        *self.tasks.task0.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle0);
        *self.tasks.task1.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle1);
    }
}

impl<T0, T1, E> AsyncIterator<(T0, T1), E> for Zip2<T0, T1, E>
where
    T0: Send + 'static,
    T1: Send + 'static,
    E: Send + 'static,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<(T0, T1)>, E>> + Send + '_>> {
        self.ensure_started();
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            let outputs = self.state.with_critical_region(|s| new_demand(s, tx));
            outputs.apply(&self.tasks, usize::MAX);
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

impl<T0, T1, E> Drop for Zip2<T0, T1, E> {
    fn drop(&mut self) {
        self.state.with_critical_region(|s| *s = State::Finished);
        self.tasks.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::from_iter;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn zip2_shorter_input_truncation_scenario_from_spec_section_8() {
        let a = from_iter(vec![1, 2, 3, 4, 5], Some(Duration::from_millis(50)));
        let b = from_iter(vec!["6", "7", "8"], Some(Duration::from_millis(10)));
        let mut zip: Zip2<i32, &'static str, ()> = Zip2::new(a, b);
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some((1, "6"))));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some((2, "7"))));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some((3, "8"))));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(None));
    }

    #[tokio::test]
    async fn zip2_ends_as_soon_as_either_base_fails() {
        let a = from_iter(vec![1, 2, 3], None);
        let b = crate::iter::fail::<&'static str>("boom");
        let mut zip: Zip2<i32, i32, &'static str> = Zip2::new(a, b);
        assert_eq!(AsyncIterator::next(&mut zip).await, Err("boom"));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(None));
    }

    #[tokio::test]
    async fn zip2_produces_one_tuple_per_demand_in_order() {
        let a = from_iter(vec![10, 20], None);
        let b = from_iter(vec!["x", "y"], None);
        let mut zip: Zip2<i32, &'static str, ()> = Zip2::new(a, b);
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some((10, "x"))));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some((20, "y"))));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(None));
    }
}
