use std::future::Future;
use std::pin::Pin;

use crate::iter::AsyncIterator;
use crate::spawn::SpawnConfig;

use super::two::Zip2;

/// Zips three async iterators into one of triples.
///
/// Implemented as `Zip2(Zip2(a, b), c)` with the nested pair flattened back
/// into a triple, rather than a bespoke three-way state machine: the consumer
/// demand on the outer `Zip2` triggers a demand on the inner `Zip2` and on
/// `c` in the same step, so all three bases still start pulling concurrently,
/// and first-failure/first-finish still short-circuits the whole triple
/// (whichever base loses propagates through whichever `Zip2` owns it). See
/// the design notes for why this trades a one-hop scheduling nest for not
/// duplicating `Zip2`'s state machine a third time.
pub struct Zip3<T0, T1, T2, E> {
    inner: Zip2<(T0, T1), T2, E>,
}

impl<T0, T1, T2, E> Zip3<T0, T1, T2, E>
where
    T0: Send + 'static,
    T1: Send + 'static,
    T2: Send + 'static,
    E: Send + 'static,
{
    pub fn new<A, B, C>(base0: A, base1: B, base2: C) -> Self
    where
        A: AsyncIterator<T0, E> + 'static,
        B: AsyncIterator<T1, E> + 'static,
        C: AsyncIterator<T2, E> + 'static,
    {
        Self::with_config(base0, base1, base2, None)
    }

    pub fn with_config<A, B, C>(base0: A, base1: B, base2: C, config: Option<SpawnConfig>) -> Self
    where
        A: AsyncIterator<T0, E> + 'static,
        B: AsyncIterator<T1, E> + 'static,
        C: AsyncIterator<T2, E> + 'static,
    {
        let pair = Zip2::with_config(base0, base1, config);
        Self { inner: Zip2::with_config(pair, base2, config) }
    }
}

impl<T0, T1, T2, E> AsyncIterator<(T0, T1, T2), E> for Zip3<T0, T1, T2, E>
where
    T0: Send + 'static,
    T1: Send + 'static,
    T2: Send + 'static,
    E: Send + 'static,
{
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<(T0, T1, T2)>, E>> + Send + '_>> {
        Box::pin(async move {
            match self.inner.next().await {
                Ok(Some((pair, t2))) => Ok(Some((pair.0, pair.1, t2))),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::{fail, from_iter};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn zip3_error_propagation_scenario_from_spec_section_8() {
        let a = from_iter(vec![1, 2, 3, 4], Some(Duration::from_millis(50)));
        let b = from_iter(vec!["1", "2", "3", "4"], Some(Duration::from_millis(5)));
        let c = fail::<&'static str>("E1");
        let mut zip: Zip3<i32, &'static str, i32, &'static str> = Zip3::new(a, b, c);
        assert_eq!(AsyncIterator::next(&mut zip).await, Err("E1"));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(None));
    }

    #[tokio::test]
    async fn zip3_combines_three_in_order() {
        let a = from_iter(vec![1, 2], None);
        let b = from_iter(vec!["x", "y"], None);
        let c = from_iter(vec![true, false], None);
        let mut zip: Zip3<i32, &'static str, bool, ()> = Zip3::new(a, b, c);
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some((1, "x", true))));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(Some((2, "y", false))));
        assert_eq!(AsyncIterator::next(&mut zip).await, Ok(None));
    }
}
