use std::{sync::Arc, time::Duration};

use floodgate::types::Key;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

use crate::{
    error::WindowError,
    event::EventKind,
    functions::Aggregate,
    store::{WindowStore, WindowStrategy},
};

/// Aggregates the whole window after every insertion and eviction.
///
/// ```rust
/// use floodgate_windows::{operators::SetAggregator, store::WindowStore, WindowEvent};
///
/// let store = WindowStore::new(SetAggregator::new(|xs: &[i64]| {
///     (!xs.is_empty()).then(|| xs.iter().sum::<i64>())
/// }));
/// let out = store
///     .on_event(WindowEvent::Insertion { key: 0u32, tuples: vec![1, 2] })
///     .unwrap();
/// assert_eq!(out, Some(3));
/// let out = store
///     .on_event(WindowEvent::Eviction { key: 0u32, tuples: vec![1, 2] })
///     .unwrap();
/// assert_eq!(out, None);
/// ```
#[derive(Debug, Clone)]
pub struct SetAggregator<A> {
    function: A,
}

impl<A> SetAggregator<A> {
    /// Aggregate with `function`
    pub fn new(function: A) -> Self {
        Self { function }
    }
}

impl<K, T, A> WindowStrategy<K, T> for SetAggregator<A>
where
    K: Key,
    A: Aggregate<T>,
{
    type Output = A::Output;

    fn on_post_update(
        &self,
        kind: EventKind,
        _key: &K,
        tuples: &[T],
    ) -> Result<Option<A::Output>, WindowError> {
        match kind {
            EventKind::Insertion | EventKind::Eviction => self
                .function
                .aggregate(tuples)
                .map_err(WindowError::UserLogic),
            EventKind::PartitionEviction | EventKind::Trigger => Ok(None),
        }
    }
}

/// Maintains the window like [SetAggregator] but only aggregates when triggered
#[derive(Debug, Clone)]
pub struct PeriodicAggregator<A> {
    function: A,
}

impl<A> PeriodicAggregator<A> {
    /// Aggregate with `function` on every trigger
    pub fn new(function: A) -> Self {
        Self { function }
    }
}

impl<K, T, A> WindowStrategy<K, T> for PeriodicAggregator<A>
where
    K: Key,
    A: Aggregate<T>,
{
    type Output = A::Output;

    fn on_post_update(
        &self,
        kind: EventKind,
        _key: &K,
        tuples: &[T],
    ) -> Result<Option<A::Output>, WindowError> {
        match kind {
            EventKind::Trigger => self
                .function
                .aggregate(tuples)
                .map_err(WindowError::UserLogic),
            _ => Ok(None),
        }
    }
}

/// Trigger every partition of `store` once per `period` on the current tokio runtime.
///
/// Outputs arrive on the returned channel. The task ends when the receiver is dropped or when
/// the returned handle is aborted.
pub fn spawn_periodic<K, T, A>(
    store: Arc<WindowStore<K, T, PeriodicAggregator<A>>>,
    period: Duration,
) -> (JoinHandle<()>, flume::Receiver<Result<A::Output, WindowError>>)
where
    K: Key,
    T: Send + 'static,
    A: Aggregate<T> + 'static,
    A::Output: Send + 'static,
{
    let (tx, rx) = flume::unbounded();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let results = match store.trigger_all() {
                Ok(outputs) => outputs.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            debug!("periodic trigger produced {} results", results.len());
            for r in results {
                if tx.send(r).is_err() {
                    return;
                }
            }
        }
    });
    (task, rx)
}
