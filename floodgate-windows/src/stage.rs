use floodgate::{
    errorhandling::FloodgateFatal,
    pipeline::{OperatorError, Output, Stage},
    snapshot::{deserialize_state, serialize_state, Checkpointable, SnapshotError},
    types::{Data, Key, KeySelector},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::WindowError,
    event::WindowEvent,
    functions::UserError,
    policy::WindowPolicy,
    store::{WindowStore, WindowStrategy},
};

/// Runs a window policy and a window store as one pipeline stage.
///
/// Every record is keyed with the selector and handed to the policy. The events the policy
/// produces are applied to the store in order and whatever the strategy emits is passed on.
/// Policy and store are checkpointed together so they never disagree about a window after a
/// reset.
///
/// A failing user function fails the pipeline and resets its region. An eviction underflow
/// means policy and store diverged, which aborts the process.
///
/// ```
/// use std::num::NonZeroUsize;
/// use floodgate::{pipeline::Stage, types::Unpartitioned};
/// use floodgate_windows::{operators::SetAggregator, policy::SlidingCount, WindowStage};
///
/// let mut sums = WindowStage::new(
///     Unpartitioned,
///     SlidingCount::new(NonZeroUsize::new(2).unwrap()),
///     SetAggregator::new(|w: &[u64]| Some(w.iter().sum::<u64>())),
/// );
/// # let _ = &mut sums as &mut dyn Stage<u64>;
/// ```
pub struct WindowStage<T, KS: KeySelector<T>, P, S> {
    selector: KS,
    policy: P,
    store: WindowStore<KS::Key, T, S>,
}

impl<T, KS, P, S> WindowStage<T, KS, P, S>
where
    KS: KeySelector<T>,
    S: WindowStrategy<KS::Key, T>,
{
    /// Window records partitioned by `selector`
    pub fn new(selector: KS, policy: P, strategy: S) -> Self {
        Self {
            selector,
            policy,
            store: WindowStore::new(strategy),
        }
    }

    /// The window store of this stage
    pub fn store(&self) -> &WindowStore<KS::Key, T, S> {
        &self.store
    }
}

impl<T, KS, P, S> WindowStage<T, KS, P, S>
where
    T: Data + Serialize + DeserializeOwned,
    KS: KeySelector<T>,
    KS::Key: Serialize + DeserializeOwned,
    P: WindowPolicy<KS::Key, T>,
    S: WindowStrategy<KS::Key, T>,
{
    /// Let processing time reach `now_ms`, evicting whatever the policy expires, and return
    /// what the strategy emits. Time based windows only shrink without new tuples through this.
    pub fn advance(&mut self, now_ms: u64) -> Result<Vec<S::Output>, OperatorError> {
        let mut outputs = Vec::new();
        for event in self.policy.advance(now_ms) {
            if let Some(out) = apply(&self.store, event).map_err(OperatorError::User)? {
                outputs.push(out);
            }
        }
        Ok(outputs)
    }
}

/// Apply one event, aborting on errors which mean policy and store diverged
fn apply<K, T, S>(
    store: &WindowStore<K, T, S>,
    event: WindowEvent<K, T>,
) -> Result<Option<S::Output>, UserError>
where
    K: Key,
    S: WindowStrategy<K, T>,
{
    match store.on_event(event) {
        Ok(out) => Ok(out),
        Err(WindowError::UserLogic(e)) => Err(e),
        Err(fatal) => Err::<_, WindowError>(fatal).floodgate_fatal(),
    }
}

impl<T, KS, P, S> Stage<T> for WindowStage<T, KS, P, S>
where
    T: Data + Serialize + DeserializeOwned,
    KS: KeySelector<T>,
    KS::Key: Serialize + DeserializeOwned,
    P: WindowPolicy<KS::Key, T>,
    S: WindowStrategy<KS::Key, T, Output = T>,
{
    fn process(&mut self, record: T, output: &mut Output<T>) -> Result<(), OperatorError> {
        let key = self.selector.select(&record);
        for event in self.policy.admit(key, record) {
            if let Some(out) = apply(&self.store, event).map_err(OperatorError::User)? {
                output.send(out);
            }
        }
        Ok(())
    }

    fn state(&mut self) -> Option<&mut dyn Checkpointable> {
        Some(self)
    }
}

impl<T, KS, P, S> Checkpointable for WindowStage<T, KS, P, S>
where
    T: Data + Serialize + DeserializeOwned,
    KS: KeySelector<T>,
    KS::Key: Serialize + DeserializeOwned,
    P: WindowPolicy<KS::Key, T>,
    S: WindowStrategy<KS::Key, T>,
{
    fn checkpoint(&self) -> Result<Vec<u8>, SnapshotError> {
        serialize_state(&(self.policy.checkpoint()?, self.store.checkpoint()?))
    }

    fn restore(&mut self, state: Option<Vec<u8>>) -> Result<(), SnapshotError> {
        let (policy, store) = match state {
            Some(s) => {
                let (p, w): (Vec<u8>, Vec<u8>) = deserialize_state(&s)?;
                (Some(p), Some(w))
            }
            None => (None, None),
        };
        self.policy.restore(policy)?;
        self.store.restore(store)
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, time::Duration};

    use floodgate::types::Unpartitioned;

    use super::*;
    use crate::{
        functions::fallible,
        operators::{PeriodicAggregator, SetAggregator},
        policy::{SlidingCount, SlidingTime, TumblingCount},
    };

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn feed<St: Stage<u64>>(stage: &mut St, records: impl IntoIterator<Item = u64>) -> Vec<u64> {
        let mut output = Output::default();
        for r in records {
            stage.process(r, &mut output).unwrap();
        }
        output.into_records()
    }

    #[test]
    fn sliding_sums() {
        let mut stage = WindowStage::new(
            Unpartitioned,
            SlidingCount::new(size(2)),
            SetAggregator::new(|w: &[u64]| Some(w.iter().sum::<u64>())),
        );
        // insert 1 -> 1, insert 2 -> 3, evict 1 -> 2, insert 3 -> 5
        assert_eq!(feed(&mut stage, [1, 2, 3]), vec![1, 3, 2, 5]);
    }

    #[test]
    fn tumbling_fires_once_per_window() {
        let mut stage = WindowStage::new(
            |x: &u64| x % 2,
            TumblingCount::new(size(2)),
            PeriodicAggregator::new(|w: &[u64]| w.iter().max().copied()),
        );
        assert_eq!(feed(&mut stage, [1, 2, 3, 4, 5]), vec![3, 4]);
        assert_eq!(stage.store().active_partitions(), 2);
    }

    #[test]
    fn restores_policy_and_store_together() {
        let mut stage = WindowStage::new(
            Unpartitioned,
            SlidingCount::new(size(2)),
            SetAggregator::new(|w: &[u64]| Some(w.iter().sum::<u64>())),
        );
        feed(&mut stage, [10, 20]);
        let state = stage.checkpoint().unwrap();
        feed(&mut stage, [30, 40]);

        stage.restore(Some(state)).unwrap();
        // evicts 10, leaving 20 and 1
        assert_eq!(feed(&mut stage, [1]), vec![20, 21]);

        stage.restore(None).unwrap();
        assert_eq!(feed(&mut stage, [1]), vec![1]);
    }

    #[test]
    fn advancing_time_empties_sliding_time_windows() {
        let mut stage = WindowStage::new(
            |x: &u64| x % 2,
            SlidingTime::new(Duration::from_secs(60)),
            SetAggregator::new(|w: &[u64]| Some(w.len() as u64)),
        );
        assert_eq!(feed(&mut stage, [1, 2, 3]), vec![1, 1, 2]);
        assert_eq!(stage.store().active_partitions(), 2);

        // count based policies have nothing to expire
        let mut counted = WindowStage::new(
            Unpartitioned,
            SlidingCount::new(size(2)),
            SetAggregator::new(|w: &[u64]| Some(w.len() as u64)),
        );
        feed(&mut counted, [1]);
        assert!(counted.advance(u64::MAX).unwrap().is_empty());

        // every tuple is older than a minute by then; the strategy sees the emptied windows
        let evicted = stage.advance(u64::MAX).unwrap();
        assert_eq!(evicted, vec![0, 0]);
        assert_eq!(stage.store().active_partitions(), 0);
        assert!(stage.advance(u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn user_errors_fail_the_stage() {
        let mut stage = WindowStage::new(
            Unpartitioned,
            SlidingCount::new(size(4)),
            SetAggregator::new(fallible(|w: &[u64]| {
                if w.len() > 1 {
                    Err("too many")
                } else {
                    Ok(Some(w[0]))
                }
            })),
        );
        let mut output: Output<u64> = Output::default();
        stage.process(1, &mut output).unwrap();
        let err = stage.process(2, &mut output).unwrap_err();
        assert!(matches!(err, OperatorError::User(_)));
    }
}
