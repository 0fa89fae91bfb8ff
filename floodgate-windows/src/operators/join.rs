use std::marker::PhantomData;

use floodgate::types::{Key, KeySelector, KeyableSelector, Unpartitioned};

use crate::{
    error::WindowError,
    event::{EventKind, WindowEvent},
    functions::{last, Join, JoinLast},
    store::{WindowStore, WindowStrategy},
};

/// Strategy of the build side of a join: keep the window, emit nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildSide;

impl<K: Key, U> WindowStrategy<K, U> for BuildSide {
    type Output = ();

    fn on_post_update(
        &self,
        _kind: EventKind,
        _key: &K,
        _tuples: &[U],
    ) -> Result<Option<()>, WindowError> {
        Ok(None)
    }
}

/// Joins probe tuples of type `T` against a sliding window of build tuples of type `U`.
///
/// Build tuples only ever change the window. Every probe tuple is joined with the current
/// window of its partition; a partition without a window joins with an empty slice.
///
/// ```rust
/// use floodgate_windows::{operators::SlidingJoin, WindowEvent};
///
/// let join = SlidingJoin::keyed(
///     |order: &(u32, u64)| order.0,
///     |order: &(u32, u64), prices: &[u64]| prices.last().map(|p| order.1 * p),
/// );
/// join.on_build_event(WindowEvent::Insertion { key: 7, tuples: vec![10, 12] }).unwrap();
/// assert_eq!(join.probe(&(7, 3)).unwrap(), Some(36));
/// assert_eq!(join.probe(&(8, 3)).unwrap(), None);
/// ```
pub struct SlidingJoin<T, U, KS, J>
where
    KS: KeySelector<T>,
{
    build: WindowStore<KS::Key, U, BuildSide>,
    selector: KS,
    function: J,
    _probe: PhantomData<fn(&T)>,
}

impl<T, U, J> SlidingJoin<T, U, Unpartitioned, J>
where
    U: Send,
    J: Join<T, U>,
{
    /// Join where every tuple belongs to the one unpartitioned window
    pub fn unpartitioned(function: J) -> Self {
        Self::keyed(Unpartitioned, function)
    }
}

impl<T, U, F, R> SlidingJoin<T, U, Unpartitioned, JoinLast<F>>
where
    U: Send,
    F: Fn(&T, Option<&U>) -> Option<R> + Send + Sync,
{
    /// Join every probe tuple with the newest build tuple. Pair with
    /// [replace_build](Self::replace_build) so the build window never holds more than one.
    pub fn last(function: F) -> Self {
        Self::keyed(Unpartitioned, last(function))
    }
}

impl<T, U, KS, F, R> SlidingJoin<T, U, KS, JoinLast<F>>
where
    KS: KeySelector<T>,
    U: Send,
    F: Fn(&T, Option<&U>) -> Option<R> + Send + Sync,
{
    /// Like [last](SlidingJoin::last) with one build tuple per key of `selector`
    pub fn last_keyed(selector: KS, function: F) -> Self {
        Self::keyed(selector, last(function))
    }
}

impl<T, U, J> SlidingJoin<T, U, KeyableSelector, J>
where
    T: floodgate::types::Keyable,
    U: Send,
    J: Join<T, U>,
{
    /// Join partitioned by the key probe tuples carry
    pub fn by_keyable(function: J) -> Self {
        Self::keyed(KeyableSelector, function)
    }
}

impl<T, U, KS, J> SlidingJoin<T, U, KS, J>
where
    KS: KeySelector<T>,
    U: Send,
    J: Join<T, U>,
{
    /// Join partitioned by the key `selector` derives from probe tuples
    pub fn keyed(selector: KS, function: J) -> Self {
        Self {
            build: WindowStore::new(BuildSide),
            selector,
            function,
            _probe: PhantomData,
        }
    }

    /// Apply an event to the build side window
    pub fn on_build_event(&self, event: WindowEvent<KS::Key, U>) -> Result<(), WindowError> {
        self.build.on_event(event).map(|_| ())
    }

    /// Make `tuple` the only tuple in the build window of `key`
    pub fn replace_build(&self, key: KS::Key, tuple: U) -> Result<(), WindowError>
    where
        U: Clone,
    {
        let buffered = self.build.with_buffer(&key, <[U]>::to_vec);
        if !buffered.is_empty() {
            self.build.on_event(WindowEvent::Eviction {
                key: key.clone(),
                tuples: buffered,
            })?;
        }
        self.on_build_event(WindowEvent::Insertion {
            key,
            tuples: vec![tuple],
        })
    }

    /// Join one probe tuple with the build window of its partition
    pub fn probe(&self, tuple: &T) -> Result<Option<J::Output>, WindowError> {
        let key = self.selector.select(tuple);
        self.build
            .with_buffer(&key, |window| self.function.join(tuple, window))
            .map_err(WindowError::UserLogic)
    }

    /// The build side window store
    pub fn build_side(&self) -> &WindowStore<KS::Key, U, BuildSide> {
        &self.build
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use floodgate::types::Keyable;

    use super::*;
    use crate::functions::fallible;

    #[test]
    fn empty_build_side_gets_empty_slice() {
        let calls = Mutex::new(Vec::new());
        let join = SlidingJoin::unpartitioned(|probe: &i32, build: &[i32]| {
            calls.lock().unwrap().push(build.len());
            Some(probe + build.iter().sum::<i32>())
        });
        assert_eq!(join.probe(&5).unwrap(), Some(5));

        join.on_build_event(WindowEvent::Insertion {
            key: 0,
            tuples: vec![1, 2],
        })
        .unwrap();
        assert_eq!(join.probe(&5).unwrap(), Some(8));
        drop(join);
        assert_eq!(calls.into_inner().unwrap(), vec![0, 2]);
    }

    #[test]
    fn evictions_shrink_build_window() {
        let join = SlidingJoin::unpartitioned(|_: &(), build: &[char]| {
            Some(build.iter().collect::<String>())
        });
        join.on_build_event(WindowEvent::Insertion {
            key: 0,
            tuples: vec!['a', 'b', 'c'],
        })
        .unwrap();
        join.on_build_event(WindowEvent::Eviction {
            key: 0,
            tuples: vec!['a'],
        })
        .unwrap();
        assert_eq!(join.probe(&()).unwrap().as_deref(), Some("bc"));
        join.on_build_event(WindowEvent::PartitionEviction { key: 0 })
            .unwrap();
        assert_eq!(join.probe(&()).unwrap().as_deref(), Some(""));
    }

    struct Order {
        customer: String,
        amount: u64,
    }

    impl Keyable for Order {
        type Key = String;

        fn key(&self) -> String {
            self.customer.clone()
        }
    }

    #[test]
    fn keyable_probes_use_their_partition() {
        let join = SlidingJoin::by_keyable(|order: &Order, discounts: &[u64]| {
            (!discounts.is_empty()).then(|| order.amount - discounts.iter().sum::<u64>())
        });
        join.on_build_event(WindowEvent::Insertion {
            key: "ann".to_string(),
            tuples: vec![1, 2],
        })
        .unwrap();

        let ann = Order {
            customer: "ann".into(),
            amount: 10,
        };
        let bob = Order {
            customer: "bob".into(),
            amount: 10,
        };
        assert_eq!(join.probe(&ann).unwrap(), Some(7));
        assert_eq!(join.probe(&bob).unwrap(), None);
        assert_eq!(join.build_side().active_partitions(), 1);
    }

    #[test]
    fn joins_with_last_build_tuple() {
        let join = SlidingJoin::last(|v1: &i32, v2: Option<&String>| match (*v1, v2) {
            (0, _) => None,
            (v1, None) => Some(format!("empty-{v1}")),
            (v1, Some(v2)) => Some(format!("{v2}-{v1}")),
        });
        let probe_all = |join: &SlidingJoin<i32, String, Unpartitioned, _>| {
            [0, 134, 76]
                .iter()
                .filter_map(|v| join.probe(v).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(probe_all(&join), vec!["empty-134", "empty-76"]);

        join.replace_build(0, "d".into()).unwrap();
        join.replace_build(0, "e".into()).unwrap();
        assert_eq!(probe_all(&join), vec!["e-134", "e-76"]);
        join.build_side().with_buffer(&0, |w| assert_eq!(w, ["e".to_string()]));
    }

    #[test]
    fn keyed_last_keeps_one_tuple_per_key() {
        let join = SlidingJoin::last_keyed(
            |order: &(char, u64)| order.0,
            |order: &(char, u64), rate: Option<&u64>| rate.map(|r| order.1 * r),
        );
        join.replace_build('a', 2).unwrap();
        join.replace_build('b', 3).unwrap();
        join.replace_build('a', 5).unwrap();

        assert_eq!(join.probe(&('a', 10)).unwrap(), Some(50));
        assert_eq!(join.probe(&('b', 10)).unwrap(), Some(30));
        assert_eq!(join.probe(&('c', 10)).unwrap(), None);
        assert_eq!(join.build_side().active_partitions(), 2);
    }

    #[test]
    fn failing_join_is_reported() {
        let join = SlidingJoin::unpartitioned(fallible(|_: &u8, build: &[u8]| {
            if build.is_empty() {
                Err("nothing to join")
            } else {
                Ok(Some(()))
            }
        }));
        let err = join.probe(&1).unwrap_err();
        assert!(matches!(err, WindowError::UserLogic(_)));
    }
}
