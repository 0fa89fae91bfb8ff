//! Per-partition window buffers.
//!
//! The partition map is only locked long enough to find or create a partition. Every mutation
//! of a partition, together with the strategy hook that follows it, runs under that partition's
//! own lock, so different partitions proceed in parallel while one partition is strictly
//! serialized.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use floodgate::{
    snapshot::{deserialize_state, serialize_state, Checkpointable, SnapshotError},
    types::Key,
};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    error::WindowError,
    event::{EventKind, WindowEvent},
};

type Partition<T> = Arc<Mutex<VecDeque<T>>>;

/// Decides what a [WindowStore] does after each event
pub trait WindowStrategy<K, T>: Send + Sync {
    /// What the strategy emits
    type Output;

    /// Called exactly once for every partition the store creates
    fn on_partition_created(&self, _key: &K) {}

    /// Called after an event was applied, with the window of the partition oldest first.
    /// The partition stays locked while this runs. After a partition eviction `tuples` is empty.
    fn on_post_update(
        &self,
        kind: EventKind,
        key: &K,
        tuples: &[T],
    ) -> Result<Option<Self::Output>, WindowError>;
}

/// Window buffers of all partitions
pub struct WindowStore<K, T, S> {
    partitions: Mutex<IndexMap<K, Partition<T>>>,
    active: AtomicUsize,
    strategy: S,
}

impl<K, T, S> std::fmt::Debug for WindowStore<K, T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowStore")
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[inline]
fn lock<X>(mutex: &Mutex<X>) -> MutexGuard<'_, X> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, T, S> WindowStore<K, T, S>
where
    K: Key,
    S: WindowStrategy<K, T>,
{
    /// Create an empty store
    pub fn new(strategy: S) -> Self {
        Self {
            partitions: Mutex::new(IndexMap::new()),
            active: AtomicUsize::new(0),
            strategy,
        }
    }

    /// The strategy of this store
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Apply an event and run the strategy hook.
    ///
    /// An eviction of more tuples than the window holds fails with
    /// [WindowError::EvictionUnderflow] before anything is changed.
    pub fn on_event(&self, event: WindowEvent<K, T>) -> Result<Option<S::Output>, WindowError> {
        debug!(kind = ?event.kind(), key = ?event.key(), "window event");
        match event {
            WindowEvent::Insertion { key, tuples } => {
                let partition = self.get_or_create(&key);
                let mut buffer = lock(&partition);
                buffer.extend(tuples);
                self.strategy
                    .on_post_update(EventKind::Insertion, &key, buffer.make_contiguous())
            }
            WindowEvent::Eviction { key, tuples } => {
                let requested = tuples.len();
                let Some(partition) = self.get(&key) else {
                    if requested == 0 {
                        return self.strategy.on_post_update(EventKind::Eviction, &key, &[]);
                    }
                    return Err(WindowError::EvictionUnderflow {
                        key: format!("{key:?}"),
                        requested,
                        buffered: 0,
                    });
                };
                let mut buffer = lock(&partition);
                if requested > buffer.len() {
                    return Err(WindowError::EvictionUnderflow {
                        key: format!("{key:?}"),
                        requested,
                        buffered: buffer.len(),
                    });
                }
                buffer.drain(..requested);
                self.strategy
                    .on_post_update(EventKind::Eviction, &key, buffer.make_contiguous())
            }
            WindowEvent::PartitionEviction { key } => {
                let removed = lock(&self.partitions).shift_remove(&key);
                // wait for anyone still working on the partition
                let _buffer = removed.as_ref().map(|p| lock(p));
                if removed.is_some() {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                }
                self.strategy
                    .on_post_update(EventKind::PartitionEviction, &key, &[])
            }
            WindowEvent::Trigger { key } => match self.get(&key) {
                Some(partition) => {
                    let mut buffer = lock(&partition);
                    self.strategy
                        .on_post_update(EventKind::Trigger, &key, buffer.make_contiguous())
                }
                None => self.strategy.on_post_update(EventKind::Trigger, &key, &[]),
            },
        }
    }

    /// Fire a trigger on every partition, collecting all outputs
    pub fn trigger_all(&self) -> Result<Vec<S::Output>, WindowError> {
        let mut outputs = Vec::new();
        for key in self.partition_keys() {
            if let Some(out) = self.on_event(WindowEvent::Trigger { key })? {
                outputs.push(out);
            }
        }
        Ok(outputs)
    }

    /// Run `func` on the window of `key`, oldest tuple first.
    /// A partition without a window is passed as an empty slice.
    pub fn with_buffer<R>(&self, key: &K, func: impl FnOnce(&[T]) -> R) -> R {
        match self.get(key) {
            Some(partition) => func(lock(&partition).make_contiguous()),
            None => func(&[]),
        }
    }

    /// Number of partitions currently holding a window
    pub fn active_partitions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Keys of all partitions, in creation order
    pub fn partition_keys(&self) -> Vec<K> {
        lock(&self.partitions).keys().cloned().collect()
    }

    fn get(&self, key: &K) -> Option<Partition<T>> {
        lock(&self.partitions).get(key).map(Arc::clone)
    }

    fn get_or_create(&self, key: &K) -> Partition<T> {
        let partition = {
            let mut partitions = lock(&self.partitions);
            if let Some(existing) = partitions.get(key) {
                return Arc::clone(existing);
            }
            let partition: Partition<T> = Arc::new(Mutex::new(VecDeque::new()));
            partitions.insert(key.clone(), Arc::clone(&partition));
            partition
        };
        self.active.fetch_add(1, Ordering::SeqCst);
        self.strategy.on_partition_created(key);
        debug!(?key, "created window partition");
        partition
    }
}

impl<K, T, S> Checkpointable for WindowStore<K, T, S>
where
    K: Key + Serialize + DeserializeOwned,
    T: Clone + Send + Serialize + DeserializeOwned,
    S: WindowStrategy<K, T>,
{
    fn checkpoint(&self) -> Result<Vec<u8>, SnapshotError> {
        let windows: IndexMap<K, Vec<T>> = lock(&self.partitions)
            .iter()
            .map(|(k, p)| (k.clone(), lock(p).iter().cloned().collect()))
            .collect();
        serialize_state(&windows)
    }

    fn restore(&mut self, state: Option<Vec<u8>>) -> Result<(), SnapshotError> {
        let windows: IndexMap<K, Vec<T>> = state
            .map(|s| deserialize_state(&s))
            .transpose()?
            .unwrap_or_default();
        let restored: IndexMap<K, Partition<T>> = windows
            .into_iter()
            .map(|(k, tuples)| (k, Arc::new(Mutex::new(VecDeque::from(tuples)))))
            .collect();
        self.active.store(restored.len(), Ordering::SeqCst);
        *lock(&self.partitions) = restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Records every hook call
    #[derive(Default)]
    struct Recorder {
        created: Mutex<Vec<&'static str>>,
        seen: Mutex<Vec<(EventKind, Vec<i32>)>>,
    }

    impl WindowStrategy<&'static str, i32> for Recorder {
        type Output = usize;

        fn on_partition_created(&self, key: &&'static str) {
            self.created.lock().unwrap().push(*key);
        }

        fn on_post_update(
            &self,
            kind: EventKind,
            _key: &&'static str,
            tuples: &[i32],
        ) -> Result<Option<usize>, WindowError> {
            self.seen.lock().unwrap().push((kind, tuples.to_vec()));
            Ok(Some(tuples.len()))
        }
    }

    fn insert(key: &'static str, tuples: &[i32]) -> WindowEvent<&'static str, i32> {
        WindowEvent::Insertion {
            key,
            tuples: tuples.to_vec(),
        }
    }

    fn evict(key: &'static str, tuples: &[i32]) -> WindowEvent<&'static str, i32> {
        WindowEvent::Eviction {
            key,
            tuples: tuples.to_vec(),
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let store = WindowStore::new(Recorder::default());
        store.on_event(insert("a", &[1, 2, 3])).unwrap();
        store.on_event(insert("a", &[4])).unwrap();
        assert_eq!(store.on_event(evict("a", &[1, 2])).unwrap(), Some(2));
        store.with_buffer(&"a", |b| assert_eq!(b, &[3, 4]));
    }

    #[test]
    fn underflow_leaves_window_untouched() {
        let store = WindowStore::new(Recorder::default());
        store.on_event(insert("a", &[1, 2])).unwrap();
        let err = store.on_event(evict("a", &[1, 2, 3])).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            WindowError::EvictionUnderflow {
                requested: 3,
                buffered: 2,
                ..
            }
        ));
        store.with_buffer(&"a", |b| assert_eq!(b, &[1, 2]));
        // the hook did not run for the failed eviction
        assert_eq!(store.strategy().seen.lock().unwrap().len(), 1);

        assert!(store.on_event(evict("missing", &[1])).is_err());
    }

    #[test]
    fn creation_callback_fires_once_per_key() {
        let store = WindowStore::new(Recorder::default());
        store.on_event(insert("a", &[1])).unwrap();
        store.on_event(insert("a", &[2])).unwrap();
        store.on_event(insert("b", &[3])).unwrap();
        store.on_event(evict("a", &[1])).unwrap();
        assert_eq!(*store.strategy().created.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(store.active_partitions(), 2);

        // a key is created again after it was evicted
        store
            .on_event(WindowEvent::PartitionEviction { key: "a" })
            .unwrap();
        assert_eq!(store.active_partitions(), 1);
        store.on_event(insert("a", &[9])).unwrap();
        assert_eq!(*store.strategy().created.lock().unwrap(), vec!["a", "b", "a"]);
        assert_eq!(store.partition_keys(), vec!["b", "a"]);
    }

    #[test]
    fn trigger_does_not_mutate() {
        let store = WindowStore::new(Recorder::default());
        store.on_event(insert("a", &[1, 2])).unwrap();
        assert_eq!(
            store.on_event(WindowEvent::Trigger { key: "a" }).unwrap(),
            Some(2)
        );
        assert_eq!(
            store.on_event(WindowEvent::Trigger { key: "b" }).unwrap(),
            Some(0)
        );
        store.with_buffer(&"a", |b| assert_eq!(b, &[1, 2]));
        assert_eq!(store.active_partitions(), 1);
    }

    #[test]
    fn hook_sees_window_after_update() {
        let store = WindowStore::new(Recorder::default());
        store.on_event(insert("a", &[1, 2])).unwrap();
        store.on_event(evict("a", &[1])).unwrap();
        store
            .on_event(WindowEvent::PartitionEviction { key: "a" })
            .unwrap();
        let seen = store.strategy().seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (EventKind::Insertion, vec![1, 2]),
                (EventKind::Eviction, vec![2]),
                (EventKind::PartitionEviction, vec![]),
            ]
        );
    }

    #[test]
    fn checkpoint_restores_windows() {
        let mut store: WindowStore<u32, i32, Counter> = WindowStore::new(Counter::default());
        store
            .on_event(WindowEvent::Insertion {
                key: 1,
                tuples: vec![1, 2],
            })
            .unwrap();
        let state = store.checkpoint().unwrap();
        store
            .on_event(WindowEvent::Insertion {
                key: 2,
                tuples: vec![3],
            })
            .unwrap();
        assert_eq!(store.active_partitions(), 2);

        store.restore(Some(state)).unwrap();
        assert_eq!(store.active_partitions(), 1);
        store.with_buffer(&1, |b| assert_eq!(b, &[1, 2]));
        store.with_buffer(&2, |b| assert!(b.is_empty()));

        store.restore(None).unwrap();
        assert_eq!(store.active_partitions(), 0);
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl WindowStrategy<u32, i32> for Counter {
        type Output = ();

        fn on_post_update(
            &self,
            _kind: EventKind,
            _key: &u32,
            _tuples: &[i32],
        ) -> Result<Option<()>, WindowError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[test]
    fn partitions_update_in_parallel() {
        let store = WindowStore::new(Counter::default());
        std::thread::scope(|s| {
            for key in 0..8u32 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..100 {
                        store
                            .on_event(WindowEvent::Insertion {
                                key,
                                tuples: vec![i],
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.active_partitions(), 8);
        for key in 0..8u32 {
            store.with_buffer(&key, |b| assert_eq!(b, (0..100).collect::<Vec<_>>()));
        }
        assert_eq!(store.strategy().0.load(Ordering::SeqCst), 800);
    }
}
