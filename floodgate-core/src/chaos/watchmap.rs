//! Counters shared between tasks which wake a waiter once a condition over all of them holds

use std::{hash::Hash, sync::Arc};

use indexmap::IndexMap;
use tokio::sync::{oneshot, Mutex};

/// A Send + Sync map evaluating registered conditions after every change
#[derive(Clone)]
pub(super) struct WatchMap<K, V> {
    inner: Arc<Mutex<WatchMapInner<K, V>>>,
}

impl<K, V> Default for WatchMap<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(WatchMapInner {
                store: IndexMap::new(),
                waiters: Vec::new(),
            })),
        }
    }
}

impl<K, V> std::fmt::Debug for WatchMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchMap").finish_non_exhaustive()
    }
}

struct WatchMapInner<K, V> {
    store: IndexMap<K, V>,
    waiters: Vec<Waiter<K, V>>,
}

impl<K, V> WatchMapInner<K, V> {
    /// Wake all waiters whose condition now holds and forget about them
    fn wake_satisfied(&mut self) {
        let store = &self.store;
        self.waiters.retain_mut(|w| {
            if (w.condition)(&mut store.iter()) {
                if let Some(tx) = w.wake.take() {
                    // the waiter may have given up, that is fine
                    let _ = tx.send(());
                }
                false
            } else {
                true
            }
        });
    }
}

type Entries<'a, K, V> = indexmap::map::Iter<'a, K, V>;

/// Condition over all entries of a [WatchMap]
type Condition<K, V> = dyn Fn(&mut Entries<'_, K, V>) -> bool + Send + Sync;

struct Waiter<K, V> {
    condition: Box<Condition<K, V>>,
    wake: Option<oneshot::Sender<()>>,
}

impl<K, V> WatchMap<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Default + Send + Sync + 'static,
{
    /// Insert a value, returning the previous one
    pub(super) async fn insert(&self, key: K, value: V) -> Option<V> {
        let mut guard = self.inner.lock().await;
        let prev = guard.store.insert(key, value);
        guard.wake_satisfied();
        prev
    }

    /// Modify the value of `key`, inserting the default value first if it is missing
    pub(super) async fn update(&self, key: K, func: impl FnOnce(&mut V)) {
        let mut guard = self.inner.lock().await;
        func(guard.store.entry(key).or_default());
        guard.wake_satisfied();
    }

    /// Resolves once `condition` holds after some change to the map.
    /// The condition is not evaluated against the current contents.
    pub(super) async fn wait_for(
        &self,
        condition: impl Fn(&mut Entries<'_, K, V>) -> bool + Send + Sync + 'static,
    ) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.waiters.push(Waiter {
            condition: Box::new(condition),
            wake: Some(tx),
        });
        rx
    }
}

impl<K: Clone, V: Clone> WatchMap<K, V> {
    /// Copy of all entries
    pub(super) async fn entries(&self) -> IndexMap<K, V> {
        self.inner.lock().await.store.clone()
    }
}
