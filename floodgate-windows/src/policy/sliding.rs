use std::{collections::VecDeque, num::NonZeroUsize};

use floodgate::{
    snapshot::{deserialize_state, serialize_state, Checkpointable, SnapshotError},
    types::Key,
};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};

use super::WindowPolicy;
use crate::event::WindowEvent;

/// Keeps the last `size` tuples of every partition.
///
/// Once a window is full the oldest tuple is evicted before the new one is inserted.
#[derive(Debug, Clone)]
pub struct SlidingCount<K, T> {
    size: NonZeroUsize,
    windows: IndexMap<K, VecDeque<T>>,
}

impl<K, T> SlidingCount<K, T> {
    /// Window of `size` tuples per partition
    pub fn new(size: NonZeroUsize) -> Self {
        Self {
            size,
            windows: IndexMap::new(),
        }
    }
}

impl<K, T> WindowPolicy<K, T> for SlidingCount<K, T>
where
    K: Key + Serialize + DeserializeOwned,
    T: Clone + Send + Serialize + DeserializeOwned,
{
    fn admit(&mut self, key: K, tuple: T) -> Vec<WindowEvent<K, T>> {
        let window = self.windows.entry(key.clone()).or_default();
        let mut events = Vec::with_capacity(2);
        if window.len() >= self.size.get() {
            if let Some(oldest) = window.pop_front() {
                events.push(WindowEvent::Eviction {
                    key: key.clone(),
                    tuples: vec![oldest],
                });
            }
        }
        window.push_back(tuple.clone());
        events.push(WindowEvent::Insertion {
            key,
            tuples: vec![tuple],
        });
        events
    }
}

impl<K, T> Checkpointable for SlidingCount<K, T>
where
    K: Key + Serialize + DeserializeOwned,
    T: Send + Serialize + DeserializeOwned,
{
    fn checkpoint(&self) -> Result<Vec<u8>, SnapshotError> {
        serialize_state(&self.windows)
    }

    fn restore(&mut self, state: Option<Vec<u8>>) -> Result<(), SnapshotError> {
        self.windows = state
            .map(|s| deserialize_state(&s))
            .transpose()?
            .unwrap_or_default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_before_inserting() {
        let mut policy = SlidingCount::new(NonZeroUsize::new(2).unwrap());
        assert_eq!(policy.admit(0u32, 'a').len(), 1);
        assert_eq!(policy.admit(0u32, 'b').len(), 1);
        assert_eq!(
            policy.admit(0u32, 'c'),
            vec![
                WindowEvent::Eviction {
                    key: 0,
                    tuples: vec!['a']
                },
                WindowEvent::Insertion {
                    key: 0,
                    tuples: vec!['c']
                },
            ]
        );
        // other partitions have their own window
        assert_eq!(policy.admit(1u32, 'x').len(), 1);
    }

    #[test]
    fn restores_windows() {
        let mut policy = SlidingCount::new(NonZeroUsize::new(1).unwrap());
        policy.admit(0u32, 1u8);
        let state = policy.checkpoint().unwrap();
        policy.admit(0u32, 2u8);
        policy.restore(Some(state)).unwrap();
        assert_eq!(
            policy.admit(0u32, 3u8)[0],
            WindowEvent::Eviction {
                key: 0,
                tuples: vec![1]
            }
        );
    }
}
