use std::num::NonZeroUsize;

use floodgate::{
    snapshot::{deserialize_state, serialize_state, Checkpointable, SnapshotError},
    types::Key,
};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};

use super::WindowPolicy;
use crate::event::WindowEvent;

/// Collects `size` tuples per partition, fires, then empties the window
#[derive(Debug, Clone)]
pub struct TumblingCount<K, T> {
    size: NonZeroUsize,
    windows: IndexMap<K, Vec<T>>,
}

impl<K, T> TumblingCount<K, T> {
    /// Window of `size` tuples per partition
    pub fn new(size: NonZeroUsize) -> Self {
        Self {
            size,
            windows: IndexMap::new(),
        }
    }
}

impl<K, T> WindowPolicy<K, T> for TumblingCount<K, T>
where
    K: Key + Serialize + DeserializeOwned,
    T: Clone + Send + Serialize + DeserializeOwned,
{
    fn admit(&mut self, key: K, tuple: T) -> Vec<WindowEvent<K, T>> {
        let window = self.windows.entry(key.clone()).or_default();
        window.push(tuple.clone());
        let mut events = vec![WindowEvent::Insertion {
            key: key.clone(),
            tuples: vec![tuple],
        }];
        if window.len() >= self.size.get() {
            events.push(WindowEvent::Trigger { key: key.clone() });
            events.push(WindowEvent::Eviction {
                key,
                tuples: std::mem::take(window),
            });
        }
        events
    }
}

impl<K, T> Checkpointable for TumblingCount<K, T>
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
