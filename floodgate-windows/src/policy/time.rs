use std::{collections::VecDeque, time::Duration};

use floodgate::{
    snapshot::{deserialize_state, serialize_state, Checkpointable, SnapshotError},
    types::Key,
};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};

use super::{processing_time, WindowPolicy};
use crate::event::WindowEvent;

/// Keeps the tuples of the last `size` of processing time per partition.
///
/// Time is measured in milliseconds since the UNIX epoch. Expired tuples are evicted when a
/// partition receives a tuple or when [SlidingTime::advance] is called; `advance` also drops
/// partitions whose window became empty.
#[derive(Debug, Clone)]
pub struct SlidingTime<K, T> {
    size_ms: u64,
    windows: IndexMap<K, VecDeque<(u64, T)>>,
}

impl<K, T> SlidingTime<K, T>
where
    K: Key,
    T: Clone,
{
    /// Window spanning `size` of processing time
    pub fn new(size: Duration) -> Self {
        Self {
            size_ms: u64::try_from(size.as_millis()).unwrap_or(u64::MAX),
            windows: IndexMap::new(),
        }
    }

    /// Admit `tuple` as if it arrived at `now_ms`
    pub fn admit_at(&mut self, key: K, tuple: T, now_ms: u64) -> Vec<WindowEvent<K, T>> {
        let cutoff = now_ms.saturating_sub(self.size_ms);
        let window = self.windows.entry(key.clone()).or_default();
        let mut events = Vec::with_capacity(2);
        let expired = expire(window, cutoff);
        if !expired.is_empty() {
            events.push(WindowEvent::Eviction {
                key: key.clone(),
                tuples: expired,
            });
        }
        window.push_back((now_ms, tuple.clone()));
        events.push(WindowEvent::Insertion {
            key,
            tuples: vec![tuple],
        });
        events
    }

    /// Evict everything older than `size` before `now_ms` from all partitions
    pub fn advance(&mut self, now_ms: u64) -> Vec<WindowEvent<K, T>> {
        let cutoff = now_ms.saturating_sub(self.size_ms);
        let mut events = Vec::new();
        self.windows.retain(|key, window| {
            let expired = expire(window, cutoff);
            if !expired.is_empty() {
                events.push(WindowEvent::Eviction {
                    key: key.clone(),
                    tuples: expired,
                });
            }
            if window.is_empty() {
                events.push(WindowEvent::PartitionEviction { key: key.clone() });
                false
            } else {
                true
            }
        });
        events
    }
}

/// Remove and return all tuples at or before `cutoff`, oldest first
fn expire<T>(window: &mut VecDeque<(u64, T)>, cutoff: u64) -> Vec<T> {
    let split = window.partition_point(|(t, _)| *t <= cutoff);
    window.drain(..split).map(|(_, x)| x).collect()
}

impl<K, T> WindowPolicy<K, T> for SlidingTime<K, T>
where
    K: Key + Serialize + DeserializeOwned,
    T: Clone + Send + Serialize + DeserializeOwned,
{
    fn admit(&mut self, key: K, tuple: T) -> Vec<WindowEvent<K, T>> {
        self.admit_at(key, tuple, processing_time())
    }

    fn advance(&mut self, now_ms: u64) -> Vec<WindowEvent<K, T>> {
        SlidingTime::advance(self, now_ms)
    }
}

impl<K, T> Checkpointable for SlidingTime<K, T>
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
    fn expires_old_tuples_on_insert() {
        let mut policy = SlidingTime::new(Duration::from_millis(100));
        policy.admit_at(0u32, 'a', 1000);
        policy.admit_at(0u32, 'b', 1050);
        let events = policy.admit_at(0u32, 'c', 1120);
        assert_eq!(
            events,
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
    }

    #[test]
    fn advance_drops_empty_partitions() {
        let mut policy = SlidingTime::new(Duration::from_millis(100));
        policy.admit_at("a", 1, 1000);
        policy.admit_at("b", 2, 1080);
        let events = policy.advance(1150);
        assert_eq!(
            events,
            vec![
                WindowEvent::Eviction {
                    key: "a",
                    tuples: vec![1]
                },
                WindowEvent::PartitionEviction { key: "a" },
            ]
        );
        assert!(policy.advance(1150).is_empty());
        assert_eq!(policy.advance(1200).len(), 2);
    }

    #[test]
    fn admit_uses_wall_clock() {
        let mut policy = SlidingTime::new(Duration::from_secs(60));
        let events = policy.admit(1u8, 'n');
        assert_eq!(events.len(), 1);
        assert!(processing_time() > 0);
    }
}
