use std::sync::{Arc, Mutex, PoisonError};

use serde::{de::DeserializeOwned, Serialize};

use super::{OperatorError, Output, Stage};
use crate::snapshot::{deserialize_state, serialize_state, Checkpointable, SnapshotError};

/// Forwards records matching a predicate
pub struct FilterStage<F>(F);

impl<F> FilterStage<F> {
    /// Keep records for which `predicate` returns true
    pub fn new(predicate: F) -> Self {
        Self(predicate)
    }
}

impl<T, F> Stage<T> for FilterStage<F>
where
    F: FnMut(&T) -> bool + Send,
{
    fn process(&mut self, record: T, output: &mut Output<T>) -> Result<(), OperatorError> {
        if (self.0)(&record) {
            output.send(record);
        }
        Ok(())
    }
}

/// Applies a function to every record
pub struct MapStage<F>(F);

impl<F> MapStage<F> {
    /// Map every record with `mapper`
    pub fn new(mapper: F) -> Self {
        Self(mapper)
    }
}

impl<T, F> Stage<T> for MapStage<F>
where
    F: FnMut(T) -> T + Send,
{
    fn process(&mut self, record: T, output: &mut Output<T>) -> Result<(), OperatorError> {
        output.send((self.0)(record));
        Ok(())
    }
}

/// A sink writing every record into a shared vector.
///
/// The vector is part of the checkpoint, so after a reset it holds exactly what was collected
/// up to the restored checkpoint. Clones share the same vector.
#[derive(Debug)]
pub struct CollectSink<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CollectSink<T> {
    /// Create an empty sink
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of collected records
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing was collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> CollectSink<T> {
    /// Copy of all collected records
    pub fn values(&self) -> Vec<T> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> Stage<T> for CollectSink<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    fn process(&mut self, record: T, _output: &mut Output<T>) -> Result<(), OperatorError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    fn state(&mut self) -> Option<&mut dyn Checkpointable> {
        Some(self)
    }
}

impl<T> Checkpointable for CollectSink<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    fn checkpoint(&self) -> Result<Vec<u8>, SnapshotError> {
        serialize_state(&*self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn restore(&mut self, state: Option<Vec<u8>>) -> Result<(), SnapshotError> {
        let restored: Vec<T> = state
            .map(|s| deserialize_state(&s))
            .transpose()?
            .unwrap_or_default();
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_and_map() {
        let mut out = Output::default();
        let mut filter = FilterStage::new(|x: &u64| x % 2 == 0);
        for i in 0..5 {
            filter.process(i, &mut out).unwrap();
        }
        let mut mapped = Output::default();
        let mut map = MapStage::new(|x: u64| x + 100);
        for r in out.into_records() {
            map.process(r, &mut mapped).unwrap();
        }
        assert_eq!(mapped.into_records(), vec![100, 102, 104]);
    }

    #[test]
    fn sink_checkpoints_contents() {
        let mut sink = CollectSink::new();
        let handle = sink.clone();
        let mut out = Output::default();
        sink.process(1u64, &mut out).unwrap();
        let state = sink.checkpoint().unwrap();
        sink.process(2u64, &mut out).unwrap();
        assert_eq!(handle.values(), vec![1, 2]);

        sink.restore(Some(state)).unwrap();
        assert_eq!(handle.values(), vec![1]);
        sink.restore(None).unwrap();
        assert!(handle.is_empty());
    }
}
