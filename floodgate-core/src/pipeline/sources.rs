use std::ops::Range;

use super::{ReplayableSource, SourcePoll};
use crate::{
    snapshot::{deserialize_state, serialize_state, Checkpointable, SnapshotError},
    types::Data,
};

/// Replays the records of a vector. The checkpointed state is the read position.
#[derive(Debug, Clone)]
pub struct IterSource<T> {
    records: Vec<T>,
    position: usize,
}

impl<T> IterSource<T> {
    /// Create a source emitting the given records in order
    pub fn new(records: impl IntoIterator<Item = T>) -> Self {
        Self {
            records: records.into_iter().collect(),
            position: 0,
        }
    }
}

impl<T: Data> ReplayableSource<T> for IterSource<T> {
    fn poll(&mut self) -> SourcePoll<T> {
        match self.records.get(self.position) {
            Some(r) => {
                self.position += 1;
                SourcePoll::Ready(r.clone())
            }
            None => SourcePoll::Finished,
        }
    }
}

impl<T: Send> Checkpointable for IterSource<T> {
    fn checkpoint(&self) -> Result<Vec<u8>, SnapshotError> {
        serialize_state(&self.position)
    }

    fn restore(&mut self, state: Option<Vec<u8>>) -> Result<(), SnapshotError> {
        self.position = state.map(|s| deserialize_state(&s)).transpose()?.unwrap_or(0);
        Ok(())
    }
}

/// Emits consecutive numbers, like offsets read from a log
#[derive(Debug, Clone)]
pub struct SequenceSource {
    start: u64,
    end: Option<u64>,
    next: u64,
}

impl SequenceSource {
    /// Emit every number of the range once
    pub fn new(range: Range<u64>) -> Self {
        Self {
            start: range.start,
            end: Some(range.end),
            next: range.start,
        }
    }

    /// Emit numbers from `start` without end
    pub fn unbounded(start: u64) -> Self {
        Self {
            start,
            end: None,
            next: start,
        }
    }
}

impl ReplayableSource<u64> for SequenceSource {
    fn poll(&mut self) -> SourcePoll<u64> {
        if self.end.is_some_and(|e| self.next >= e) {
            return SourcePoll::Finished;
        }
        let value = self.next;
        self.next += 1;
        SourcePoll::Ready(value)
    }
}

impl Checkpointable for SequenceSource {
    fn checkpoint(&self) -> Result<Vec<u8>, SnapshotError> {
        serialize_state(&self.next)
    }

    fn restore(&mut self, state: Option<Vec<u8>>) -> Result<(), SnapshotError> {
        self.next = match state {
            Some(s) => deserialize_state(&s)?,
            None => self.start,
        };
        Ok(())
    }
}
