//! Events mutating window state
use serde::{Deserialize, Serialize};

/// A change to the window of one partition.
///
/// Events of one partition must be delivered in order. Events of different partitions are
/// independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowEvent<K, T> {
    /// Append tuples to the window, creating it if needed
    Insertion {
        /// Partition of the window
        key: K,
        /// Tuples in arrival order
        tuples: Vec<T>,
    },
    /// Remove as many tuples as given, oldest first
    Eviction {
        /// Partition of the window
        key: K,
        /// The evicted tuples, oldest first
        tuples: Vec<T>,
    },
    /// Drop the window of a partition altogether
    PartitionEviction {
        /// Partition of the window
        key: K,
    },
    /// Fire the window without changing it
    Trigger {
        /// Partition of the window
        key: K,
    },
}

/// Tag of a [WindowEvent]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[allow(missing_docs)]
    Insertion,
    #[allow(missing_docs)]
    Eviction,
    #[allow(missing_docs)]
    PartitionEviction,
    #[allow(missing_docs)]
    Trigger,
}

impl<K, T> WindowEvent<K, T> {
    /// The tag of this event
    pub fn kind(&self) -> EventKind {
        match self {
            WindowEvent::Insertion { .. } => EventKind::Insertion,
            WindowEvent::Eviction { .. } => EventKind::Eviction,
            WindowEvent::PartitionEviction { .. } => EventKind::PartitionEviction,
            WindowEvent::Trigger { .. } => EventKind::Trigger,
        }
    }

    /// The partition this event belongs to
    pub fn key(&self) -> &K {
        match self {
            WindowEvent::Insertion { key, .. }
            | WindowEvent::Eviction { key, .. }
            | WindowEvent::PartitionEviction { key }
            | WindowEvent::Trigger { key } => key,
        }
    }
}
