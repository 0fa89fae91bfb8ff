use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::{Barrier, Restore, SnapshotError};

/// An operator (or group of operators) taking part in a consistent region.
///
/// The coordinator calls these methods in strict sequence, one cycle at a time:
/// `drain` then `checkpoint` then `resume` for a checkpoint, or `reset` then `resume` when the
/// region rewinds. Participants hold no replay detection state of their own; after a reset the
/// source simply replays from its restored position.
#[async_trait]
pub trait RegionParticipant: Send + Sync + 'static {
    /// Name used for logging
    fn name(&self) -> &str;

    /// Stop accepting new tuples and return once everything in flight has been processed
    async fn drain(&self) -> Result<(), ParticipantError>;

    /// Persist all state through the barrier. Only called on a drained participant.
    async fn checkpoint(&self, barrier: &mut Barrier) -> Result<(), ParticipantError>;

    /// Discard all in-flight data and restore the given checkpoint, or the initial state if
    /// `None`. The participant stays paused until [RegionParticipant::resume] is called.
    async fn reset(&self, restore: Option<&Restore>) -> Result<(), ParticipantError>;

    /// Start processing tuples again
    fn resume(&self) {}
}

/// Failure of a participant during a drain/checkpoint/reset cycle
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// Reading or writing checkpoint state failed
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// The participant failed for its own reasons
    #[error("{0}")]
    Failed(String),
}
