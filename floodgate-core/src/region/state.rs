use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::snapshot::CheckpointId;

/// Lifecycle state of a consistent region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionState {
    /// Tuples flow normally
    Running,
    /// Waiting for all in-flight tuples to be processed
    Draining,
    /// Participants are persisting their state
    Checkpointing,
    /// Participants are being restored to the last committed checkpoint
    Resetting,
    /// Too many consecutive resets failed. Only a forced reset leaves this state.
    MaximumResetAttemptsReached,
}

impl Display for RegionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RegionState::Running => "RUNNING",
            RegionState::Draining => "DRAINING",
            RegionState::Checkpointing => "CHECKPOINTING",
            RegionState::Resetting => "RESETTING",
            RegionState::MaximumResetAttemptsReached => "MAXIMUM_RESET_ATTEMPTS_REACHED",
        };
        write!(f, "{name}")
    }
}

/// Runtime bookkeeping of a region, owned by its coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRuntimeState {
    /// Current lifecycle state
    pub state: RegionState,
    /// Resets attempted since the last successful checkpoint or forced reset
    pub consecutive_reset_count: u32,
    /// Version of the last committed checkpoint
    pub last_checkpoint_id: Option<CheckpointId>,
    /// Number of completed resets. Failures observed before a reset completed are already
    /// handled by that reset.
    pub reset_epoch: u64,
}

impl RegionRuntimeState {
    pub(crate) fn new(last_checkpoint_id: Option<CheckpointId>) -> Self {
        Self {
            state: RegionState::Running,
            consecutive_reset_count: 0,
            last_checkpoint_id,
            reset_epoch: 0,
        }
    }

    /// Version the next checkpoint will be written under
    pub(crate) fn next_checkpoint_id(&self) -> CheckpointId {
        self.last_checkpoint_id.map_or(1, |x| x + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_ids_count_up() {
        assert_eq!(RegionRuntimeState::new(None).next_checkpoint_id(), 1);
        assert_eq!(RegionRuntimeState::new(Some(41)).next_checkpoint_id(), 42);
    }
}
