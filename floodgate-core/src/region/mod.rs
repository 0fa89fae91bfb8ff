//! Consistent regions: groups of operators which are drained, checkpointed and reset together.
//!
//! A [RegionCoordinator] owns the drain/checkpoint/reset state machine of one region. Once
//! started it is controlled through a [RegionHandle], which also implements the generic
//! [RegionControl] control plane.
mod control;
mod coordinator;
mod participant;
mod state;

pub use control::{RegionControl, RegionHandle};
pub use coordinator::{Completed, RegionCoordinator, RegionError};
pub use participant::{ParticipantError, RegionParticipant};
pub use state::{RegionRuntimeState, RegionState};
