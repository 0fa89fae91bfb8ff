use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};

use super::{
    coordinator::{Completed, CoordinatorRequest, RegionError, RequestOperation},
    state::{RegionRuntimeState, RegionState},
};
use crate::{
    config::{ConsistentRegionConfig, SubmissionParameters, Trigger},
    snapshot::CheckpointId,
};

/// Control plane of a consistent region.
///
/// This is what external tooling (and the chaos [Resetter](crate::chaos::Resetter)) uses to
/// observe and reset a region. How calls reach the region is up to the implementation.
#[async_trait]
pub trait RegionControl: Send + Sync {
    /// Name of the region
    fn name(&self) -> &str;

    /// Reset the region to its last committed checkpoint. A region which reached the maximum
    /// of consecutive reset attempts only accepts forced resets.
    async fn reset(&self, force: bool) -> Result<(), RegionError>;

    /// Current lifecycle state
    fn state(&self) -> RegionState;

    /// How the region is triggered
    fn trigger(&self) -> Trigger;

    /// Trigger period in seconds, `-1` if operator-driven
    fn period(&self) -> i64;
}

/// Aborts the coordinator tasks once the last handle is dropped
struct TaskGuard(Vec<JoinHandle<()>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for task in self.0.iter() {
            task.abort();
        }
    }
}

/// Handle to a running [RegionCoordinator](super::RegionCoordinator).
///
/// Handles are cheap to clone. The coordinator stops when the last handle is dropped.
#[derive(Clone)]
pub struct RegionHandle {
    name: Arc<str>,
    config: ConsistentRegionConfig,
    parameters: Arc<SubmissionParameters>,
    requests: flume::Sender<CoordinatorRequest>,
    state: watch::Receiver<RegionRuntimeState>,
    _tasks: Arc<TaskGuard>,
}

impl std::fmt::Debug for RegionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionHandle")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl RegionHandle {
    pub(super) fn new(
        name: String,
        config: ConsistentRegionConfig,
        parameters: SubmissionParameters,
        requests: flume::Sender<CoordinatorRequest>,
        state: watch::Receiver<RegionRuntimeState>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            parameters: Arc::new(parameters),
            requests,
            state,
            _tasks: Arc::new(TaskGuard(tasks)),
        }
    }

    /// Run a drain/checkpoint cycle now and return the id of the committed checkpoint.
    /// If the cycle fails the region is reset before this returns.
    pub async fn checkpoint(&self) -> Result<CheckpointId, RegionError> {
        match CoordinatorRequest::send(RequestOperation::Checkpoint, &self.requests).await? {
            Completed::Checkpoint(id) => Ok(id),
            Completed::Reset => Err(RegionError::CoordinatorStopped),
        }
    }

    /// Report a failed operator. The region is reset before this returns.
    pub async fn report_failure(&self, reason: impl Into<String>) -> Result<(), RegionError> {
        let epoch = self.runtime_state().reset_epoch;
        self.report_failure_at(epoch, reason).await
    }

    /// Report an operator failure which happened while the region was at reset epoch `epoch`.
    ///
    /// If a reset completed since then the failure was already undone and the report is
    /// dropped without counting another reset attempt.
    pub async fn report_failure_at(
        &self,
        epoch: u64,
        reason: impl Into<String>,
    ) -> Result<(), RegionError> {
        let operation = RequestOperation::Failure {
            reason: reason.into(),
            epoch,
        };
        CoordinatorRequest::send(operation, &self.requests)
            .await
            .map(|_| ())
    }

    /// Snapshot of the runtime bookkeeping
    pub fn runtime_state(&self) -> RegionRuntimeState {
        *self.state.borrow()
    }

    /// Wait until the runtime state satisfies `condition`
    pub async fn wait_for(
        &self,
        condition: impl FnMut(&RegionRuntimeState) -> bool,
    ) -> Result<RegionRuntimeState, RegionError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(condition)
            .await
            .map_err(|_| RegionError::CoordinatorStopped)?;
        Ok(*state)
    }

    /// Configuration the region was started with
    pub fn config(&self) -> &ConsistentRegionConfig {
        &self.config
    }

    /// Parameters the region was submitted with
    pub fn parameters(&self) -> &SubmissionParameters {
        &self.parameters
    }
}

#[async_trait]
impl RegionControl for RegionHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reset(&self, force: bool) -> Result<(), RegionError> {
        CoordinatorRequest::send(RequestOperation::Reset { force }, &self.requests)
            .await
            .map(|_| ())
    }

    fn state(&self) -> RegionState {
        self.state.borrow().state
    }

    fn trigger(&self) -> Trigger {
        self.config.trigger()
    }

    fn period(&self) -> i64 {
        self.config.period()
    }
}
