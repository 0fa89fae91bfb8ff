use std::{sync::Arc, time::Duration};

use bon::Builder;
use futures::{future::try_join_all, TryFutureExt};
use itertools::Itertools;
use thiserror::Error;
use tokio::{
    sync::{oneshot, watch},
    time::{timeout, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{
    control::RegionHandle,
    participant::{ParticipantError, RegionParticipant},
    state::{RegionRuntimeState, RegionState},
};
use crate::{
    config::{ConsistentRegionConfig, SubmissionParameters},
    snapshot::{Barrier, CheckpointId, PersistenceBackend, Restore, SnapshotError},
};

/// Coordinates drain, checkpoint and reset of one consistent region.
///
/// # Example
/// ```rust
/// use floodgate::config::ConsistentRegionConfig;
/// use floodgate::region::{RegionControl, RegionCoordinator, RegionState};
/// use floodgate::snapshot::InMemoryBackend;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let region = RegionCoordinator::builder()
///     .name("ingest")
///     .config(ConsistentRegionConfig::operator_driven())
///     .persistence(InMemoryBackend::default())
///     .build()
///     .start();
///
/// let id = region.checkpoint().await.unwrap();
/// assert_eq!(id, 1);
/// assert_eq!(region.state(), RegionState::Running);
/// # });
/// ```
#[derive(Builder)]
pub struct RegionCoordinator<P> {
    #[builder(into)]
    name: String,
    config: ConsistentRegionConfig,
    persistence: P,
    #[builder(default)]
    participants: Vec<Arc<dyn RegionParticipant>>,
    #[builder(default)]
    parameters: SubmissionParameters,
}

impl<P> RegionCoordinator<P>
where
    P: PersistenceBackend,
{
    /// Start coordinating the region on the current tokio runtime.
    /// If the persistence backend holds a committed checkpoint, all participants are restored
    /// from it before any other request is served.
    ///
    /// # Panics
    /// When called outside of a tokio runtime
    pub fn start(self) -> RegionHandle {
        let last_committed = self.persistence.last_committed();
        let (req_tx, req_rx) = flume::bounded(16);
        let (state_tx, state_rx) = watch::channel(RegionRuntimeState::new(last_committed));
        let members = self.participants.iter().map(|p| p.name()).join(", ");

        let coordinator = CoordinatorLoop {
            name: self.name.clone(),
            config: self.config,
            persistence: self.persistence,
            participants: self.participants,
            state: state_tx,
        };
        let mut tasks = vec![tokio::spawn(coordinator.run(req_rx))];

        if let Some(period) = self.config.period_duration() {
            tasks.push(tokio::spawn(periodic_checkpoints(
                self.name.clone(),
                period,
                req_tx.clone(),
            )));
        }
        info!(
            "Started consistent region {} with {} and participants [{members}]",
            self.name, self.config
        );
        RegionHandle::new(
            self.name,
            self.config,
            self.parameters,
            req_tx,
            state_rx,
            tasks,
        )
    }
}

/// Successful outcome of a coordinator request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completed {
    /// A checkpoint with this id was committed
    Checkpoint(CheckpointId),
    /// The region was reset and runs again
    Reset,
}

/// Error returned by region requests
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegionError {
    /// Checkpoints are only taken while the region runs
    #[error("Region is not running, it is {0}")]
    NotRunning(RegionState),
    /// The region gave up resetting itself
    #[error("Maximum consecutive reset attempts reached ({0}), only a forced reset is accepted")]
    MaximumResetAttemptsReached(u32),
    /// A drain/checkpoint cycle failed. The region was reset to its last committed checkpoint.
    #[error("Checkpoint {id} failed and the region was reset: {reason}")]
    CycleFailed {
        /// Id the failed checkpoint would have had
        id: CheckpointId,
        /// Why the cycle failed
        reason: String,
    },
    /// The coordinator task ended, no request can be served
    #[error("Region coordinator is not running")]
    CoordinatorStopped,
}

pub(super) struct CoordinatorRequest {
    callback: oneshot::Sender<Result<Completed, RegionError>>,
    operation: RequestOperation,
}

impl CoordinatorRequest {
    pub(super) async fn send(
        operation: RequestOperation,
        channel: &flume::Sender<CoordinatorRequest>,
    ) -> Result<Completed, RegionError> {
        let (tx, rx) = oneshot::channel();
        let req = CoordinatorRequest {
            callback: tx,
            operation,
        };
        channel
            .send_async(req)
            .await
            .map_err(|_| RegionError::CoordinatorStopped)?;
        rx.await.map_err(|_| RegionError::CoordinatorStopped)?
    }
}

#[derive(Debug, Clone)]
pub(super) enum RequestOperation {
    Checkpoint,
    Reset { force: bool },
    Failure { reason: String, epoch: u64 },
}

/// Reason a drain/checkpoint cycle or a reset attempt failed
#[derive(Debug, Error)]
enum CycleError {
    #[error("{phase} timed out after {seconds}s")]
    Timeout { phase: &'static str, seconds: i64 },
    #[error("participant `{name}` failed to {phase}: {source}")]
    Participant {
        name: String,
        phase: &'static str,
        source: ParticipantError,
    },
    #[error("committing checkpoint failed: {0}")]
    Commit(#[from] SnapshotError),
}

async fn periodic_checkpoints(
    name: String,
    period: Duration,
    requests: flume::Sender<CoordinatorRequest>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        match CoordinatorRequest::send(RequestOperation::Checkpoint, &requests).await {
            Ok(_) => debug!("Periodic checkpoint of region {name} completed"),
            Err(RegionError::CoordinatorStopped) => {
                error!(
                    "Region {name} coordinator stopped. No further periodic checkpoints will be attempted"
                );
                break;
            }
            Err(e) => warn!("Periodic checkpoint of region {name} skipped: {e}"),
        }
    }
}

struct CoordinatorLoop<P> {
    name: String,
    config: ConsistentRegionConfig,
    persistence: P,
    participants: Vec<Arc<dyn RegionParticipant>>,
    state: watch::Sender<RegionRuntimeState>,
}

impl<P> CoordinatorLoop<P>
where
    P: PersistenceBackend,
{
    async fn run(mut self, requests: flume::Receiver<CoordinatorRequest>) {
        if let Some(version) = self.current().last_checkpoint_id {
            info!("Restoring region {} from checkpoint {version}", self.name);
            if let Err(e) = self.reset(true).await {
                error!("Initial restore of region {} failed: {e}", self.name);
            }
        }

        // requests are handled one at a time, so cycles never overlap
        while let Ok(req) = requests.recv_async().await {
            let result = match req.operation {
                RequestOperation::Checkpoint => self.checkpoint().await.map(Completed::Checkpoint),
                RequestOperation::Reset { force } => {
                    self.reset(force).await.map(|_| Completed::Reset)
                }
                RequestOperation::Failure { reason, epoch } => {
                    if epoch < self.current().reset_epoch {
                        debug!(
                            "Ignoring failure in region {} which a later reset undid: {reason}",
                            self.name
                        );
                        Ok(Completed::Reset)
                    } else {
                        warn!("Operator failure in region {}: {reason}", self.name);
                        self.reset(false).await.map(|_| Completed::Reset)
                    }
                }
            };
            // the requester may have stopped waiting, which is fine
            let _ = req.callback.send(result);
        }
        debug!("Coordinator of region {} stopped", self.name);
    }

    #[inline]
    fn current(&self) -> RegionRuntimeState {
        *self.state.borrow()
    }

    fn set_state(&self, state: RegionState) {
        self.state.send_modify(|s| s.state = state);
    }

    fn resume_all(&self) {
        for p in self.participants.iter() {
            p.resume();
        }
    }

    async fn checkpoint(&mut self) -> Result<CheckpointId, RegionError> {
        let current = self.current();
        if current.state != RegionState::Running {
            return Err(RegionError::NotRunning(current.state));
        }
        let id = current.next_checkpoint_id();
        debug!("Starting checkpoint {id} of region {}", self.name);

        match self.drain_and_checkpoint(id).await {
            Ok(()) => {
                self.state.send_modify(|s| {
                    s.state = RegionState::Running;
                    s.consecutive_reset_count = 0;
                    s.last_checkpoint_id = Some(id);
                });
                self.resume_all();
                info!("Committed checkpoint {id} of region {}", self.name);
                Ok(id)
            }
            Err(e) => {
                warn!("Checkpoint {id} of region {} failed: {e}", self.name);
                self.reset(false).await?;
                Err(RegionError::CycleFailed {
                    id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn drain_and_checkpoint(&self, id: CheckpointId) -> Result<(), CycleError> {
        let budget = self.config.drain_timeout_duration();
        let seconds = self.config.drain_timeout();

        self.set_state(RegionState::Draining);
        let drains = self.participants.iter().map(|p| {
            p.drain().map_err(|source| CycleError::Participant {
                name: p.name().to_string(),
                phase: "drain",
                source,
            })
        });
        timeout(budget, try_join_all(drains))
            .await
            .map_err(|_| CycleError::Timeout {
                phase: "drain",
                seconds,
            })??;

        self.set_state(RegionState::Checkpointing);
        let mut barrier = Barrier::new(id, Box::new(self.persistence.for_version(id)));
        let checkpoints = async {
            for p in self.participants.iter() {
                p.checkpoint(&mut barrier)
                    .await
                    .map_err(|source| CycleError::Participant {
                        name: p.name().to_string(),
                        phase: "checkpoint",
                        source,
                    })?;
            }
            Ok::<(), CycleError>(())
        };
        timeout(budget, checkpoints)
            .await
            .map_err(|_| CycleError::Timeout {
                phase: "checkpoint",
                seconds,
            })??;

        self.persistence.commit_version(id)?;
        Ok(())
    }

    /// Restore every participant from the last committed checkpoint
    async fn restore_all(&self) -> Result<(), CycleError> {
        let restore = self
            .current()
            .last_checkpoint_id
            .map(|v| Restore::new(v, Box::new(self.persistence.for_version(v))));

        self.set_state(RegionState::Resetting);
        let resets = self.participants.iter().map(|p| {
            p.reset(restore.as_ref())
                .map_err(|source| CycleError::Participant {
                    name: p.name().to_string(),
                    phase: "reset",
                    source,
                })
        });
        timeout(self.config.reset_timeout_duration(), try_join_all(resets))
            .await
            .map_err(|_| CycleError::Timeout {
                phase: "reset",
                seconds: self.config.reset_timeout(),
            })??;
        Ok(())
    }

    fn finish_reset(&self) {
        self.state.send_modify(|s| {
            s.state = RegionState::Running;
            s.reset_epoch += 1;
        });
        self.resume_all();
    }

    async fn reset(&mut self, force: bool) -> Result<(), RegionError> {
        let current = self.current();
        if force {
            info!("Forced reset of region {}", self.name);
            self.state.send_modify(|s| s.consecutive_reset_count = 0);
            match self.restore_all().await {
                Ok(()) => {
                    self.finish_reset();
                    return Ok(());
                }
                Err(e) => warn!("Forced reset of region {} failed: {e}", self.name),
            }
        } else if current.state == RegionState::MaximumResetAttemptsReached {
            return Err(RegionError::MaximumResetAttemptsReached(
                current.consecutive_reset_count,
            ));
        }

        loop {
            self.state.send_modify(|s| s.consecutive_reset_count += 1);
            let attempt = self.current().consecutive_reset_count;
            if attempt >= self.config.max_consecutive_reset_attempts() {
                self.set_state(RegionState::MaximumResetAttemptsReached);
                error!(
                    "Region {} reached the maximum of {attempt} consecutive reset attempts and stopped",
                    self.name
                );
                return Err(RegionError::MaximumResetAttemptsReached(attempt));
            }
            match self.restore_all().await {
                Ok(()) => {
                    self.finish_reset();
                    info!("Reset region {} (attempt {attempt})", self.name);
                    return Ok(());
                }
                Err(e) => warn!("Reset attempt {attempt} of region {} failed: {e}", self.name),
            }
        }
    }
}
