//! A minimal in-region dataflow: one replayable source feeding a chain of stages.
//!
//! A [Pipeline] is a [RegionParticipant]. Draining pauses it after the tuple currently in
//! flight, a checkpoint stores the source position together with the state of every stage
//! which declares one, and a reset restores both so the source replays everything after the
//! checkpoint.
use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::Mutex, task::yield_now};
use tracing::{debug, error, info, warn};

use crate::{
    region::{ParticipantError, RegionHandle, RegionParticipant},
    snapshot::{Barrier, CheckpointTrigger, Checkpointable, NoCheckpoints, Restore, SnapshotError},
    types::Data,
};

mod sources;
mod stages;

pub use sources::{IterSource, SequenceSource};
pub use stages::{CollectSink, FilterStage, MapStage};

/// Wait time when the source has nothing to emit or the pipeline is paused
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Result of polling a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll<T> {
    /// The next record
    Ready(T),
    /// Nothing available right now
    Pending,
    /// The source is exhausted
    Finished,
}

/// A source which can rewind to a checkpointed position and replay from there.
pub trait ReplayableSource<T>: Checkpointable {
    /// Get the next record, advancing the position
    fn poll(&mut self) -> SourcePoll<T>;
}

/// Collects the records a stage emits
#[derive(Debug)]
pub struct Output<T> {
    records: Vec<T>,
}

impl<T> Default for Output<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T> Output<T> {
    /// Emit a record to the next stage
    pub fn send(&mut self, record: T) {
        self.records.push(record);
    }

    /// Take all records emitted so far
    pub fn into_records(self) -> Vec<T> {
        self.records
    }
}

/// One processing step of a pipeline.
///
/// Stages are stateless unless they return their state from [Stage::state]. Only declared state
/// is checkpointed and restored, anything else a stage keeps survives resets unchanged and would
/// break replay.
pub trait Stage<T>: Send {
    /// Process one record, emitting any number of records
    fn process(&mut self, record: T, output: &mut Output<T>) -> Result<(), OperatorError>;

    /// The checkpointed state of this stage
    fn state(&mut self) -> Option<&mut dyn Checkpointable> {
        None
    }
}

impl<T, F> Stage<T> for F
where
    F: FnMut(T, &mut Output<T>) -> Result<(), OperatorError> + Send,
{
    fn process(&mut self, record: T, output: &mut Output<T>) -> Result<(), OperatorError> {
        self(record, output)
    }
}

/// Error raised by a stage. It fails the pipeline and resets its region.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Failure described by a message
    #[error("{0}")]
    Failed(String),
    /// Error returned by user code
    #[error(transparent)]
    User(Box<dyn Error + Send + Sync>),
    /// Wraps the error of a named pipeline stage
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        /// Name of the failing stage
        stage: String,
        /// What went wrong
        source: Box<OperatorError>,
    },
}

/// What a single [Pipeline::step] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A record went through all stages
    Emitted {
        /// The checkpoint trigger asked for a checkpoint
        checkpoint_requested: bool,
    },
    /// The source had nothing to emit
    Idle,
    /// The pipeline is drained or being reset
    Paused,
    /// The source is exhausted
    Finished,
}

struct PipelineInner<T> {
    source: Box<dyn ReplayableSource<T>>,
    stages: Vec<(String, Box<dyn Stage<T>>)>,
    trigger: Box<dyn CheckpointTrigger>,
}

impl<T> PipelineInner<T> {
    fn process(&mut self, record: T) -> Result<(), OperatorError> {
        let mut batch = vec![record];
        for (name, stage) in self.stages.iter_mut() {
            let mut output = Output::default();
            for r in batch.drain(..) {
                stage
                    .process(r, &mut output)
                    .map_err(|e| OperatorError::Stage {
                        stage: name.clone(),
                        source: Box::new(e),
                    })?;
            }
            batch = output.into_records();
        }
        Ok(())
    }
}

/// A source and a chain of stages running inside a consistent region
pub struct Pipeline<T> {
    name: String,
    inner: Mutex<PipelineInner<T>>,
    paused: AtomicBool,
    /// A record was lost to a failing stage, the state must not be checkpointed before a reset
    failed: AtomicBool,
    throttle: Option<Duration>,
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("paused", &self.paused.load(Ordering::Relaxed))
            .finish()
    }
}

/// Builder for a [Pipeline]
pub struct PipelineBuilder<T> {
    name: String,
    source: Box<dyn ReplayableSource<T>>,
    stages: Vec<(String, Box<dyn Stage<T>>)>,
    trigger: Box<dyn CheckpointTrigger>,
    throttle: Option<Duration>,
}

impl<T: Data> PipelineBuilder<T> {
    /// Append a stage
    pub fn stage(mut self, name: impl Into<String>, stage: impl Stage<T> + 'static) -> Self {
        self.stages.push((name.into(), Box::new(stage)));
        self
    }

    /// Trigger evaluated after every emitted record. If it fires the pipeline requests a
    /// checkpoint of its region. Only meaningful for operator-driven regions.
    pub fn trigger(mut self, trigger: impl CheckpointTrigger) -> Self {
        self.trigger = Box::new(trigger);
        self
    }

    /// Wait this long after each emitted record
    pub fn throttle(mut self, delay: Duration) -> Self {
        self.throttle = Some(delay);
        self
    }

    /// Finish building
    pub fn build(self) -> Arc<Pipeline<T>> {
        Arc::new(Pipeline {
            name: self.name,
            inner: Mutex::new(PipelineInner {
                source: self.source,
                stages: self.stages,
                trigger: self.trigger,
            }),
            paused: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            throttle: self.throttle,
        })
    }
}

impl<T: Data> Pipeline<T> {
    /// Start building a pipeline reading from `source`
    pub fn builder(
        name: impl Into<String>,
        source: impl ReplayableSource<T> + 'static,
    ) -> PipelineBuilder<T> {
        PipelineBuilder {
            name: name.into(),
            source: Box::new(source),
            stages: Vec::new(),
            trigger: Box::new(NoCheckpoints),
            throttle: None,
        }
    }

    /// Name of the pipeline
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the pipeline is drained or being reset
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Move one record from the source through all stages
    pub async fn step(&self) -> Result<StepOutcome, OperatorError> {
        if self.is_paused() {
            return Ok(StepOutcome::Paused);
        }
        let mut inner = self.inner.lock().await;
        // we may have been drained while waiting for the lock
        if self.is_paused() {
            return Ok(StepOutcome::Paused);
        }
        let record = match inner.source.poll() {
            SourcePoll::Ready(r) => r,
            SourcePoll::Pending => return Ok(StepOutcome::Idle),
            SourcePoll::Finished => return Ok(StepOutcome::Finished),
        };
        if let Err(e) = inner.process(record) {
            self.failed.store(true, Ordering::SeqCst);
            self.paused.store(true, Ordering::SeqCst);
            return Err(e);
        }
        let checkpoint_requested = inner.trigger.should_trigger();
        Ok(StepOutcome::Emitted {
            checkpoint_requested,
        })
    }

    /// Drive the pipeline until its source is exhausted.
    ///
    /// Stage errors are reported to the region, which resets every participant (this pipeline
    /// included) before the loop continues with the replayed records.
    pub async fn run(self: Arc<Self>, region: RegionHandle) {
        info!("Starting pipeline {}", self.name);
        loop {
            match self.step().await {
                Ok(StepOutcome::Emitted {
                    checkpoint_requested,
                }) => {
                    if checkpoint_requested {
                        match region.checkpoint().await {
                            Ok(id) => debug!("Pipeline {} requested checkpoint {id}", self.name),
                            Err(e) => {
                                warn!("Checkpoint requested by pipeline {} failed: {e}", self.name)
                            }
                        }
                    }
                    match self.throttle {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => yield_now().await,
                    }
                }
                Ok(StepOutcome::Idle) | Ok(StepOutcome::Paused) => {
                    tokio::time::sleep(IDLE_BACKOFF).await
                }
                Ok(StepOutcome::Finished) => {
                    info!("Pipeline {} finished", self.name);
                    return;
                }
                Err(e) => {
                    // a reset completing after this point already undid the failure
                    let epoch = region.runtime_state().reset_epoch;
                    error!("Pipeline {} failed: {e}", self.name);
                    if let Err(e) = region.report_failure_at(epoch, e.to_string()).await {
                        error!("Region of pipeline {} could not be reset: {e}", self.name);
                    }
                }
            }
        }
    }

    fn state_key(&self, part: &str) -> String {
        format!("{}/{part}", self.name)
    }
}

fn load(restore: Option<&Restore>, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
    Ok(restore.map(|r| r.load_bytes(key)).transpose()?.flatten())
}

#[async_trait]
impl<T: Data> RegionParticipant for Pipeline<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn drain(&self) -> Result<(), ParticipantError> {
        self.paused.store(true, Ordering::SeqCst);
        // returns once the record in flight has passed all stages
        let _inner = self.inner.lock().await;
        Ok(())
    }

    async fn checkpoint(&self, barrier: &mut Barrier) -> Result<(), ParticipantError> {
        let mut inner = self.inner.lock().await;
        if self.failed.load(Ordering::SeqCst) {
            return Err(ParticipantError::Failed(format!(
                "pipeline {} failed since the last reset",
                self.name
            )));
        }
        barrier.persist_bytes(&inner.source.checkpoint()?, &self.state_key("source"))?;
        for (name, stage) in inner.stages.iter_mut() {
            if let Some(state) = stage.state() {
                barrier.persist_bytes(&state.checkpoint()?, &self.state_key(name))?;
            }
        }
        Ok(())
    }

    async fn reset(&self, restore: Option<&Restore>) -> Result<(), ParticipantError> {
        self.paused.store(true, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        let source_state = load(restore, &self.state_key("source"))?;
        inner.source.restore(source_state)?;
        for (name, stage) in inner.stages.iter_mut() {
            if let Some(state) = stage.state() {
                state.restore(load(restore, &self.state_key(name))?)?;
            }
        }
        self.failed.store(false, Ordering::SeqCst);
        debug!(
            "Pipeline {} reset to {:?}",
            self.name,
            restore.map(Restore::version)
        );
        Ok(())
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}
