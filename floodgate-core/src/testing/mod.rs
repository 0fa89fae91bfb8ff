//! Helpers for unit tests
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;

use crate::{
    region::{ParticipantError, RegionParticipant},
    snapshot::{Barrier, Restore},
};

/// A participant which records every call and can be told to fail or hang in each phase
#[derive(Default)]
pub(crate) struct FlakyParticipant {
    name: String,
    calls: Mutex<Vec<String>>,
    pub(crate) fail_checkpoint: AtomicBool,
    pub(crate) fail_reset: AtomicBool,
    pub(crate) hang_drain: AtomicBool,
    pub(crate) hang_checkpoint: AtomicBool,
    pub(crate) hang_reset: AtomicBool,
}

impl FlakyParticipant {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// All calls received so far
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl RegionParticipant for FlakyParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn drain(&self) -> Result<(), ParticipantError> {
        self.record("drain");
        if self.hang_drain.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn checkpoint(&self, barrier: &mut Barrier) -> Result<(), ParticipantError> {
        self.record(format!("checkpoint {}", barrier.version()));
        if self.hang_checkpoint.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_checkpoint.load(Ordering::SeqCst) {
            return Err(ParticipantError::Failed("checkpoint failed".into()));
        }
        barrier.persist(&self.name, &self.name)?;
        Ok(())
    }

    async fn reset(&self, restore: Option<&Restore>) -> Result<(), ParticipantError> {
        match restore {
            Some(r) => self.record(format!("reset {}", r.version())),
            None => self.record("reset initial"),
        }
        if self.hang_reset.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(ParticipantError::Failed("reset failed".into()));
        }
        Ok(())
    }

    fn resume(&self) {
        self.record("resume");
    }
}
