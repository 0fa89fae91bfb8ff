//! Checkpoints are periodically saved state from the stateful operators of a region.
//! Regular checkpoints allow rewinding the computation after failures.
//!
//! Floodgate does not define a storage format. A [PersistenceBackend] stores one opaque byte
//! blob per operator and checkpoint version and returns the latest committed version on restore.

mod memory;
pub mod triggers;

pub use memory::InMemoryBackend;
pub use triggers::{CheckpointTrigger, EveryN, IntervalCheckpoints, NoCheckpoints};

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use thiserror::Error;

use crate::types::OperatorId;

/// Version of a checkpoint. Versions of committed checkpoints increase monotonically.
pub type CheckpointId = u64;

/// Encode operator state for a checkpoint
pub fn serialize_state<S: Serialize>(state: &S) -> Result<Vec<u8>, SnapshotError> {
    Ok(rmp_serde::to_vec(state)?)
}

/// Decode operator state from a checkpoint
pub fn deserialize_state<S: DeserializeOwned>(state: &[u8]) -> Result<S, SnapshotError> {
    Ok(rmp_serde::from_slice(state)?)
}

/// Errors writing or reading checkpoint state
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// State could not be encoded
    #[error("Error serializing state")]
    Encode(#[from] rmp_serde::encode::Error),
    /// State could not be decoded
    #[error("Error deserializing state")]
    Decode(#[from] rmp_serde::decode::Error),
    /// The storage behind the backend failed
    #[error("Persistence backend failed: {0}")]
    Backend(String),
}

/// A persistence backend provides persistent storage for storing checkpoints across resets
/// and job restarts.
/// This may be on a local disk, remote storage, a database or anything really which can reliably
/// store data
pub trait PersistenceBackend: Send + Sync + 'static {
    /// Client for this backend. The client is used to store and load state from the backend.
    type Client: PersistenceClient;
    /// Return the version of the last committed checkpoint or `None` if no version has been
    /// committed yet.
    fn last_committed(&self) -> Option<CheckpointId>;
    /// Create a client for a loading/saving state for a specific checkpoint version
    fn for_version(&self, version: CheckpointId) -> Self::Client;
    /// Mark a specific checkpoint version as finished
    fn commit_version(&self, version: CheckpointId) -> Result<(), SnapshotError>;
}

/// A client for saving checkpoint data to and loading that data from a persistent storage
pub trait PersistenceClient: Send + Sync + 'static {
    /// Load the state for the given operator, returning `None` if no state exists for this
    /// operator in persistent storage
    fn load(&self, operator_id: &OperatorId) -> Result<Option<Vec<u8>>, SnapshotError>;
    /// Retain the given state for the given operator.
    fn persist(&mut self, state: &[u8], operator_id: &OperatorId) -> Result<(), SnapshotError>;
}

/// State which can be written into a checkpoint and restored from one.
///
/// Implementing this trait is how an operator declares it holds mutable state. Stateless
/// operators simply do not implement it.
pub trait Checkpointable: Send {
    /// Encode the current state
    fn checkpoint(&self) -> Result<Vec<u8>, SnapshotError>;
    /// Replace the current state with the given one, or with the initial state if `None`
    fn restore(&mut self, state: Option<Vec<u8>>) -> Result<(), SnapshotError>;
}

/// Handed to every participant during the checkpoint phase of a cycle.
/// All state persisted through one barrier belongs to the same checkpoint version.
pub struct Barrier {
    version: CheckpointId,
    client: Box<dyn PersistenceClient>,
}

impl Debug for Barrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Barrier")
            .field("version", &self.version)
            .finish()
    }
}

impl Barrier {
    pub(crate) fn new(version: CheckpointId, client: Box<dyn PersistenceClient>) -> Self {
        Self { version, client }
    }

    /// Version of the checkpoint being taken
    pub fn version(&self) -> CheckpointId {
        self.version
    }

    /// Persist the given state for the given operator.
    pub fn persist<S: Serialize>(
        &mut self,
        state: &S,
        operator_id: &OperatorId,
    ) -> Result<(), SnapshotError> {
        let encoded = serialize_state(state)?;
        self.client.persist(&encoded, operator_id)
    }

    /// Persist already encoded state for the given operator.
    pub fn persist_bytes(
        &mut self,
        state: &[u8],
        operator_id: &OperatorId,
    ) -> Result<(), SnapshotError> {
        self.client.persist(state, operator_id)
    }
}

/// Handed to every participant when a region is reset to a committed checkpoint
pub struct Restore {
    version: CheckpointId,
    client: Box<dyn PersistenceClient>,
}

impl Debug for Restore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Restore")
            .field("version", &self.version)
            .finish()
    }
}

impl Restore {
    pub(crate) fn new(version: CheckpointId, client: Box<dyn PersistenceClient>) -> Self {
        Self { version, client }
    }

    /// Version of the checkpoint being restored
    pub fn version(&self) -> CheckpointId {
        self.version
    }

    /// Load and decode the state of an operator
    pub fn load<S: DeserializeOwned>(
        &self,
        operator_id: &OperatorId,
    ) -> Result<Option<S>, SnapshotError> {
        self.client
            .load(operator_id)?
            .map(|raw| deserialize_state(&raw))
            .transpose()
    }

    /// Load the encoded state of an operator
    pub fn load_bytes(&self, operator_id: &OperatorId) -> Result<Option<Vec<u8>>, SnapshotError> {
        self.client.load(operator_id)
    }
}

/// A persistence backend which does not retain any data. Every reset rewinds the region
/// to its initial state. This is mostly useful for testing or situations where you always
/// want to restart the job statelessly
#[derive(Clone, Debug, Default)]
pub struct NoPersistence;
impl PersistenceBackend for NoPersistence {
    type Client = NoPersistence;

    fn last_committed(&self) -> Option<CheckpointId> {
        None
    }

    fn for_version(&self, _version: CheckpointId) -> Self {
        NoPersistence
    }

    fn commit_version(&self, _version: CheckpointId) -> Result<(), SnapshotError> {
        Ok(())
    }
}

impl PersistenceClient for NoPersistence {
    fn load(&self, _operator_id: &OperatorId) -> Result<Option<Vec<u8>>, SnapshotError> {
        Ok(None)
    }

    fn persist(&mut self, _state: &[u8], _operator_id: &OperatorId) -> Result<(), SnapshotError> {
        Ok(())
    }
}
