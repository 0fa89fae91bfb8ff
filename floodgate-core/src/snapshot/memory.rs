use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;

use super::{CheckpointId, PersistenceBackend, PersistenceClient, SnapshotError};
use crate::types::OperatorId;

type VersionStore = IndexMap<String, Vec<u8>>;

#[derive(Default, Debug)]
struct Inner {
    versions: IndexMap<CheckpointId, VersionStore>,
    committed: Option<CheckpointId>,
}

/// A backend which keeps checkpoints in memory.
///
/// Committing a version discards all older versions, since a region only ever restores the
/// latest committed checkpoint. Clones share the same storage.
#[derive(Default, Clone, Debug)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    /// Number of versions currently held, committed or not
    pub fn retained_versions(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .versions
            .len()
    }
}

impl PersistenceBackend for InMemoryBackend {
    type Client = InMemoryClient;

    fn last_committed(&self) -> Option<CheckpointId> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .committed
    }

    fn for_version(&self, version: CheckpointId) -> InMemoryClient {
        InMemoryClient {
            version,
            inner: Arc::clone(&self.inner),
        }
    }

    fn commit_version(&self, version: CheckpointId) -> Result<(), SnapshotError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.committed.is_some_and(|c| c > version) {
            return Err(SnapshotError::Backend(format!(
                "Can not commit version {version}, version {} is already committed",
                inner.committed.unwrap_or_default()
            )));
        }
        inner.versions.entry(version).or_default();
        inner.versions.retain(|v, _| *v >= version);
        inner.committed = Some(version);
        Ok(())
    }
}

/// Client reading and writing one version of an [InMemoryBackend]
#[derive(Debug)]
pub struct InMemoryClient {
    version: CheckpointId,
    inner: Arc<Mutex<Inner>>,
}

impl PersistenceClient for InMemoryClient {
    fn load(&self, operator_id: &OperatorId) -> Result<Option<Vec<u8>>, SnapshotError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .versions
            .get(&self.version)
            .and_then(|store| store.get(operator_id))
            .cloned())
    }

    fn persist(&mut self, state: &[u8], operator_id: &OperatorId) -> Result<(), SnapshotError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .versions
            .entry(self.version)
            .or_default()
            .insert(operator_id.to_owned(), state.to_vec());
        Ok(())
    }
}
