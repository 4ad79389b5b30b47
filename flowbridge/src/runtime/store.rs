//! Instance store seam
//!
//! The runtime does not define a state persistence format. At idle points it
//! hands an [`InstanceSnapshot`] describing the instance to whichever
//! [`InstanceStore`] the host was built with.

use super::bookmark::BookmarkName;
use super::instance::{InstanceStatistics, InstanceStatus};
use super::{RuntimeError, RuntimeResult, WorkflowInstanceId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// What an instance looked like when it was persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    /// Instance the snapshot belongs to
    pub instance_id: WorkflowInstanceId,
    /// Display name of the root activity
    pub root_activity: String,
    /// Status at capture time
    pub status: InstanceStatus,
    /// Bookmarks waiting for resumption
    pub pending_bookmarks: Vec<BookmarkName>,
    /// Counters at capture time
    pub statistics: InstanceStatistics,
    /// When the snapshot was taken
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// Durable storage for instance snapshots
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Save a snapshot, replacing any previous one for the same instance
    async fn save(&self, snapshot: &InstanceSnapshot) -> RuntimeResult<()>;

    /// Load the latest snapshot of an instance
    async fn load(&self, instance_id: &WorkflowInstanceId) -> RuntimeResult<InstanceSnapshot>;

    /// Delete the snapshot of an instance
    async fn delete(&self, instance_id: &WorkflowInstanceId) -> RuntimeResult<()>;
}

/// Process-local store, mainly for tests and the CLI
#[derive(Debug, Default)]
pub struct InMemoryInstanceStore {
    snapshots: DashMap<WorkflowInstanceId, InstanceSnapshot>,
}

impl InMemoryInstanceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn save(&self, snapshot: &InstanceSnapshot) -> RuntimeResult<()> {
        self.snapshots.insert(snapshot.instance_id, snapshot.clone());
        Ok(())
    }

    async fn load(&self, instance_id: &WorkflowInstanceId) -> RuntimeResult<InstanceSnapshot> {
        self.snapshots
            .get(instance_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::Store(format!("No snapshot for instance {}", instance_id)))
    }

    async fn delete(&self, instance_id: &WorkflowInstanceId) -> RuntimeResult<()> {
        self.snapshots
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::Store(format!("No snapshot for instance {}", instance_id)))
    }
}
