//! Minimal host runtime for tree-structured, resumable workflows
//!
//! A [`WorkflowInstance`] owns a tree of activity executions and drives it
//! cooperatively: one work item at a time, on one task, with no locks around
//! tree state. Activities suspend by creating bookmarks; anything outside the
//! scheduler turn talks to the instance only through an [`InstanceProxy`].

mod activity;
mod bookmark;
mod context;
pub mod extensions;
mod host;
mod instance;
mod properties;
pub mod store;

use thiserror::Error;
use ulid::Ulid;

pub use activity::{
    Activity, ActivityInstanceId, ActivityMetadata, ActivityOutput, ActivityRef, ChildOutcome,
    CompletedChild, RequiredExtension,
};
pub use bookmark::{Bookmark, BookmarkName, BookmarkPayload, NoPersistHandle};
pub use context::ActivityContext;
pub use extensions::{Extensions, InstanceProxy, SuspensionExtension};
pub use host::{WorkflowHost, WorkflowHostBuilder};
pub use instance::{
    InstanceStatistics, InstanceStatus, RunState, WorkflowInstance, WorkflowOutcome,
};
pub use properties::ExecutionProperties;
pub use store::{InMemoryInstanceStore, InstanceSnapshot, InstanceStore};

/// Errors raised by the host runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The activity tree failed validation before execution
    #[error("Workflow validation failed: {0}")]
    ValidationFailed(String),
    /// No pending bookmark carries the given name
    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),
    /// The instance no longer accepts signals
    #[error("Workflow instance {0} is unavailable")]
    InstanceUnavailable(WorkflowInstanceId),
    /// A persist was requested while no-persist scopes are active
    #[error("Persistence is blocked by {active} active no-persist scope(s)")]
    PersistenceBlocked {
        /// Number of active no-persist scopes
        active: usize,
    },
    /// The instance already reached a final state
    #[error("Workflow instance {0} is already closed")]
    InstanceClosed(WorkflowInstanceId),
    /// The instance store failed
    #[error("Instance store error: {0}")]
    Store(String),
    /// The operation needs a tokio runtime and none is available
    #[error("No tokio runtime is available")]
    NoRuntime,
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Default maximum execution history size to prevent unbounded growth
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 10000;

/// Default number of work items processed before yielding to tokio
pub const DEFAULT_MAX_TURN_ITEMS: usize = 1024;

/// Unique identifier for workflow instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct WorkflowInstanceId(Ulid);

impl WorkflowInstanceId {
    /// Create a new random instance ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse an instance ID from its string representation
    pub fn parse(s: &str) -> Result<Self, String> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| format!("Invalid workflow instance ID '{}': {}", s, e))
    }
}

impl Default for WorkflowInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event recorded while an instance runs
#[derive(Debug, Clone)]
pub struct ExecutionEvent {
    /// When the event occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Type of execution event
    pub event_type: ExecutionEventType,
    /// Human-readable details about the event
    pub details: String,
}

/// Types of events recorded in an instance history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEventType {
    /// Instance started executing its root activity
    Started,
    /// An activity execution was scheduled
    ActivityScheduled,
    /// An activity execution closed
    ActivityCompleted,
    /// An activity execution faulted
    ActivityFaulted,
    /// An activity execution closed as canceled
    ActivityCanceled,
    /// A bookmark was created
    BookmarkCreated,
    /// A bookmark was resumed
    BookmarkResumed,
    /// A bookmark was removed without being resumed
    BookmarkRemoved,
    /// A resumption arrived for a bookmark that no longer exists
    StaleResumption,
    /// The scheduler ran out of work
    Idle,
    /// A snapshot was written to the instance store
    Persisted,
    /// A persist was skipped because of active no-persist scopes
    PersistBlocked,
    /// Cancellation of the instance was requested
    CancelRequested,
    /// Instance reached a final state
    Closed,
    /// Activity-defined event
    Custom,
}

impl std::fmt::Display for ExecutionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionEventType::Started => "Started",
            ExecutionEventType::ActivityScheduled => "ActivityScheduled",
            ExecutionEventType::ActivityCompleted => "ActivityCompleted",
            ExecutionEventType::ActivityFaulted => "ActivityFaulted",
            ExecutionEventType::ActivityCanceled => "ActivityCanceled",
            ExecutionEventType::BookmarkCreated => "BookmarkCreated",
            ExecutionEventType::BookmarkResumed => "BookmarkResumed",
            ExecutionEventType::BookmarkRemoved => "BookmarkRemoved",
            ExecutionEventType::StaleResumption => "StaleResumption",
            ExecutionEventType::Idle => "Idle",
            ExecutionEventType::Persisted => "Persisted",
            ExecutionEventType::PersistBlocked => "PersistBlocked",
            ExecutionEventType::CancelRequested => "CancelRequested",
            ExecutionEventType::Closed => "Closed",
            ExecutionEventType::Custom => "Custom",
        };
        write!(f, "{s}")
    }
}
