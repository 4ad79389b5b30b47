//! Suspension points and no-persist handles

use super::activity::ActivityInstanceId;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use ulid::Ulid;

/// Value delivered to an activity when its bookmark is resumed
pub type BookmarkPayload = Box<dyn Any + Send>;

/// Unique name of a bookmark within a workflow instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookmarkName(String);

impl BookmarkName {
    /// Use an explicit name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a unique name with a readable prefix
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}:{}", prefix, Ulid::new()))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookmarkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named suspension point owned by one activity execution
///
/// A bookmark is either resumed once or removed once, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bookmark {
    name: BookmarkName,
    owner: ActivityInstanceId,
}

impl Bookmark {
    pub(crate) fn new(name: BookmarkName, owner: ActivityInstanceId) -> Self {
        Self { name, owner }
    }

    /// Name under which the bookmark is resumed
    pub fn name(&self) -> &BookmarkName {
        &self.name
    }

    /// Execution that created the bookmark
    pub fn owner(&self) -> ActivityInstanceId {
        self.owner
    }
}

/// Proof that a no-persist scope is open
///
/// The handle cannot be cloned; [`ActivityContext::exit_no_persist`]
/// consumes it, so a scope is closed at most once.
///
/// [`ActivityContext::exit_no_persist`]: super::ActivityContext::exit_no_persist
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a no-persist scope stays open until its handle is exited"]
pub struct NoPersistHandle {
    id: u64,
    owner: ActivityInstanceId,
}

impl NoPersistHandle {
    pub(crate) fn new(id: u64, owner: ActivityInstanceId) -> Self {
        Self { id, owner }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Execution that opened the scope
    pub fn owner(&self) -> ActivityInstanceId {
        self.owner
    }
}
