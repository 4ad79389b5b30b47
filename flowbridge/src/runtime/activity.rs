//! Activity trait and the values that flow between activities

use super::bookmark::{Bookmark, BookmarkPayload};
use super::context::ActivityContext;
use crate::fault::Fault;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Shared handle to an activity definition
///
/// Definitions are immutable and may appear in many places of a tree (the
/// retry loop schedules the same body once per attempt); per-execution data
/// lives in the [`ActivityContext`].
pub type ActivityRef = Arc<dyn Activity>;

/// Identifier of one execution of an activity inside a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityInstanceId(u64);

impl ActivityInstanceId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActivityInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed result slot of a completed activity
#[derive(Default)]
pub struct ActivityOutput(Option<Box<dyn Any + Send>>);

impl ActivityOutput {
    /// An output carrying no value
    pub fn empty() -> Self {
        Self(None)
    }

    /// Wrap a value as an activity output
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    /// Whether no value was produced
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Whether the output holds a value of type `T`
    pub fn is<T: Any>(&self) -> bool {
        self.0.as_ref().map(|value| value.is::<T>()).unwrap_or(false)
    }

    /// Borrow the value if it is of type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|value| value.downcast_ref::<T>())
    }

    /// Take the value out if it is of type `T`
    pub fn take<T: Any>(self) -> Option<T> {
        self.0
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl fmt::Debug for ActivityOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("ActivityOutput(<value>)"),
            None => f.write_str("ActivityOutput(<empty>)"),
        }
    }
}

/// How a child activity finished
#[derive(Debug)]
pub enum ChildOutcome {
    /// The child completed and produced an output (possibly empty)
    Closed(ActivityOutput),
    /// The child raised a fault
    Faulted(Fault),
    /// The child was canceled
    Canceled,
}

/// Completion notice delivered to a parent activity
#[derive(Debug)]
pub struct CompletedChild {
    /// Execution id of the child
    pub id: ActivityInstanceId,
    /// Display name of the child
    pub display_name: String,
    /// How the child finished
    pub outcome: ChildOutcome,
}

/// An extension an activity cannot run without
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredExtension {
    pub(crate) type_id: TypeId,
    /// Rust type name of the extension
    pub type_name: &'static str,
}

/// Declarative description an activity gives of itself before execution
///
/// The host collects this for every activity in the tree when an instance
/// is created, so that missing children, bad settings and unavailable
/// extensions are reported before anything runs.
#[derive(Default)]
pub struct ActivityMetadata {
    pub(crate) children: Vec<ActivityRef>,
    pub(crate) required_extensions: Vec<RequiredExtension>,
    pub(crate) errors: Vec<String>,
}

impl ActivityMetadata {
    /// Declare a child activity that may be scheduled
    pub fn add_child(&mut self, child: &ActivityRef) {
        self.children.push(child.clone());
    }

    /// Declare an extension that must be attached to the instance
    pub fn require_extension<E: Any>(&mut self) {
        let required = RequiredExtension {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
        };
        if !self.required_extensions.contains(&required) {
            self.required_extensions.push(required);
        }
    }

    /// Report a configuration problem
    pub fn add_validation_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Declared children
    pub fn children(&self) -> &[ActivityRef] {
        &self.children
    }

    /// Declared extension requirements
    pub fn required_extensions(&self) -> &[RequiredExtension] {
        &self.required_extensions
    }

    /// Reported validation errors
    pub fn validation_errors(&self) -> &[String] {
        &self.errors
    }
}

/// A step of a workflow
///
/// The scheduler calls exactly one of these methods per turn for a given
/// activity execution. An execution completes once a call returns and the
/// activity has no outstanding children and no outstanding bookmarks.
/// Returning an error faults the execution.
pub trait Activity: Send + Sync + 'static {
    /// Name used in logs and tracking records
    fn display_name(&self) -> String;

    /// Describe children, required extensions and validation problems
    fn cache_metadata(&self, _metadata: &mut ActivityMetadata) {}

    /// Whether the workflow may go idle while this activity runs
    fn can_induce_idle(&self) -> bool {
        false
    }

    /// Start the execution
    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault>;

    /// A scheduled child finished
    ///
    /// The default re-raises child faults and ignores everything else.
    fn on_child_completed(
        &self,
        _ctx: &mut ActivityContext<'_>,
        child: CompletedChild,
    ) -> Result<(), Fault> {
        match child.outcome {
            ChildOutcome::Faulted(fault) => Err(fault),
            ChildOutcome::Closed(_) | ChildOutcome::Canceled => Ok(()),
        }
    }

    /// A bookmark created by this execution was resumed
    fn on_bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        bookmark: &Bookmark,
        _payload: BookmarkPayload,
    ) -> Result<(), Fault> {
        tracing::warn!(
            "Activity {} ignored resumption of bookmark {}",
            ctx.display_name(),
            bookmark.name()
        );
        Ok(())
    }

    /// Cancellation was requested
    ///
    /// The default cancels all children and marks this execution canceled.
    fn cancel(&self, ctx: &mut ActivityContext<'_>) {
        ctx.cancel_children();
        ctx.mark_canceled();
    }
}
