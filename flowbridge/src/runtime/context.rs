//! Per-call view of the runtime handed to activities

use super::activity::{ActivityInstanceId, ActivityOutput, ActivityRef};
use super::bookmark::{Bookmark, BookmarkName, NoPersistHandle};
use super::instance::{ActivityNode, InstanceCore, WorkItem};
use super::properties::ExecutionProperties;
use super::{ExecutionEventType, WorkflowInstanceId};
use crate::dispatch::{DispatcherExtension, TaskDispatcher};
use std::any::{Any, TypeId};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Access to the runtime for the duration of one activity callback
///
/// The context is only valid inside the call it was passed to. Anything
/// that outlives the call, such as a background task completing an
/// operation, has to go through the [`InstanceProxy`] instead.
///
/// [`InstanceProxy`]: super::InstanceProxy
pub struct ActivityContext<'a> {
    core: &'a mut InstanceCore,
    node: &'a mut ActivityNode,
    id: ActivityInstanceId,
}

impl<'a> ActivityContext<'a> {
    pub(crate) fn new(
        core: &'a mut InstanceCore,
        node: &'a mut ActivityNode,
        id: ActivityInstanceId,
    ) -> Self {
        Self { core, node, id }
    }

    /// Instance the activity runs in
    pub fn instance_id(&self) -> WorkflowInstanceId {
        self.core.instance_id
    }

    /// Id of this activity execution
    pub fn activity_instance_id(&self) -> ActivityInstanceId {
        self.id
    }

    /// Display name of the executing activity
    pub fn display_name(&self) -> &str {
        &self.node.display_name
    }

    /// Create a bookmark owned by this execution
    ///
    /// The execution stays open until every bookmark it created has been
    /// resumed or removed.
    pub fn create_bookmark(&mut self) -> Bookmark {
        let name = BookmarkName::generate(&self.node.display_name);
        self.core.bookmarks.insert(name.clone(), self.id);
        self.node.bookmarks.push(name.clone());
        self.core.statistics.bookmarks_created += 1;
        tracing::debug!("Created bookmark {}", name);
        self.core.log_event(
            ExecutionEventType::BookmarkCreated,
            format!("{} {} created bookmark {}", self.node.display_name, self.id, name),
        );
        Bookmark::new(name, self.id)
    }

    /// Remove a bookmark without resuming it
    ///
    /// Returns `false` when the bookmark was already resumed or removed.
    pub fn remove_bookmark(&mut self, bookmark: &Bookmark) -> bool {
        if self.core.bookmarks.remove(bookmark.name()).is_none() {
            return false;
        }
        self.node.bookmarks.retain(|name| name != bookmark.name());
        self.core.statistics.bookmarks_removed += 1;
        tracing::debug!("Removed bookmark {}", bookmark.name());
        self.core.log_event(
            ExecutionEventType::BookmarkRemoved,
            format!(
                "{} {} removed bookmark {}",
                self.node.display_name,
                self.id,
                bookmark.name()
            ),
        );
        true
    }

    /// Number of bookmarks this execution still holds
    pub fn pending_bookmarks(&self) -> usize {
        self.node.bookmarks.len()
    }

    /// Open a scope during which the instance must not be persisted
    pub fn enter_no_persist(&mut self) -> NoPersistHandle {
        let handle = self.core.open_no_persist(self.id);
        tracing::trace!("Entered no-persist scope {}", handle.id());
        handle
    }

    /// Close a no-persist scope
    pub fn exit_no_persist(&mut self, handle: NoPersistHandle) {
        if self.core.no_persist.remove(&handle.id()).is_some() {
            self.core.statistics.no_persist_exited += 1;
            tracing::trace!("Exited no-persist scope {}", handle.id());
        } else {
            tracing::warn!(
                "No-persist scope {} of {} was already released",
                handle.id(),
                self.node.display_name
            );
        }
    }

    /// Schedule a child execution
    pub fn schedule_child(&mut self, activity: &ActivityRef) -> ActivityInstanceId {
        self.schedule(activity, None)
    }

    /// Schedule a child execution with an argument it can read through
    /// [`ActivityContext::argument`]
    pub fn schedule_child_with<T: Any + Send>(
        &mut self,
        activity: &ActivityRef,
        argument: T,
    ) -> ActivityInstanceId {
        self.schedule(activity, Some(Box::new(argument)))
    }

    fn schedule(
        &mut self,
        activity: &ActivityRef,
        argument: Option<Box<dyn Any + Send>>,
    ) -> ActivityInstanceId {
        let child = self.core.schedule(
            activity.clone(),
            Some(self.id),
            self.node.properties.clone(),
            argument,
        );
        self.node.children.push(child);
        child
    }

    /// Children scheduled by this execution whose completion has not been
    /// delivered yet
    pub fn active_children(&self) -> &[ActivityInstanceId] {
        &self.node.children
    }

    /// Request cancellation of every active child
    pub fn cancel_children(&mut self) {
        for child in &self.node.children {
            self.core.work.push_back(WorkItem::Cancel(*child));
        }
    }

    /// Request cancellation of one child
    pub fn cancel_child(&mut self, child: ActivityInstanceId) {
        if self.node.children.contains(&child) {
            self.core.work.push_back(WorkItem::Cancel(child));
        }
    }

    /// Store per-execution state of type `T`, replacing any previous value
    /// of that type
    pub fn set_state<T: Any + Send>(&mut self, state: T) {
        self.node.state.insert(TypeId::of::<T>(), Box::new(state));
    }

    /// Borrow per-execution state
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.node
            .state
            .get(&TypeId::of::<T>())
            .and_then(|state| state.downcast_ref())
    }

    /// Mutably borrow per-execution state
    pub fn state_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.node
            .state
            .get_mut(&TypeId::of::<T>())
            .and_then(|state| state.downcast_mut())
    }

    /// Take per-execution state out of the context
    pub fn take_state<T: Any>(&mut self) -> Option<T> {
        self.node
            .state
            .remove(&TypeId::of::<T>())
            .and_then(|state| state.downcast::<T>().ok())
            .map(|state| *state)
    }

    /// Set the typed result of this execution
    pub fn set_result<T: Any + Send>(&mut self, value: T) {
        self.node.output = ActivityOutput::new(value);
    }

    /// Replace the result with an already wrapped output
    pub fn set_output(&mut self, output: ActivityOutput) {
        self.node.output = output;
    }

    /// Argument passed by the parent when scheduling this execution
    pub fn argument<T: Any>(&self) -> Option<&T> {
        self.node.argument.as_ref().and_then(|arg| arg.downcast_ref())
    }

    /// Properties of this execution
    pub fn properties(&self) -> &ExecutionProperties {
        &self.node.properties
    }

    /// Mutable properties; children scheduled afterwards inherit them
    pub fn properties_mut(&mut self) -> &mut ExecutionProperties {
        &mut self.node.properties
    }

    /// Look up an instance extension by type
    pub fn extension<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        self.core.extensions.get::<E>()
    }

    /// Resolve the dispatcher for work started by this execution
    ///
    /// The dispatcher published by the nearest enclosing scope wins over the
    /// host default.
    pub fn dispatcher(&self) -> Option<Arc<dyn TaskDispatcher>> {
        self.node.properties.dispatcher().cloned().or_else(|| {
            self.extension::<DispatcherExtension>()
                .map(|extension| extension.dispatcher().clone())
        })
    }

    /// Tokio runtime the instance is driven on
    pub fn runtime_handle(&self) -> Option<Handle> {
        self.core
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    /// Whether cancellation of this execution was requested
    pub fn is_cancellation_requested(&self) -> bool {
        self.node.cancel_requested
    }

    /// Close this execution as canceled once it has no outstanding work
    pub fn mark_canceled(&mut self) {
        self.node.canceled = true;
    }

    /// Record an activity-defined event in the instance history
    pub fn log_event(&mut self, details: impl Into<String>) {
        self.core.log_event(ExecutionEventType::Custom, details.into());
    }
}
