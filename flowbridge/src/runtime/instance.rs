//! Workflow instance scheduler

use super::activity::{
    Activity, ActivityInstanceId, ActivityOutput, ActivityRef, ChildOutcome, CompletedChild,
};
use super::bookmark::{Bookmark, BookmarkName, BookmarkPayload, NoPersistHandle};
use super::context::ActivityContext;
use super::extensions::{Extensions, InstanceProxy, InstanceSignal};
use super::properties::ExecutionProperties;
use super::store::{InstanceSnapshot, InstanceStore};
use super::{ExecutionEvent, ExecutionEventType, RuntimeError, RuntimeResult, WorkflowInstanceId};
use crate::config::HostConfig;
use crate::fault::Fault;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Lifecycle status of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// Created but not started
    Created,
    /// Processing work items
    Running,
    /// Waiting for a bookmark to be resumed
    Idle,
    /// Root activity completed
    Completed,
    /// Root activity faulted
    Faulted,
    /// Root activity was canceled
    Canceled,
}

impl InstanceStatus {
    /// Whether the instance reached a final state
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Completed | InstanceStatus::Faulted | InstanceStatus::Canceled
        )
    }
}

/// Counters kept for every instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatistics {
    /// Activity executions scheduled
    pub activities_scheduled: u64,
    /// Executions that closed normally
    pub activities_completed: u64,
    /// Executions that faulted
    pub activities_faulted: u64,
    /// Executions that closed as canceled
    pub activities_canceled: u64,
    /// Executions torn down because an ancestor faulted
    pub activities_aborted: u64,
    /// Bookmarks created
    pub bookmarks_created: u64,
    /// Bookmarks resumed
    pub bookmarks_resumed: u64,
    /// Bookmarks removed without resumption, including forced removals
    pub bookmarks_removed: u64,
    /// Resumptions that found no bookmark
    pub stale_resumptions: u64,
    /// No-persist scopes opened
    pub no_persist_entered: u64,
    /// No-persist scopes closed by their owner
    pub no_persist_exited: u64,
    /// No-persist scopes released by the host after their owner closed
    pub no_persist_released: u64,
    /// Times the scheduler ran out of work
    pub idle_count: u64,
    /// Snapshots written to the store
    pub persist_count: u64,
    /// Persists skipped because a no-persist scope was active
    pub persist_blocked: u64,
}

/// Final result of a workflow instance
#[derive(Debug)]
pub enum WorkflowOutcome {
    /// The root activity completed with this output
    Completed(ActivityOutput),
    /// The root activity faulted
    Faulted(Fault),
    /// The root activity was canceled
    Canceled,
}

impl WorkflowOutcome {
    /// Whether the root completed normally
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkflowOutcome::Completed(_))
    }

    /// Whether the root faulted
    pub fn is_faulted(&self) -> bool {
        matches!(self, WorkflowOutcome::Faulted(_))
    }

    /// Whether the root was canceled
    pub fn is_canceled(&self) -> bool {
        matches!(self, WorkflowOutcome::Canceled)
    }

    /// The fault, if the root faulted
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            WorkflowOutcome::Faulted(fault) => Some(fault),
            _ => None,
        }
    }

    /// The output, if the root completed
    pub fn output(&self) -> Option<&ActivityOutput> {
        match self {
            WorkflowOutcome::Completed(output) => Some(output),
            _ => None,
        }
    }

    /// Status the instance closed with
    pub fn status(&self) -> InstanceStatus {
        match self {
            WorkflowOutcome::Completed(_) => InstanceStatus::Completed,
            WorkflowOutcome::Faulted(_) => InstanceStatus::Faulted,
            WorkflowOutcome::Canceled => InstanceStatus::Canceled,
        }
    }
}

impl From<ChildOutcome> for WorkflowOutcome {
    fn from(outcome: ChildOutcome) -> Self {
        match outcome {
            ChildOutcome::Closed(output) => WorkflowOutcome::Completed(output),
            ChildOutcome::Faulted(fault) => WorkflowOutcome::Faulted(fault),
            ChildOutcome::Canceled => WorkflowOutcome::Canceled,
        }
    }
}

/// Where [`WorkflowInstance::run_until_idle`] stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No work is left until a bookmark is resumed
    Idle {
        /// Bookmarks waiting for resumption
        pending_bookmarks: usize,
    },
    /// The instance reached a final state
    Closed,
}

/// One live activity execution
pub(crate) struct ActivityNode {
    pub(crate) activity: ActivityRef,
    pub(crate) display_name: String,
    pub(crate) parent: Option<ActivityInstanceId>,
    pub(crate) children: Vec<ActivityInstanceId>,
    pub(crate) bookmarks: Vec<BookmarkName>,
    pub(crate) state: HashMap<TypeId, Box<dyn Any + Send>>,
    pub(crate) argument: Option<Box<dyn Any + Send>>,
    pub(crate) output: ActivityOutput,
    pub(crate) properties: ExecutionProperties,
    pub(crate) cancel_requested: bool,
    pub(crate) canceled: bool,
}

pub(crate) enum WorkItem {
    Execute(ActivityInstanceId),
    ChildCompleted {
        parent: ActivityInstanceId,
        child: CompletedChild,
    },
    Resume {
        name: BookmarkName,
        payload: BookmarkPayload,
    },
    Cancel(ActivityInstanceId),
}

/// Tree state shared between the scheduler and activity contexts
pub(crate) struct InstanceCore {
    pub(crate) instance_id: WorkflowInstanceId,
    pub(crate) nodes: HashMap<ActivityInstanceId, ActivityNode>,
    pub(crate) bookmarks: HashMap<BookmarkName, ActivityInstanceId>,
    pub(crate) no_persist: HashMap<u64, ActivityInstanceId>,
    pub(crate) work: VecDeque<WorkItem>,
    pub(crate) extensions: Extensions,
    pub(crate) runtime: Option<Handle>,
    pub(crate) statistics: InstanceStatistics,
    history: Vec<ExecutionEvent>,
    max_history_size: usize,
    next_activity_id: u64,
    next_no_persist_id: u64,
}

impl InstanceCore {
    fn new(
        instance_id: WorkflowInstanceId,
        extensions: Extensions,
        max_history_size: usize,
    ) -> Self {
        Self {
            instance_id,
            nodes: HashMap::new(),
            bookmarks: HashMap::new(),
            no_persist: HashMap::new(),
            work: VecDeque::new(),
            extensions,
            runtime: None,
            statistics: InstanceStatistics::default(),
            history: Vec::new(),
            max_history_size,
            next_activity_id: 0,
            next_no_persist_id: 0,
        }
    }

    /// Log an execution event
    pub(crate) fn log_event(&mut self, event_type: ExecutionEventType, details: String) {
        tracing::debug!("{}: {}", event_type, &details);
        let event = ExecutionEvent {
            timestamp: chrono::Utc::now(),
            event_type,
            details,
        };
        self.history.push(event);

        // Trim history if it exceeds max size
        if self.history.len() > self.max_history_size {
            let trim_count = self.history.len() - self.max_history_size;
            self.history.drain(0..trim_count);
        }
    }

    pub(crate) fn schedule(
        &mut self,
        activity: ActivityRef,
        parent: Option<ActivityInstanceId>,
        properties: ExecutionProperties,
        argument: Option<Box<dyn Any + Send>>,
    ) -> ActivityInstanceId {
        self.next_activity_id += 1;
        let id = ActivityInstanceId::new(self.next_activity_id);
        let display_name = activity.display_name();
        self.statistics.activities_scheduled += 1;
        self.log_event(
            ExecutionEventType::ActivityScheduled,
            format!("Scheduled {} {}", display_name, id),
        );
        self.nodes.insert(
            id,
            ActivityNode {
                activity,
                display_name,
                parent,
                children: Vec::new(),
                bookmarks: Vec::new(),
                state: HashMap::new(),
                argument,
                output: ActivityOutput::empty(),
                properties,
                cancel_requested: false,
                canceled: false,
            },
        );
        self.work.push_back(WorkItem::Execute(id));
        id
    }

    pub(crate) fn open_no_persist(&mut self, owner: ActivityInstanceId) -> NoPersistHandle {
        self.next_no_persist_id += 1;
        let id = self.next_no_persist_id;
        self.no_persist.insert(id, owner);
        self.statistics.no_persist_entered += 1;
        NoPersistHandle::new(id, owner)
    }

    /// Release scopes an execution left open when it stopped
    fn release_no_persist_of(&mut self, owner: ActivityInstanceId) {
        let before = self.no_persist.len();
        self.no_persist.retain(|_, scope_owner| *scope_owner != owner);
        let released = (before - self.no_persist.len()) as u64;
        if released > 0 {
            tracing::warn!(
                "Released {} no-persist scope(s) left open by activity {}",
                released,
                owner
            );
            self.statistics.no_persist_released += released;
        }
    }

    /// Remove bookmarks of an execution that stopped without resuming them
    fn retire_bookmarks(&mut self, owner: ActivityInstanceId, names: &[BookmarkName]) {
        for name in names {
            if self.bookmarks.remove(name).is_some() {
                self.statistics.bookmarks_removed += 1;
                tracing::debug!("Removed bookmark {} of stopped activity {}", name, owner);
                self.log_event(
                    ExecutionEventType::BookmarkRemoved,
                    format!("Removed bookmark {} of stopped activity {}", name, owner),
                );
            }
        }
    }
}

/// A running workflow
///
/// Created by [`WorkflowHost::create_instance`]. The instance processes one
/// work item at a time on the task that drives it; it is never shared.
///
/// [`WorkflowHost::create_instance`]: super::WorkflowHost::create_instance
pub struct WorkflowInstance {
    core: InstanceCore,
    root: ActivityRef,
    root_name: String,
    root_id: Option<ActivityInstanceId>,
    signals: mpsc::UnboundedReceiver<InstanceSignal>,
    proxy: InstanceProxy,
    store: Option<Arc<dyn InstanceStore>>,
    persist_on_idle: bool,
    max_turn_items: usize,
    can_induce_idle: bool,
    status: InstanceStatus,
    outcome: Option<WorkflowOutcome>,
}

impl WorkflowInstance {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        instance_id: WorkflowInstanceId,
        root: ActivityRef,
        extensions: Extensions,
        proxy: InstanceProxy,
        signals: mpsc::UnboundedReceiver<InstanceSignal>,
        store: Option<Arc<dyn InstanceStore>>,
        config: &HostConfig,
        can_induce_idle: bool,
    ) -> Self {
        let root_name = root.display_name();
        Self {
            core: InstanceCore::new(instance_id, extensions, config.max_history_size),
            root,
            root_name,
            root_id: None,
            signals,
            proxy,
            store,
            persist_on_idle: config.persist_on_idle,
            max_turn_items: config.max_turn_items.max(1),
            can_induce_idle,
            status: InstanceStatus::Created,
            outcome: None,
        }
    }

    /// Instance id
    pub fn id(&self) -> WorkflowInstanceId {
        self.core.instance_id
    }

    /// Display name of the root activity
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Current lifecycle status
    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Proxy for resuming bookmarks and canceling from other threads
    pub fn proxy(&self) -> InstanceProxy {
        self.proxy.clone()
    }

    /// Execution history, oldest first
    pub fn history(&self) -> &[ExecutionEvent] {
        &self.core.history
    }

    /// Counters collected so far
    pub fn statistics(&self) -> &InstanceStatistics {
        &self.core.statistics
    }

    /// Whether any activity in the tree may leave the instance idle
    pub fn can_induce_idle(&self) -> bool {
        self.can_induce_idle
    }

    /// Names of bookmarks waiting for resumption, sorted
    pub fn pending_bookmarks(&self) -> Vec<BookmarkName> {
        let mut names: Vec<_> = self.core.bookmarks.keys().cloned().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
    }

    /// Number of open no-persist scopes
    pub fn active_no_persist(&self) -> usize {
        self.core.no_persist.len()
    }

    /// Outcome of a closed instance that has not been taken by [`run`]
    ///
    /// [`run`]: WorkflowInstance::run
    pub fn outcome(&self) -> Option<&WorkflowOutcome> {
        self.outcome.as_ref()
    }

    /// Resume a pending bookmark from the driving task
    pub fn resume_bookmark(
        &mut self,
        name: &BookmarkName,
        payload: BookmarkPayload,
    ) -> RuntimeResult<()> {
        if self.status.is_closed() {
            return Err(RuntimeError::InstanceClosed(self.id()));
        }
        if !self.core.bookmarks.contains_key(name) {
            return Err(RuntimeError::BookmarkNotFound(name.to_string()));
        }
        self.core.work.push_back(WorkItem::Resume {
            name: name.clone(),
            payload,
        });
        Ok(())
    }

    /// Request cancellation of the root activity
    ///
    /// Takes effect on the next call to [`run`] or [`run_until_idle`].
    ///
    /// [`run`]: WorkflowInstance::run
    /// [`run_until_idle`]: WorkflowInstance::run_until_idle
    pub fn cancel(&mut self) -> RuntimeResult<()> {
        if self.status.is_closed() {
            return Err(RuntimeError::InstanceClosed(self.id()));
        }
        self.start();
        self.request_cancel();
        Ok(())
    }

    /// Capture the current state for the instance store
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            instance_id: self.id(),
            root_activity: self.root_name.clone(),
            status: self.status,
            pending_bookmarks: self.pending_bookmarks(),
            statistics: self.core.statistics.clone(),
            captured_at: chrono::Utc::now(),
        }
    }

    /// Persist the instance now
    ///
    /// Fails with [`RuntimeError::PersistenceBlocked`] while any no-persist
    /// scope is open.
    pub async fn try_persist(&mut self) -> RuntimeResult<()> {
        let active = self.core.no_persist.len();
        if active > 0 {
            self.core.statistics.persist_blocked += 1;
            self.core.log_event(
                ExecutionEventType::PersistBlocked,
                format!("Persist blocked by {} no-persist scope(s)", active),
            );
            return Err(RuntimeError::PersistenceBlocked { active });
        }
        let store = self
            .store
            .clone()
            .ok_or_else(|| RuntimeError::Store("no instance store is configured".to_string()))?;
        store.save(&self.snapshot()).await?;
        self.core.statistics.persist_count += 1;
        self.core.log_event(
            ExecutionEventType::Persisted,
            format!("Persisted instance {}", self.id()),
        );
        Ok(())
    }

    /// Process work until the instance closes or has nothing left to do
    pub async fn run_until_idle(&mut self) -> RuntimeResult<RunState> {
        if self.status.is_closed() {
            return Ok(RunState::Closed);
        }
        if self.core.runtime.is_none() {
            self.core.runtime = Some(Handle::try_current().map_err(|_| RuntimeError::NoRuntime)?);
        }
        self.start();
        self.status = InstanceStatus::Running;
        self.drain().await;

        if self.outcome.is_some() {
            if self.store.is_some() {
                self.try_persist().await?;
            }
            return Ok(RunState::Closed);
        }

        self.status = InstanceStatus::Idle;
        self.on_idle().await?;
        Ok(RunState::Idle {
            pending_bookmarks: self.core.bookmarks.len(),
        })
    }

    /// Run the instance to completion, waiting for resumptions while idle
    pub async fn run(&mut self) -> RuntimeResult<WorkflowOutcome> {
        loop {
            match self.run_until_idle().await? {
                RunState::Closed => {
                    return self
                        .outcome
                        .take()
                        .ok_or(RuntimeError::InstanceClosed(self.id()));
                }
                RunState::Idle { .. } => self.wait_for_signal().await?,
            }
        }
    }

    fn start(&mut self) {
        if self.root_id.is_some() {
            return;
        }
        let root_id = self
            .core
            .schedule(self.root.clone(), None, ExecutionProperties::default(), None);
        self.root_id = Some(root_id);
        tracing::info!("Starting workflow instance {} ({})", self.id(), self.root_name);
        self.core.log_event(
            ExecutionEventType::Started,
            format!("Started workflow: {}", self.root_name),
        );
    }

    fn request_cancel(&mut self) {
        if let Some(root_id) = self.root_id {
            self.core.log_event(
                ExecutionEventType::CancelRequested,
                format!("Cancellation requested for {}", self.root_name),
            );
            self.core.work.push_back(WorkItem::Cancel(root_id));
        }
    }

    async fn wait_for_signal(&mut self) -> RuntimeResult<()> {
        match self.signals.recv().await {
            Some(signal) => {
                self.accept_signal(signal);
                Ok(())
            }
            None => Err(RuntimeError::InstanceUnavailable(self.id())),
        }
    }

    fn accept_signal(&mut self, signal: InstanceSignal) {
        match signal {
            InstanceSignal::ResumeBookmark { name, payload } => {
                self.core.work.push_back(WorkItem::Resume { name, payload });
            }
            InstanceSignal::Cancel => self.request_cancel(),
        }
    }

    async fn drain(&mut self) {
        let mut processed = 0;
        loop {
            while let Ok(signal) = self.signals.try_recv() {
                self.accept_signal(signal);
            }
            let Some(item) = self.core.work.pop_front() else {
                break;
            };
            self.process(item);
            if self.outcome.is_some() {
                self.core.work.clear();
                break;
            }
            processed += 1;
            if processed >= self.max_turn_items {
                processed = 0;
                tokio::task::yield_now().await;
            }
        }
    }

    async fn on_idle(&mut self) -> RuntimeResult<()> {
        self.core.statistics.idle_count += 1;
        let pending = self.core.bookmarks.len();
        self.core.log_event(
            ExecutionEventType::Idle,
            format!("Idle with {} pending bookmark(s)", pending),
        );
        if pending == 0 {
            tracing::warn!(
                "Workflow instance {} is idle without pending bookmarks",
                self.id()
            );
        }

        if self.persist_on_idle && self.store.is_some() {
            match self.try_persist().await {
                Ok(()) => {}
                Err(RuntimeError::PersistenceBlocked { active }) => {
                    tracing::debug!("Skipped idle persist: {} no-persist scope(s) open", active);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn process(&mut self, item: WorkItem) {
        match item {
            WorkItem::Execute(id) => self.invoke(id, |activity, ctx| activity.execute(ctx)),
            WorkItem::ChildCompleted { parent, child } => {
                if let Some(node) = self.core.nodes.get_mut(&parent) {
                    node.children.retain(|id| *id != child.id);
                }
                self.invoke(parent, move |activity, ctx| {
                    activity.on_child_completed(ctx, child)
                });
            }
            WorkItem::Resume { name, payload } => self.resume(name, payload),
            WorkItem::Cancel(id) => {
                match self.core.nodes.get_mut(&id) {
                    Some(node) if !node.cancel_requested => node.cancel_requested = true,
                    _ => return,
                }
                self.invoke(id, |activity, ctx| {
                    activity.cancel(ctx);
                    Ok(())
                });
            }
        }
    }

    fn resume(&mut self, name: BookmarkName, payload: BookmarkPayload) {
        let Some(owner) = self.core.bookmarks.remove(&name) else {
            self.core.statistics.stale_resumptions += 1;
            tracing::warn!("Dropping resumption of unknown bookmark {}", name);
            self.core.log_event(
                ExecutionEventType::StaleResumption,
                format!("No pending bookmark named {}", name),
            );
            return;
        };
        if let Some(node) = self.core.nodes.get_mut(&owner) {
            node.bookmarks.retain(|pending| *pending != name);
        }
        self.core.statistics.bookmarks_resumed += 1;
        self.core.log_event(
            ExecutionEventType::BookmarkResumed,
            format!("Resumed bookmark {}", name),
        );
        let bookmark = Bookmark::new(name, owner);
        self.invoke(owner, move |activity, ctx| {
            activity.on_bookmark_resumed(ctx, &bookmark, payload)
        });
    }

    fn invoke<F>(&mut self, id: ActivityInstanceId, callback: F)
    where
        F: FnOnce(&dyn Activity, &mut ActivityContext<'_>) -> Result<(), Fault>,
    {
        let Some(mut node) = self.core.nodes.remove(&id) else {
            tracing::debug!("Skipping work for closed activity {}", id);
            return;
        };
        let activity = node.activity.clone();
        let span = tracing::debug_span!(
            "activity",
            instance = %self.core.instance_id,
            name = %node.display_name,
            id = %id
        );
        let _entered = span.enter();

        let result = {
            let mut ctx = ActivityContext::new(&mut self.core, &mut node, id);
            callback(activity.as_ref(), &mut ctx)
        };
        match result {
            Ok(()) => {
                self.core.nodes.insert(id, node);
                self.try_close(id);
            }
            Err(fault) => self.fault(id, node, fault),
        }
    }

    fn try_close(&mut self, id: ActivityInstanceId) {
        let ready = self
            .core
            .nodes
            .get(&id)
            .map(|node| node.children.is_empty() && node.bookmarks.is_empty())
            .unwrap_or(false);
        if !ready {
            return;
        }
        let Some(node) = self.core.nodes.remove(&id) else {
            return;
        };
        self.core.release_no_persist_of(id);

        let outcome = if node.canceled {
            self.core.statistics.activities_canceled += 1;
            self.core.log_event(
                ExecutionEventType::ActivityCanceled,
                format!("Canceled {} {}", node.display_name, id),
            );
            ChildOutcome::Canceled
        } else {
            self.core.statistics.activities_completed += 1;
            self.core.log_event(
                ExecutionEventType::ActivityCompleted,
                format!("Completed {} {}", node.display_name, id),
            );
            ChildOutcome::Closed(node.output)
        };
        self.deliver(id, node.display_name, node.parent, outcome);
    }

    fn fault(&mut self, id: ActivityInstanceId, node: ActivityNode, fault: Fault) {
        tracing::debug!("Activity {} {} faulted: {}", node.display_name, id, fault);
        for child in &node.children {
            self.abort(*child);
        }
        self.core.retire_bookmarks(id, &node.bookmarks);
        self.core.release_no_persist_of(id);
        self.core.statistics.activities_faulted += 1;
        self.core.log_event(
            ExecutionEventType::ActivityFaulted,
            format!("{} {} faulted: {}", node.display_name, id, fault),
        );
        self.deliver(id, node.display_name, node.parent, ChildOutcome::Faulted(fault));
    }

    /// Tear down a subtree whose ancestor faulted
    ///
    /// Each activity gets its `cancel` callback first so running operations
    /// are stopped. Whatever it leaves behind is released here.
    fn abort(&mut self, id: ActivityInstanceId) {
        let Some(mut node) = self.core.nodes.remove(&id) else {
            return;
        };
        let activity = node.activity.clone();
        {
            let mut ctx = ActivityContext::new(&mut self.core, &mut node, id);
            activity.cancel(&mut ctx);
        }
        for child in &node.children {
            self.abort(*child);
        }
        self.core.retire_bookmarks(id, &node.bookmarks);
        self.core.release_no_persist_of(id);
        self.core.statistics.activities_aborted += 1;
        tracing::debug!("Aborted {} {}", node.display_name, id);
    }

    fn deliver(
        &mut self,
        id: ActivityInstanceId,
        display_name: String,
        parent: Option<ActivityInstanceId>,
        outcome: ChildOutcome,
    ) {
        match parent {
            Some(parent) => self.core.work.push_back(WorkItem::ChildCompleted {
                parent,
                child: CompletedChild {
                    id,
                    display_name,
                    outcome,
                },
            }),
            None => self.close(outcome),
        }
    }

    fn close(&mut self, outcome: ChildOutcome) {
        let outcome = WorkflowOutcome::from(outcome);
        self.status = outcome.status();
        match &outcome {
            WorkflowOutcome::Faulted(fault) => {
                tracing::info!("Workflow {} faulted: {}", self.root_name, fault)
            }
            _ => tracing::info!("Workflow {} closed as {:?}", self.root_name, self.status),
        }
        self.core.log_event(
            ExecutionEventType::Closed,
            format!("Workflow {} closed as {:?}", self.root_name, self.status),
        );
        self.outcome = Some(outcome);
    }
}

impl std::fmt::Debug for WorkflowInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowInstance")
            .field("id", &self.core.instance_id)
            .field("root", &self.root_name)
            .field("status", &self.status)
            .field("pending_bookmarks", &self.core.bookmarks.len())
            .finish()
    }
}
