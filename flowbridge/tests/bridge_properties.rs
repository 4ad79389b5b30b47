//! Integration tests for the suspendable bridge, task activities and
//! dispatcher scoping

use flowbridge::prelude::*;
use flowbridge::dispatch::{DispatchFuture, DispatchOperation};
use flowbridge::runtime::{Bookmark, BookmarkName, BookmarkPayload, ChildOutcome, CompletedChild};
use flowbridge::test_utils::{EventLog, ManualMode, ManualOperation};
use flowbridge::{DispatchError, WorkflowInstance};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn value(outcome: &WorkflowOutcome) -> Option<u32> {
    outcome
        .output()
        .and_then(|output| output.downcast_ref::<u32>())
        .copied()
}

fn instance_for(root: ActivityRef) -> WorkflowInstance {
    WorkflowHost::new()
        .create_instance(root)
        .expect("workflow should validate")
}

#[tokio::test]
async fn test_synchronous_completion_finishes_in_same_turn() {
    let (operation, probe) =
        ManualOperation::activity("Immediate", ManualMode::CompleteImmediately(5));
    let mut instance = instance_for(operation);

    // A single drain closes the instance without going idle
    assert_eq!(instance.run_until_idle().await.unwrap(), RunState::Closed);
    assert_eq!(instance.outcome().and_then(value), Some(5));

    let stats = instance.statistics();
    assert_eq!(stats.idle_count, 0);
    assert_eq!(stats.no_persist_entered, 1);
    assert_eq!(stats.no_persist_exited, 1);
    assert_eq!(stats.bookmarks_created, 1);
    assert_eq!(stats.bookmarks_removed, 1);
    assert_eq!(stats.bookmarks_resumed, 0);
    assert_eq!(probe.started(), 1);
    assert_eq!(probe.finished(), 1);
    // One bookmark while starting, none left when the result is collected
    assert_eq!(probe.observed_bookmarks(), vec![1, 0]);
}

#[tokio::test]
async fn test_synchronous_completion_output() {
    let (operation, _probe) =
        ManualOperation::activity("Immediate", ManualMode::CompleteImmediately(5));
    let mut instance = instance_for(operation);
    let outcome = instance.run().await.unwrap();

    assert_eq!(value(&outcome), Some(5));
    assert_eq!(instance.statistics().idle_count, 0);
    assert!(instance.pending_bookmarks().is_empty());
}

#[tokio::test]
async fn test_timer_completes_through_resumption() {
    let workflow = Sequence::new(vec![
        Delay::new(Duration::from_millis(50)).into_ref(),
        code("after", |_ctx| Ok(3u32)),
    ])
    .into_ref();
    let mut instance = instance_for(workflow);
    let started = Instant::now();

    let state = instance.run_until_idle().await.unwrap();
    assert_eq!(state, RunState::Idle { pending_bookmarks: 1 });
    assert_eq!(instance.active_no_persist(), 1);
    assert!(instance.outcome().is_none());

    let outcome = instance.run().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(value(&outcome), Some(3));

    let stats = instance.statistics();
    assert!(stats.idle_count >= 1);
    assert_eq!(stats.bookmarks_resumed, 1);
    assert_eq!(stats.bookmarks_removed, 0);
    assert_eq!(stats.no_persist_entered, 1);
    assert_eq!(stats.no_persist_exited, 1);
    assert_eq!(instance.active_no_persist(), 0);
}

#[tokio::test]
async fn test_completion_from_foreign_thread() {
    let (operation, probe) = ManualOperation::activity("Remote", ManualMode::Suspend);
    let mut instance = instance_for(operation);
    instance.run_until_idle().await.unwrap();
    assert_eq!(probe.finished(), 0);

    let queued = thread::spawn(move || probe.complete(9)).join().unwrap();
    assert!(queued);

    let outcome = instance.run().await.unwrap();
    assert_eq!(value(&outcome), Some(9));
    assert_eq!(instance.statistics().bookmarks_resumed, 1);
}

#[tokio::test]
async fn test_asynchronous_fault_is_rethrown() {
    let (operation, probe) = ManualOperation::activity("Remote", ManualMode::Suspend);
    let mut instance = instance_for(operation);
    instance.run_until_idle().await.unwrap();

    let original = Fault::msg("remote failure");
    assert!(probe.fail(original.clone()));
    let outcome = instance.run().await.unwrap();

    assert!(outcome.fault().map(|f| f.ptr_eq(&original)).unwrap_or(false));
    assert_eq!(instance.active_no_persist(), 0);
    assert_eq!(instance.statistics().no_persist_exited, 1);
}

#[tokio::test]
async fn test_start_failure_leaves_nothing_behind() {
    let (operation, probe) = ManualOperation::activity("Refusing", ManualMode::FailToStart);
    let mut instance = instance_for(operation);
    let outcome = instance.run().await.unwrap();

    assert_eq!(
        outcome.fault().map(|f| f.to_string()),
        Some("Refusing refused to start".to_string())
    );
    assert_eq!(probe.finished(), 0);
    assert!(instance.pending_bookmarks().is_empty());
    let stats = instance.statistics();
    assert_eq!(stats.bookmarks_created, 1);
    assert_eq!(stats.bookmarks_removed, 1);
    assert_eq!(stats.no_persist_exited, 1);
    assert_eq!(stats.no_persist_released, 0);
}

/// Cancels its child when its own bookmark is resumed, then waits on a
/// second bookmark so the instance stays open
struct CancelRace {
    operation: ActivityRef,
}

impl Activity for CancelRace {
    fn display_name(&self) -> String {
        "CancelRace".to_string()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        metadata.add_child(&self.operation);
    }

    fn can_induce_idle(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        ctx.schedule_child(&self.operation);
        ctx.create_bookmark();
        Ok(())
    }

    fn on_bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        _bookmark: &Bookmark,
        _payload: BookmarkPayload,
    ) -> Result<(), Fault> {
        ctx.cancel_children();
        Ok(())
    }

    fn on_child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: CompletedChild,
    ) -> Result<(), Fault> {
        match child.outcome {
            ChildOutcome::Canceled => {
                ctx.create_bookmark();
                Ok(())
            }
            ChildOutcome::Faulted(fault) => Err(fault),
            ChildOutcome::Closed(_) => Ok(()),
        }
    }
}

fn bookmark_with_prefix(instance: &WorkflowInstance, prefix: &str) -> BookmarkName {
    instance
        .pending_bookmarks()
        .into_iter()
        .find(|name| name.as_str().starts_with(prefix))
        .expect("bookmark should be pending")
}

#[tokio::test]
async fn test_late_completion_after_cancel_is_stale() {
    let (operation, probe) = ManualOperation::activity("Operation", ManualMode::Suspend);
    let mut instance = instance_for(Arc::new(CancelRace { operation }));

    let state = instance.run_until_idle().await.unwrap();
    assert_eq!(state, RunState::Idle { pending_bookmarks: 2 });

    let gate = bookmark_with_prefix(&instance, "CancelRace:");
    instance.resume_bookmark(&gate, Box::new(())).unwrap();
    let state = instance.run_until_idle().await.unwrap();
    assert_eq!(state, RunState::Idle { pending_bookmarks: 1 });
    assert_eq!(probe.canceled(), 1);
    assert_eq!(instance.active_no_persist(), 0);

    // The operation finishes after it was canceled
    assert!(probe.complete(1));
    let state = instance.run_until_idle().await.unwrap();
    assert_eq!(state, RunState::Idle { pending_bookmarks: 1 });
    assert_eq!(probe.finished(), 0);

    let hold = bookmark_with_prefix(&instance, "CancelRace:");
    instance.resume_bookmark(&hold, Box::new(())).unwrap();
    let outcome = instance.run().await.unwrap();
    assert!(outcome.is_completed());

    let stats = instance.statistics();
    assert_eq!(stats.stale_resumptions, 1);
    assert_eq!(stats.bookmarks_resumed, 2);
    assert_eq!(stats.bookmarks_removed, 1);
    assert_eq!(stats.no_persist_entered, 1);
    assert_eq!(stats.no_persist_exited, 1);
    assert_eq!(stats.no_persist_released, 0);
}

#[tokio::test]
async fn test_task_ready_on_first_poll_completes_synchronously() {
    let answer = task_fn("answer", |_ctx, dispatcher| {
        Ok(Some(dispatcher.run(|| async { Ok::<_, Fault>(42u32) })))
    });
    let mut instance = instance_for(answer);
    let outcome = instance.run().await.unwrap();

    assert_eq!(value(&outcome), Some(42));
    assert_eq!(instance.statistics().idle_count, 0);
    assert_eq!(instance.statistics().bookmarks_resumed, 0);
}

#[tokio::test]
async fn test_task_pending_future_resumes_later() {
    let slow = task_fn("slow", |_ctx, dispatcher| {
        Ok(Some(dispatcher.run(|| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, Fault>(7u32)
        })))
    });
    let mut instance = instance_for(slow);
    let outcome = instance.run().await.unwrap();

    assert_eq!(value(&outcome), Some(7));
    assert_eq!(instance.statistics().idle_count, 1);
    assert_eq!(instance.statistics().bookmarks_resumed, 1);
}

#[tokio::test]
async fn test_task_without_future_completes_with_default() {
    let nothing = task_fn("nothing", |_ctx, _dispatcher| Ok(None::<TaskFuture<u32>>));
    let outcome = WorkflowHost::new().run(nothing).await.unwrap();
    assert_eq!(value(&outcome), Some(0));
}

#[tokio::test]
async fn test_task_fault_faults_workflow() {
    let failing = task_fn("failing", |_ctx, dispatcher| {
        Ok(Some(dispatcher.run::<_, _, u32>(|| async {
            tokio::task::yield_now().await;
            Err(Fault::msg("upstream unavailable"))
        })))
    });
    let outcome = WorkflowHost::new().run(failing).await.unwrap();
    assert_eq!(
        outcome.fault().map(|f| f.to_string()),
        Some("upstream unavailable".to_string())
    );
}

#[tokio::test]
async fn test_missing_dispatcher_fails_validation() {
    let host = WorkflowHost::builder().without_default_dispatcher().build();
    let answer = task_fn("answer", |_ctx, dispatcher| {
        Ok(Some(dispatcher.run(|| async { Ok::<_, Fault>(1u8) })))
    });

    match host.create_instance(answer) {
        Err(RuntimeError::ValidationFailed(message)) => {
            assert!(message.starts_with("answer: required extension"));
            assert!(message.contains("DispatcherExtension"));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_scope_runs_work_off_scheduler_thread() {
    let log = EventLog::new();
    let task_log = log.clone();
    let probe = task_fn("where", move |_ctx, dispatcher| {
        let log = task_log.clone();
        log.push(format!("{:?}", thread::current().id()));
        Ok(Some(dispatcher.run(move || async move {
            log.push(format!("{:?}", thread::current().id()));
            Ok::<_, Fault>(())
        })))
    });
    let workflow = DispatcherScope::new(Arc::new(PoolDispatcher::new()))
        .body(probe)
        .into_ref();

    let outcome = WorkflowHost::new().run(workflow).await.unwrap();
    assert!(outcome.is_completed());

    let entries = log.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], format!("{:?}", thread::current().id()));
    assert_ne!(entries[0], entries[1]);
}

/// Dispatcher that starts work inline under its own name
#[derive(Debug)]
struct TaggedDispatcher(&'static str);

impl TaskDispatcher for TaggedDispatcher {
    fn name(&self) -> &str {
        self.0
    }

    fn dispatch(&self, operation: DispatchOperation) -> DispatchFuture {
        operation()
    }
}

fn dispatcher_probe(log: &EventLog) -> ActivityRef {
    let log = log.clone();
    task_fn("probe", move |_ctx, dispatcher| {
        log.push(dispatcher.name());
        Ok(None::<TaskFuture<()>>)
    })
}

#[tokio::test]
async fn test_nested_scopes_shadow_and_restore() {
    let log = EventLog::new();
    let inner = DispatcherScope::new(Arc::new(TaggedDispatcher("inner")))
        .body(dispatcher_probe(&log))
        .into_ref();
    let outer = DispatcherScope::new(Arc::new(TaggedDispatcher("outer")))
        .body(
            Sequence::new(vec![dispatcher_probe(&log), inner, dispatcher_probe(&log)]).into_ref(),
        )
        .into_ref();
    let workflow = Sequence::new(vec![
        dispatcher_probe(&log),
        outer,
        dispatcher_probe(&log),
    ])
    .into_ref();

    let mut instance = instance_for(workflow);
    let outcome = instance.run().await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(
        log.entries(),
        vec!["inline", "outer", "inner", "outer", "inline"]
    );
    let stats = instance.statistics();
    assert_eq!(stats.no_persist_entered, stats.no_persist_exited);
    assert_eq!(instance.active_no_persist(), 0);
}

#[tokio::test]
async fn test_scope_closes_with_body_output() {
    let workflow = DispatcherScope::new(Arc::new(InlineDispatcher))
        .body(code("inside", |_ctx| Ok(12u32)))
        .into_ref();
    let outcome = WorkflowHost::new().run(workflow).await.unwrap();
    assert_eq!(value(&outcome), Some(12));
}

#[tokio::test]
async fn test_select_collects_outputs_in_item_order() {
    let double = task_fn("double", |ctx, dispatcher| {
        let item = ctx.argument::<u32>().copied().unwrap_or_default();
        Ok(Some(dispatcher.run(move || async move {
            // Later items finish first
            tokio::time::sleep(Duration::from_millis(u64::from(30 - item * 10))).await;
            Ok::<_, Fault>(item * 2)
        })))
    });
    let workflow = Select::<u32, u32>::new(vec![1, 2, 3], double).into_ref();

    let outcome = WorkflowHost::new().run(workflow).await.unwrap();
    let results = outcome
        .output()
        .and_then(|output| output.downcast_ref::<Vec<u32>>())
        .cloned();
    assert_eq!(results, Some(vec![2, 4, 6]));
}

#[tokio::test]
async fn test_for_each_passes_items_in_order() {
    let log = EventLog::new();
    let body_log = log.clone();
    let body = code("record", move |ctx| {
        let item = ctx
            .argument::<&'static str>()
            .ok_or_else(|| Fault::msg("missing item"))?;
        body_log.push(*item);
        Ok(())
    });

    let sequential = ForEach::new(vec!["a", "b", "c"], body.clone()).into_ref();
    WorkflowHost::new().run(sequential).await.unwrap();
    assert_eq!(log.entries(), vec!["a", "b", "c"]);

    let parallel = ParallelForEach::new(vec!["x", "y"], body).into_ref();
    let outcome = WorkflowHost::new().run(parallel).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(log.matching("x").len() + log.matching("y").len(), 2);
}

fn explode() -> Result<u32, Fault> {
    panic!("operation exploded")
}

fn panic_message(outcome: &WorkflowOutcome) -> Option<String> {
    match outcome.fault()?.downcast_ref::<DispatchError>()? {
        DispatchError::Panicked(message) => Some(message.clone()),
        _ => None,
    }
}

#[tokio::test]
async fn test_task_panic_after_suspending_faults_workflow() {
    let exploding = task_fn("exploding", |_ctx, dispatcher| {
        Ok(Some(dispatcher.run(|| async {
            tokio::task::yield_now().await;
            explode()
        })))
    });
    let mut instance = instance_for(exploding);

    let outcome = tokio::time::timeout(Duration::from_secs(2), instance.run())
        .await
        .expect("a panicking task must not hang the workflow")
        .unwrap();

    assert_eq!(panic_message(&outcome), Some("operation exploded".to_string()));
    assert!(instance.pending_bookmarks().is_empty());
    assert_eq!(instance.active_no_persist(), 0);
    assert_eq!(instance.statistics().no_persist_exited, 1);
}

#[tokio::test]
async fn test_task_panic_on_first_poll_faults_workflow() {
    let exploding = task_fn("exploding", |_ctx, dispatcher| {
        Ok(Some(dispatcher.run(|| async { explode() })))
    });
    let mut instance = instance_for(exploding);
    let outcome = instance.run().await.unwrap();

    assert_eq!(panic_message(&outcome), Some("operation exploded".to_string()));
    assert_eq!(instance.statistics().idle_count, 0);
    assert_eq!(instance.active_no_persist(), 0);
}

fn flag_after(name: &str, delay: Duration, flag: Arc<AtomicBool>) -> ActivityRef {
    task_fn(name, move |_ctx, dispatcher| {
        let flag = flag.clone();
        Ok(Some(dispatcher.run(move || async move {
            tokio::time::sleep(delay).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, Fault>(())
        })))
    })
}

#[tokio::test]
async fn test_canceled_task_stops_its_operation() {
    let ran = Arc::new(AtomicBool::new(false));
    let mut instance = instance_for(flag_after("slow", Duration::from_millis(100), ran.clone()));

    instance.run_until_idle().await.unwrap();
    instance.cancel().unwrap();
    let outcome = instance.run().await.unwrap();
    assert!(outcome.is_canceled());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(instance.statistics().stale_resumptions, 0);
    assert_eq!(instance.active_no_persist(), 0);
}

#[tokio::test]
async fn test_fault_stops_running_sibling_task() {
    let ran = Arc::new(AtomicBool::new(false));
    let workflow = Parallel::new(vec![
        flag_after("slow", Duration::from_millis(100), ran.clone()),
        code("Broken", |_ctx| -> Result<(), Fault> { Err(Fault::msg("broken step")) }),
    ])
    .into_ref();
    let mut instance = instance_for(workflow);
    let outcome = instance.run().await.unwrap();
    assert_eq!(outcome.fault().map(|f| f.to_string()), Some("broken step".to_string()));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(instance.statistics().activities_aborted, 1);
}

#[tokio::test]
async fn test_scope_releases_guard_when_body_faults() {
    let workflow = DispatcherScope::new(Arc::new(InlineDispatcher))
        .body(code("inside", |_ctx| -> Result<u32, Fault> {
            Err(Fault::msg("inside failed"))
        }))
        .into_ref();
    let mut instance = instance_for(workflow);
    let outcome = instance.run().await.unwrap();

    assert_eq!(outcome.fault().map(|f| f.to_string()), Some("inside failed".to_string()));
    assert_eq!(instance.active_no_persist(), 0);
    let stats = instance.statistics();
    assert_eq!(stats.no_persist_entered, 1);
    assert_eq!(stats.no_persist_exited, stats.no_persist_entered);
    assert_eq!(stats.no_persist_released, 0);
}

#[tokio::test]
async fn test_canceled_scope_releases_guards() {
    let (operation, probe) = ManualOperation::activity("Remote", ManualMode::Suspend);
    let workflow = DispatcherScope::new(Arc::new(InlineDispatcher))
        .body(operation)
        .into_ref();
    let mut instance = instance_for(workflow);

    let state = instance.run_until_idle().await.unwrap();
    assert_eq!(state, RunState::Idle { pending_bookmarks: 1 });
    assert_eq!(instance.active_no_persist(), 2);

    instance.cancel().unwrap();
    let outcome = instance.run().await.unwrap();

    assert!(outcome.is_canceled());
    assert_eq!(probe.canceled(), 1);
    assert!(instance.pending_bookmarks().is_empty());
    assert_eq!(instance.active_no_persist(), 0);
    let stats = instance.statistics();
    assert_eq!(stats.no_persist_entered, 2);
    assert_eq!(stats.no_persist_exited, 2);
    assert_eq!(stats.no_persist_released, 0);
}
