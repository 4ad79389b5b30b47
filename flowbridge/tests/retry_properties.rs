//! Integration tests for the retry loop

use flowbridge::prelude::*;
use flowbridge::test_utils::{recording_handler, scripted_body, EventLog};
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn failures(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix} {i}")).collect()
}

fn messages(faults: &[Fault]) -> Vec<String> {
    faults.iter().map(|fault| fault.to_string()).collect()
}

fn run_blocking(workflow: ActivityRef) -> WorkflowOutcome {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(WorkflowHost::new().run(workflow))
        .unwrap()
}

fn success_of(outcome: &WorkflowOutcome) -> RetryOutcome {
    outcome
        .output()
        .and_then(|output| output.downcast_ref::<RetryOutcome>())
        .cloned()
        .expect("retry should complete with its attempt log")
}

fn exhaustion_of(outcome: &WorkflowOutcome) -> RetryExhaustedError {
    outcome
        .fault()
        .and_then(|fault| fault.downcast_ref::<RetryExhaustedError>())
        .cloned()
        .expect("retry should fault with RetryExhaustedError")
}

/// Expected log when a handler runs between attempts
fn interleaved(failed: &[String], attempts: usize) -> Vec<String> {
    let mut expected = Vec::new();
    for attempt in 1..=attempts {
        expected.push(format!("attempt {attempt}"));
        if let Some(message) = failed.get(attempt - 1) {
            expected.push(format!("handler {message}"));
        }
    }
    expected
}

#[tokio::test]
async fn test_two_failures_then_success() {
    let log = EventLog::new();
    let sink = RetryOutputs::new();
    let retry = Retry::new()
        .body(scripted_body(vec!["A".into(), "B".into()], log.clone()))
        .max_attempts(3)
        .on_exception(recording_handler(log.clone()))
        .outputs(sink.clone())
        .into_ref();

    let outcome = WorkflowHost::new().run(retry).await.unwrap();

    let result = success_of(&outcome);
    assert_eq!(result.attempts, 3);
    assert_eq!(messages(&result.exceptions), vec!["A", "B"]);
    assert!(result.succeeded());
    assert_eq!(
        log.entries(),
        vec!["attempt 1", "handler A", "attempt 2", "handler B", "attempt 3"]
    );

    let recorded = sink.get().expect("sink should be written");
    assert_eq!(recorded.attempts, 3);
    assert_eq!(messages(&recorded.exceptions), vec!["A", "B"]);
}

#[tokio::test]
async fn test_exhaustion_raises_aggregate() {
    let log = EventLog::new();
    let sink = RetryOutputs::new();
    let retry = Retry::new()
        .body(scripted_body(vec!["C".into(), "C".into()], log.clone()))
        .max_attempts(2)
        .outputs(sink.clone())
        .into_ref();

    let outcome = WorkflowHost::new().run(retry).await.unwrap();

    let error = exhaustion_of(&outcome);
    assert_eq!(error.attempts, 2);
    assert_eq!(messages(&error.exceptions), vec!["C", "C"]);
    assert_eq!(log.entries(), vec!["attempt 1", "attempt 2"]);
    assert_eq!(sink.get().map(|outcome| outcome.attempts), Some(2));
}

#[tokio::test]
async fn test_first_attempt_success_has_empty_log() {
    let log = EventLog::new();
    let retry = Retry::new()
        .body(scripted_body(Vec::new(), log.clone()))
        .on_exception(recording_handler(log.clone()))
        .into_ref();

    let outcome = WorkflowHost::new().run(retry).await.unwrap();

    let result = success_of(&outcome);
    assert_eq!(result.attempts, 1);
    assert!(result.exceptions.is_empty());
    assert!(log.matching("handler").is_empty());
}

#[tokio::test]
async fn test_handler_fault_propagates() {
    let log = EventLog::new();
    let retry = Retry::new()
        .body(scripted_body(failures("flaky", 5), log.clone()))
        .max_attempts(5)
        .on_exception(code("BrokenHandler", |_ctx| -> Result<(), Fault> {
            Err(Fault::msg("handler crashed"))
        }))
        .into_ref();

    let outcome = WorkflowHost::new().run(retry).await.unwrap();

    assert_eq!(
        outcome.fault().map(|f| f.to_string()),
        Some("handler crashed".to_string())
    );
    assert_eq!(log.entries(), vec!["attempt 1"]);
}

#[tokio::test]
async fn test_backoff_waits_between_attempts() {
    let log = EventLog::new();
    let retry = Retry::new()
        .body(scripted_body(failures("slow", 2), log.clone()))
        .max_attempts(3)
        .backoff(Backoff::Fixed(Duration::from_millis(20)))
        .into_ref();
    let mut instance = WorkflowHost::new().create_instance(retry).unwrap();
    let started = Instant::now();

    let outcome = instance.run().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(success_of(&outcome).attempts, 3);
    assert_eq!(instance.statistics().bookmarks_resumed, 2);
    assert_eq!(instance.active_no_persist(), 0);
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let log = EventLog::new();
    let retry = Retry::new()
        .body(scripted_body(failures("down", 3), log.clone()))
        .backoff(Backoff::Fixed(Duration::from_secs(60)))
        .into_ref();
    let mut instance = WorkflowHost::new().create_instance(retry).unwrap();

    assert_eq!(
        instance.run_until_idle().await.unwrap(),
        RunState::Idle { pending_bookmarks: 1 }
    );
    instance.cancel().unwrap();
    let outcome = instance.run().await.unwrap();

    assert!(outcome.is_canceled());
    assert_eq!(log.entries(), vec!["attempt 1"]);
    assert!(instance.pending_bookmarks().is_empty());
}

#[tokio::test]
async fn test_retry_without_body_fails_validation() {
    let result = WorkflowHost::new().create_instance(Retry::new().into_ref());
    assert!(matches!(
        result,
        Err(RuntimeError::ValidationFailed(message)) if message == "Retry: Body must be set"
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_succeeds_after_k_failures(k in 0usize..5, spare in 1usize..4) {
        let max_attempts = k + spare;
        let failed = failures("fail", k);
        let log = EventLog::new();
        let retry = Retry::new()
            .body(scripted_body(failed.clone(), log.clone()))
            .max_attempts(max_attempts as u32)
            .into_ref();

        let result = success_of(&run_blocking(retry));
        prop_assert_eq!(result.attempts as usize, k + 1);
        prop_assert_eq!(messages(&result.exceptions), failed);
        prop_assert_eq!(log.entries().len(), k + 1);
    }

    #[test]
    fn test_always_failing_body_exhausts(max_attempts in 1usize..7) {
        let log = EventLog::new();
        let retry = Retry::new()
            .body(scripted_body(failures("never", max_attempts + 3), log.clone()))
            .max_attempts(max_attempts as u32)
            .into_ref();

        let error = exhaustion_of(&run_blocking(retry));
        prop_assert_eq!(error.attempts as usize, max_attempts);
        prop_assert_eq!(messages(&error.exceptions), failures("never", max_attempts));
        prop_assert_eq!(log.entries().len(), max_attempts);
    }

    #[test]
    fn test_handler_runs_before_each_next_attempt(k in 0usize..5, spare in 1usize..3) {
        let failed = failures("oops", k);
        let log = EventLog::new();
        let retry = Retry::new()
            .body(scripted_body(failed.clone(), log.clone()))
            .max_attempts((k + spare) as u32)
            .on_exception(recording_handler(log.clone()))
            .into_ref();

        let outcome = run_blocking(retry);
        prop_assert!(outcome.is_completed());
        prop_assert_eq!(log.entries(), interleaved(&failed, k + 1));
    }

    #[test]
    fn test_handler_runs_for_every_exhausted_attempt(max_attempts in 1usize..6) {
        let failed = failures("nope", max_attempts);
        let log = EventLog::new();
        let retry = Retry::new()
            .body(scripted_body(failed.clone(), log.clone()))
            .max_attempts(max_attempts as u32)
            .on_exception(recording_handler(log.clone()))
            .into_ref();

        let outcome = run_blocking(retry);
        prop_assert!(outcome.is_faulted());
        prop_assert_eq!(log.matching("handler").len(), max_attempts);
        prop_assert_eq!(log.entries(), interleaved(&failed, max_attempts));
    }
}
