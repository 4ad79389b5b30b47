//! Demonstration workflows run by the CLI

use crate::exit_codes::{EXIT_SUCCESS, EXIT_WARNING};
use anyhow::{Context, Result};
use flowbridge::prelude::*;
use flowbridge::runtime::{InMemoryInstanceStore, InstanceStatistics};
use flowbridge::DispatcherKind;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Latency of the simulated remote call
const CALL_LATENCY: Duration = Duration::from_millis(10);

/// Body that fails `failures` times, then returns the attempt number
fn flaky_call(failures: u32) -> ActivityRef {
    let calls = Arc::new(AtomicU32::new(0));
    task_fn("FlakyCall", move |_ctx, dispatcher| {
        let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(dispatcher.run(move || async move {
            tokio::time::sleep(CALL_LATENCY).await;
            if attempt <= failures {
                Err(Fault::msg(format!("call {attempt} timed out")))
            } else {
                Ok(attempt)
            }
        })))
    })
}

fn log_exception() -> ActivityRef {
    code("LogException", |ctx| {
        if let Some(fault) = ctx.argument::<Fault>() {
            tracing::warn!("Handling failed attempt: {}", fault);
        }
        Ok(())
    })
}

fn build_host(config: HostConfig) -> WorkflowHost {
    WorkflowHost::builder()
        .config(config)
        .store(Arc::new(InMemoryInstanceStore::new()))
        .build()
}

fn print_statistics(statistics: &InstanceStatistics) -> Result<()> {
    let yaml = serde_yaml::to_string(statistics).context("Failed to render statistics")?;
    println!("{}", yaml.trim_end());
    Ok(())
}

/// Run the retry demonstration
pub async fn run_retry(
    config: HostConfig,
    failures: u32,
    max_attempts: u32,
    backoff_ms: u64,
) -> Result<i32> {
    let backoff = match backoff_ms {
        0 => Backoff::None,
        millis => Backoff::Fixed(Duration::from_millis(millis)),
    };
    let attempts = RetryOutputs::new();
    let workflow = Retry::new()
        .named("RetryDemo")
        .body(flaky_call(failures))
        .max_attempts(max_attempts)
        .on_exception(log_exception())
        .backoff(backoff)
        .outputs(attempts.clone())
        .into_ref();

    let host = build_host(config);
    let mut instance = host
        .create_instance(workflow)
        .context("Failed to create retry workflow")?;
    let outcome = instance.run().await.context("Retry workflow failed to run")?;

    if let Some(log) = attempts.get() {
        println!("attempts: {}", log.attempts);
        for (index, fault) in log.exceptions.iter().enumerate() {
            println!("  {}. {}", index + 1, fault);
        }
    }

    match outcome {
        WorkflowOutcome::Completed(_) => {
            tracing::info!("Retry succeeded");
            Ok(EXIT_SUCCESS)
        }
        WorkflowOutcome::Faulted(fault) => {
            tracing::error!("{}", fault);
            Ok(EXIT_WARNING)
        }
        WorkflowOutcome::Canceled => Ok(EXIT_WARNING),
    }
}

/// Run the timer and task demonstration
pub async fn run_delay(
    config: HostConfig,
    millis: u64,
    dispatcher: Option<DispatcherKind>,
) -> Result<i32> {
    let report_thread = task_fn("ReportThread", |ctx, dispatcher| {
        tracing::info!(
            "{} dispatching on '{}' from {:?}",
            ctx.display_name(),
            dispatcher.name(),
            std::thread::current().id()
        );
        Ok(Some(dispatcher.run(|| async {
            Ok::<_, Fault>(format!("{:?}", std::thread::current().id()))
        })))
    });
    let body = Sequence::new(vec![
        Delay::new(Duration::from_millis(millis)).into_ref(),
        report_thread,
    ])
    .named("DelayDemo")
    .into_ref();

    let workflow = match dispatcher {
        Some(DispatcherKind::Inline) => DispatcherScope::new(Arc::new(InlineDispatcher))
            .body(body)
            .into_ref(),
        Some(DispatcherKind::Pool) => DispatcherScope::new(Arc::new(PoolDispatcher::new()))
            .body(body)
            .into_ref(),
        None => body,
    };

    let host = build_host(config);
    let mut instance = host
        .create_instance(workflow)
        .context("Failed to create delay workflow")?;
    let outcome = instance.run().await.context("Delay workflow failed to run")?;

    let thread = outcome
        .output()
        .and_then(|output| output.downcast_ref::<String>())
        .cloned();
    if let Some(thread) = thread {
        println!("task ran on {}", thread);
    }
    print_statistics(instance.statistics())?;

    Ok(if outcome.is_completed() {
        EXIT_SUCCESS
    } else {
        EXIT_WARNING
    })
}
