//! Test utilities for flowbridge tests
//!
//! Provides operations whose completion the test drives by hand and scripted
//! activities that record what they were asked to do, so tests can assert on
//! exact orderings without sleeping.

use crate::activities::code;
use crate::bridge::{suspendable, Continuation, PendingOperation, SuspendableActivity};
use crate::fault::Fault;
use crate::runtime::{ActivityContext, ActivityRef};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Shared, ordered record of what scripted activities did
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    /// Copy of all entries, oldest first
    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Entries starting with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        lock(&self.0)
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// How a [`ManualOperation`] behaves when started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualMode {
    /// Hand the continuation to the probe and suspend
    Suspend,
    /// Finish before `start_operation` returns
    CompleteImmediately(u32),
    /// Fail inside `start_operation`
    FailToStart,
}

#[derive(Debug, Default)]
struct ProbeState {
    continuation: Mutex<Option<Continuation>>,
    started: AtomicUsize,
    finished: AtomicUsize,
    canceled: AtomicUsize,
    observed_scopes: Mutex<Vec<usize>>,
}

/// Test-side view of a [`ManualOperation`]
#[derive(Debug, Clone, Default)]
pub struct OperationProbe(Arc<ProbeState>);

impl OperationProbe {
    /// Take the continuation of the last suspended start
    pub fn take_continuation(&self) -> Option<Continuation> {
        lock(&self.0.continuation).take()
    }

    /// Complete the suspended operation with `value`
    ///
    /// Returns whether a resumption was queued.
    pub fn complete(&self, value: u32) -> bool {
        self.take_continuation()
            .map(|continuation| continuation.complete(PendingOperation::resolved(value)))
            .unwrap_or(false)
    }

    /// Fail the suspended operation
    pub fn fail(&self, fault: Fault) -> bool {
        self.take_continuation()
            .map(|continuation| continuation.complete(PendingOperation::failed(fault)))
            .unwrap_or(false)
    }

    /// Times `start_operation` ran
    pub fn started(&self) -> usize {
        self.0.started.load(Ordering::SeqCst)
    }

    /// Times `finish_operation` ran
    pub fn finished(&self) -> usize {
        self.0.finished.load(Ordering::SeqCst)
    }

    /// Times `cancel_operation` ran
    pub fn canceled(&self) -> usize {
        self.0.canceled.load(Ordering::SeqCst)
    }

    /// Pending bookmarks seen by the operation at each start and finish
    pub fn observed_bookmarks(&self) -> Vec<usize> {
        lock(&self.0.observed_scopes).clone()
    }
}

/// Suspendable operation driven by an [`OperationProbe`]
#[derive(Debug, Clone)]
pub struct ManualOperation {
    name: String,
    mode: ManualMode,
    probe: OperationProbe,
}

impl ManualOperation {
    /// Create an operation and the probe controlling it
    pub fn new(name: impl Into<String>, mode: ManualMode) -> (Self, OperationProbe) {
        let probe = OperationProbe::default();
        let operation = Self {
            name: name.into(),
            mode,
            probe: probe.clone(),
        };
        (operation, probe)
    }

    /// Create the operation wrapped as an activity
    pub fn activity(name: impl Into<String>, mode: ManualMode) -> (ActivityRef, OperationProbe) {
        let (operation, probe) = Self::new(name, mode);
        (suspendable(operation), probe)
    }
}

impl SuspendableActivity for ManualOperation {
    type Output = u32;

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn start_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        continuation: Continuation,
    ) -> Result<PendingOperation, Fault> {
        self.probe.0.started.fetch_add(1, Ordering::SeqCst);
        lock(&self.probe.0.observed_scopes).push(ctx.pending_bookmarks());
        match self.mode {
            ManualMode::Suspend => {
                *lock(&self.probe.0.continuation) = Some(continuation);
                Ok(PendingOperation::in_flight())
            }
            ManualMode::CompleteImmediately(value) => {
                // The continuation fires too, and must be ignored
                let token = PendingOperation::completed(value);
                let queued = continuation.complete(PendingOperation::completed(value));
                debug_assert!(!queued);
                Ok(token)
            }
            ManualMode::FailToStart => Err(Fault::msg(format!("{} refused to start", self.name))),
        }
    }

    fn finish_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        token: PendingOperation,
    ) -> Result<u32, Fault> {
        self.probe.0.finished.fetch_add(1, Ordering::SeqCst);
        lock(&self.probe.0.observed_scopes).push(ctx.pending_bookmarks());
        token.into_result()
    }

    fn cancel_operation(&self, _ctx: &mut ActivityContext<'_>) {
        self.probe.0.canceled.fetch_add(1, Ordering::SeqCst);
    }
}

/// Body that fails with the scripted messages, then succeeds
///
/// Call `n` (starting at 1) fails with `failures[n - 1]` while there is one,
/// and logs `attempt n` to `log` either way.
pub fn scripted_body(failures: Vec<String>, log: EventLog) -> ActivityRef {
    let calls = Arc::new(AtomicUsize::new(0));
    code("ScriptedBody", move |_ctx| {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        log.push(format!("attempt {}", call));
        match failures.get(call - 1) {
            Some(message) => Err(Fault::msg(message.clone())),
            None => Ok(call as u32),
        }
    })
}

/// Exception handler logging `handler <fault>` for the fault it receives
pub fn recording_handler(log: EventLog) -> ActivityRef {
    code("RecordingHandler", move |ctx| {
        let fault = ctx
            .argument::<Fault>()
            .map(|fault| fault.to_string())
            .unwrap_or_else(|| "<none>".to_string());
        log.push(format!("handler {}", fault));
        Ok(())
    })
}
