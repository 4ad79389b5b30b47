use crate::bridge::{
    suspendable, BridgeError, Continuation, PendingOperation, SuspendableActivity,
};
use crate::fault::Fault;
use crate::runtime::{ActivityContext, ActivityRef};
use std::time::Duration;
use tokio::task::AbortHandle;

struct DelayTimer(AbortHandle);

/// Waits for a duration without holding a worker thread
///
/// A `Duration` argument passed by the parent overrides the configured
/// duration. A zero duration completes in the same turn.
#[derive(Debug, Clone)]
pub struct Delay {
    duration: Duration,
}

impl Delay {
    /// Wait for `duration`
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Configured duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Wrap into a shareable activity
    pub fn into_ref(self) -> ActivityRef {
        suspendable(self)
    }
}

impl SuspendableActivity for Delay {
    type Output = ();

    fn display_name(&self) -> String {
        "Delay".to_string()
    }

    fn start_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        continuation: Continuation,
    ) -> Result<PendingOperation, Fault> {
        let duration = ctx
            .argument::<Duration>()
            .copied()
            .unwrap_or(self.duration);
        if duration.is_zero() {
            return Ok(PendingOperation::completed(()));
        }

        let handle = ctx
            .runtime_handle()
            .ok_or_else(|| Fault::new(BridgeError::NoRuntime))?;
        tracing::debug!("Delaying for {:?}", duration);
        let timer = handle.spawn(async move {
            tokio::time::sleep(duration).await;
            continuation.complete(PendingOperation::resolved(()));
        });
        ctx.set_state(DelayTimer(timer.abort_handle()));
        Ok(PendingOperation::in_flight())
    }

    fn finish_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        token: PendingOperation,
    ) -> Result<(), Fault> {
        ctx.take_state::<DelayTimer>();
        token.into_result()
    }

    fn cancel_operation(&self, ctx: &mut ActivityContext<'_>) {
        if let Some(DelayTimer(timer)) = ctx.take_state::<DelayTimer>() {
            timer.abort();
        }
    }
}
