//! Activities backed by Rust futures

use super::{BridgeError, Continuation, PendingOperation, Suspendable, SuspendableActivity};
use crate::dispatch::{
    panic_message, DispatchError, DispatcherExtension, TaskDispatcher, TaskFuture,
};
use crate::fault::Fault;
use crate::runtime::{ActivityContext, ActivityMetadata, ActivityRef};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::AbortHandle;

/// Spawned remainder of a task future that did not finish on its first poll
struct RunningTask(AbortHandle);

fn panicked(panic: &(dyn Any + Send)) -> Fault {
    let message = panic_message(panic);
    tracing::warn!("Task future panicked: {}", message);
    Fault::new(DispatchError::Panicked(message))
}

/// An activity whose work is a future
///
/// `compute` runs on the scheduler turn and returns the future to wait on,
/// usually built with [`TaskDispatcherExt::run`] on the dispatcher it is
/// handed. Returning `None` completes immediately with `Output::default()`.
///
/// [`TaskDispatcherExt::run`]: crate::dispatch::TaskDispatcherExt::run
pub trait TaskActivity: Send + Sync + 'static {
    /// Value stored as the activity result
    type Output: Default + Send + 'static;

    /// Name used in logs and tracking records
    fn display_name(&self) -> String {
        super::short_type_name::<Self>().to_string()
    }

    /// Describe children, required extensions and validation problems
    fn cache_metadata(&self, _metadata: &mut ActivityMetadata) {}

    /// Produce the future to wait on
    fn compute(
        &self,
        ctx: &mut ActivityContext<'_>,
        dispatcher: &Arc<dyn TaskDispatcher>,
    ) -> Result<Option<TaskFuture<Self::Output>>, Fault>;
}

/// Runs a [`TaskActivity`] through the suspendable bridge
pub struct TaskAdapter<T> {
    inner: T,
}

impl<T: TaskActivity> TaskAdapter<T> {
    /// Wrap a task activity
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// The wrapped task activity
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

/// Wrap a task activity into a shareable activity
pub fn task<T: TaskActivity>(inner: T) -> ActivityRef {
    Arc::new(Suspendable::new(TaskAdapter::new(inner)))
}

impl<T: TaskActivity> SuspendableActivity for TaskAdapter<T> {
    type Output = T::Output;

    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        metadata.require_extension::<DispatcherExtension>();
        self.inner.cache_metadata(metadata);
    }

    fn start_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        continuation: Continuation,
    ) -> Result<PendingOperation, Fault> {
        let dispatcher = ctx
            .dispatcher()
            .ok_or_else(|| Fault::new(BridgeError::MissingExtension("DispatcherExtension")))?;

        let Some(mut future) = self.inner.compute(ctx, &dispatcher)? else {
            return Ok(PendingOperation::completed(T::Output::default()));
        };

        // A future that is ready on its first poll completes in this turn
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Ready(result)) => return Ok(PendingOperation::completed_with(result)),
            Ok(Poll::Pending) => {}
            Err(payload) => return Err(panicked(&*payload)),
        }

        let handle = ctx
            .runtime_handle()
            .ok_or_else(|| Fault::new(BridgeError::NoRuntime))?;
        let running = handle.spawn(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(panicked(&*payload)),
            };
            continuation.complete(PendingOperation::resolved_with(result));
        });
        ctx.set_state(RunningTask(running.abort_handle()));
        Ok(PendingOperation::in_flight())
    }

    fn finish_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        token: PendingOperation,
    ) -> Result<T::Output, Fault> {
        ctx.take_state::<RunningTask>();
        token.into_result()
    }

    fn cancel_operation(&self, ctx: &mut ActivityContext<'_>) {
        if let Some(RunningTask(running)) = ctx.take_state::<RunningTask>() {
            running.abort();
        }
    }
}

/// Task activity backed by a closure
pub struct FuncTask<F, R> {
    display_name: String,
    compute: F,
    _output: PhantomData<fn() -> R>,
}

impl<F, R> TaskActivity for FuncTask<F, R>
where
    F: Fn(
            &mut ActivityContext<'_>,
            &Arc<dyn TaskDispatcher>,
        ) -> Result<Option<TaskFuture<R>>, Fault>
        + Send
        + Sync
        + 'static,
    R: Default + Send + 'static,
{
    type Output = R;

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn compute(
        &self,
        ctx: &mut ActivityContext<'_>,
        dispatcher: &Arc<dyn TaskDispatcher>,
    ) -> Result<Option<TaskFuture<R>>, Fault> {
        (self.compute)(ctx, dispatcher)
    }
}

/// Build a task activity from a closure
///
/// ```no_run
/// use flowbridge::prelude::*;
///
/// let fetch = task_fn("fetch", |_ctx, dispatcher| {
///     Ok(Some(dispatcher.run(|| async { Ok::<_, Fault>(42u32) })))
/// });
/// ```
pub fn task_fn<F, R>(name: impl Into<String>, compute: F) -> ActivityRef
where
    F: Fn(
            &mut ActivityContext<'_>,
            &Arc<dyn TaskDispatcher>,
        ) -> Result<Option<TaskFuture<R>>, Fault>
        + Send
        + Sync
        + 'static,
    R: Default + Send + 'static,
{
    task(FuncTask {
        display_name: name.into(),
        compute,
        _output: PhantomData,
    })
}
