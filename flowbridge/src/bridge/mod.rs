//! Bridge between native asynchronous operations and suspendable activities
//!
//! A [`SuspendableActivity`] starts an operation that may finish on any
//! thread, at any time. The [`Suspendable`] adapter turns it into an
//! [`Activity`] that the runtime can suspend and persist around:
//!
//! * a no-persist scope is entered and a bookmark created before user code
//!   runs;
//! * if the operation finished before `start_operation` returned, the
//!   bookmark is removed and the result is collected in the same turn;
//! * otherwise the [`Continuation`] resumes the bookmark from whatever thread
//!   the operation finishes on, and the result is collected on the next
//!   scheduler turn.
//!
//! Exactly one of the two completion paths runs for every execution.

pub mod task;

use crate::fault::Fault;
use crate::runtime::{
    Activity, ActivityContext, ActivityMetadata, ActivityRef, Bookmark, BookmarkName,
    BookmarkPayload, InstanceProxy, NoPersistHandle, SuspensionExtension,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the bridge itself
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An extension the activity depends on is not attached to the instance
    #[error("Required extension {0} is not available")]
    MissingExtension(&'static str),
    /// The activity needs a tokio runtime to wait on and none is available
    #[error("No tokio runtime is available to complete the operation")]
    NoRuntime,
    /// A resumption carried something other than a pending operation
    #[error("Bookmark {0} was resumed with an unexpected payload")]
    UnexpectedPayload(String),
    /// A token was finished before its operation completed
    #[error("Operation has not completed yet")]
    NotFinished,
    /// The operation produced a value of another type than requested
    #[error("Operation produced an unexpected value, expected {expected}")]
    UnexpectedOutput {
        /// Requested type name
        expected: &'static str,
    },
}

/// Handle to an operation started by [`SuspendableActivity::start_operation`]
///
/// Carries the synchronous-completion flag and, once the operation finished,
/// its result. Consumed exactly once by
/// [`SuspendableActivity::finish_operation`].
pub struct PendingOperation {
    completed_synchronously: bool,
    result: Option<Result<Box<dyn Any + Send>, Fault>>,
}

impl PendingOperation {
    /// The operation already finished with `value` before start returned
    pub fn completed<T: Any + Send>(value: T) -> Self {
        Self::completed_with(Ok(value))
    }

    /// The operation already finished with `result` before start returned
    pub fn completed_with<T: Any + Send>(result: Result<T, Fault>) -> Self {
        Self {
            completed_synchronously: true,
            result: Some(result.map(|value| Box::new(value) as Box<dyn Any + Send>)),
        }
    }

    /// The operation is still running; its continuation will fire later
    pub fn in_flight() -> Self {
        Self {
            completed_synchronously: false,
            result: None,
        }
    }

    /// The operation finished asynchronously with `value`
    pub fn resolved<T: Any + Send>(value: T) -> Self {
        Self::resolved_with(Ok(value))
    }

    /// The operation finished asynchronously with `result`
    pub fn resolved_with<T: Any + Send>(result: Result<T, Fault>) -> Self {
        Self {
            completed_synchronously: false,
            result: Some(result.map(|value| Box::new(value) as Box<dyn Any + Send>)),
        }
    }

    /// The operation failed asynchronously
    pub fn failed(fault: Fault) -> Self {
        Self {
            completed_synchronously: false,
            result: Some(Err(fault)),
        }
    }

    /// Whether the operation finished before start returned
    pub fn completed_synchronously(&self) -> bool {
        self.completed_synchronously
    }

    /// Whether a result is available
    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Extract the operation's result, re-raising its fault
    pub fn into_result<T: Any>(self) -> Result<T, Fault> {
        match self.result {
            None => Err(Fault::new(BridgeError::NotFinished)),
            Some(Err(fault)) => Err(fault),
            Some(Ok(value)) => value.downcast::<T>().map(|value| *value).map_err(|_| {
                Fault::new(BridgeError::UnexpectedOutput {
                    expected: std::any::type_name::<T>(),
                })
            }),
        }
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.result {
            None => "in flight",
            Some(Ok(_)) => "succeeded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("PendingOperation")
            .field("completed_synchronously", &self.completed_synchronously)
            .field("state", &state)
            .finish()
    }
}

/// Callback an operation invokes when it finishes
///
/// May be moved to and invoked from any thread. Completing consumes the
/// continuation, so it fires at most once.
pub struct Continuation {
    proxy: InstanceProxy,
    bookmark: BookmarkName,
    span: tracing::Span,
}

impl Continuation {
    pub(crate) fn new(proxy: InstanceProxy, bookmark: BookmarkName) -> Self {
        Self {
            proxy,
            bookmark,
            span: tracing::Span::current(),
        }
    }

    /// Bookmark this continuation resumes
    pub fn bookmark(&self) -> &BookmarkName {
        &self.bookmark
    }

    /// Report completion of the operation
    ///
    /// A token flagged as synchronously completed is ignored: the adapter
    /// already collected the result inline. Returns whether a resumption was
    /// queued.
    pub fn complete(self, token: PendingOperation) -> bool {
        if token.completed_synchronously() {
            tracing::trace!("Ignoring synchronous completion for {}", self.bookmark);
            return false;
        }
        let _entered = self.span.enter();
        match self.proxy.resume_bookmark(&self.bookmark, Box::new(token)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not resume bookmark {}: {}", self.bookmark, e);
                false
            }
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("bookmark", &self.bookmark)
            .field("instance", &self.proxy.instance_id())
            .finish()
    }
}

/// An activity backed by a native asynchronous operation
///
/// Wrap implementations in [`Suspendable`] (or use [`suspendable`]) to get an
/// [`Activity`]. Use `Output = ()` for operations without a result.
pub trait SuspendableActivity: Send + Sync + 'static {
    /// Value stored as the activity result
    type Output: Send + 'static;

    /// Name used in logs and tracking records
    fn display_name(&self) -> String {
        short_type_name::<Self>().to_string()
    }

    /// Describe children, required extensions and validation problems
    fn cache_metadata(&self, _metadata: &mut ActivityMetadata) {}

    /// Start the operation
    ///
    /// Called on the scheduler turn. Return a token from
    /// [`PendingOperation::completed`] when the operation finished already,
    /// or [`PendingOperation::in_flight`] after arranging for `continuation`
    /// to be completed later.
    fn start_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        continuation: Continuation,
    ) -> Result<PendingOperation, Fault>;

    /// Collect the result of a finished operation
    fn finish_operation(
        &self,
        ctx: &mut ActivityContext<'_>,
        token: PendingOperation,
    ) -> Result<Self::Output, Fault>;

    /// Abandon an operation that is still running
    fn cancel_operation(&self, _ctx: &mut ActivityContext<'_>) {}
}

/// Adapter running a [`SuspendableActivity`] as an [`Activity`]
pub struct Suspendable<A> {
    inner: A,
}

struct Suspension {
    bookmark: Bookmark,
    no_persist: NoPersistHandle,
}

impl<A: SuspendableActivity> Suspendable<A> {
    /// Wrap an operation
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    /// The wrapped operation
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

/// Wrap an operation into a shareable activity
pub fn suspendable<A: SuspendableActivity>(inner: A) -> ActivityRef {
    Arc::new(Suspendable::new(inner))
}

impl<A: SuspendableActivity> Activity for Suspendable<A> {
    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        metadata.require_extension::<SuspensionExtension>();
        self.inner.cache_metadata(metadata);
    }

    fn can_induce_idle(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        let no_persist = ctx.enter_no_persist();
        let bookmark = ctx.create_bookmark();

        let Some(extension) = ctx.extension::<SuspensionExtension>() else {
            ctx.remove_bookmark(&bookmark);
            ctx.exit_no_persist(no_persist);
            return Err(Fault::new(BridgeError::MissingExtension(
                "SuspensionExtension",
            )));
        };
        let continuation =
            Continuation::new(extension.proxy().clone(), bookmark.name().clone());

        let token = match self.inner.start_operation(ctx, continuation) {
            Ok(token) => token,
            Err(fault) => {
                ctx.remove_bookmark(&bookmark);
                ctx.exit_no_persist(no_persist);
                tracing::debug!("{} failed to start: {}", ctx.display_name(), fault);
                return Err(fault);
            }
        };

        if token.completed_synchronously() {
            ctx.exit_no_persist(no_persist);
            ctx.remove_bookmark(&bookmark);
            let output = self.inner.finish_operation(ctx, token)?;
            ctx.set_result(output);
            return Ok(());
        }

        tracing::debug!("{} suspended on {}", ctx.display_name(), bookmark.name());
        ctx.set_state(Suspension {
            bookmark,
            no_persist,
        });
        Ok(())
    }

    fn on_bookmark_resumed(
        &self,
        ctx: &mut ActivityContext<'_>,
        bookmark: &Bookmark,
        payload: BookmarkPayload,
    ) -> Result<(), Fault> {
        let Some(suspension) = ctx.take_state::<Suspension>() else {
            tracing::warn!(
                "{} resumed on {} without a pending operation",
                ctx.display_name(),
                bookmark.name()
            );
            return Ok(());
        };
        ctx.exit_no_persist(suspension.no_persist);

        let token = payload
            .downcast::<PendingOperation>()
            .map_err(|_| Fault::new(BridgeError::UnexpectedPayload(bookmark.name().to_string())))?;
        let output = self.inner.finish_operation(ctx, *token)?;
        ctx.set_result(output);
        Ok(())
    }

    fn cancel(&self, ctx: &mut ActivityContext<'_>) {
        if let Some(suspension) = ctx.take_state::<Suspension>() {
            ctx.exit_no_persist(suspension.no_persist);
            ctx.remove_bookmark(&suspension.bookmark);
            self.inner.cancel_operation(ctx);
            tracing::debug!("Canceled pending operation of {}", ctx.display_name());
        }
        ctx.mark_canceled();
    }
}

/// Last path segment of a type name, without generic arguments
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
