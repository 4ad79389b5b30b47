//! Where asynchronous work started by task activities runs
//!
//! A [`TaskDispatcher`] decides how an operation is started: on the calling
//! thread ([`InlineDispatcher`]) or on a tokio worker ([`PoolDispatcher`]).
//! Task activities resolve their dispatcher from the nearest enclosing
//! [`DispatcherScope`], falling back to the host default carried by
//! [`DispatcherExtension`].

mod scope;

pub use scope::DispatcherScope;

use crate::fault::Fault;
use futures::future::{self, BoxFuture, FutureExt};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;

/// Type-erased value produced by a dispatched operation
pub type DispatchPayload = Box<dyn Any + Send>;

/// Future returned by [`TaskDispatcher::dispatch`]
pub type DispatchFuture = BoxFuture<'static, Result<DispatchPayload, Fault>>;

/// Operation handed to a dispatcher; calling it starts the work
pub type DispatchOperation = Box<dyn FnOnce() -> DispatchFuture + Send>;

/// Boxed future produced by task activities
pub type TaskFuture<T> = BoxFuture<'static, Result<T, Fault>>;

/// Errors raised by dispatchers
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The pool dispatcher found no tokio runtime to spawn on
    #[error("No tokio runtime is available to dispatch onto")]
    NoRuntime,
    /// The dispatched operation panicked
    #[error("Dispatched operation panicked: {0}")]
    Panicked(String),
    /// The dispatched task was cancelled by the runtime
    #[error("Dispatched operation was cancelled")]
    Cancelled,
    /// The operation produced a value of another type than requested
    #[error("Dispatched operation produced an unexpected value, expected {expected}")]
    UnexpectedOutput {
        /// Requested type name
        expected: &'static str,
    },
}

/// Strategy for starting asynchronous operations
pub trait TaskDispatcher: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Start an operation and return a future for its result
    fn dispatch(&self, operation: DispatchOperation) -> DispatchFuture;
}

/// Typed helpers over [`TaskDispatcher`]
pub trait TaskDispatcherExt: TaskDispatcher {
    /// Run an operation through this dispatcher
    ///
    /// Use `T = ()` for operations without a result.
    fn run<F, Fut, T>(&self, operation: F) -> TaskFuture<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
    {
        let erased: DispatchOperation = Box::new(move || {
            let started = operation();
            async move { started.await.map(|value| Box::new(value) as DispatchPayload) }.boxed()
        });
        let dispatched = self.dispatch(erased);
        async move {
            let payload = dispatched.await?;
            payload.downcast::<T>().map(|value| *value).map_err(|_| {
                Fault::new(DispatchError::UnexpectedOutput {
                    expected: std::any::type_name::<T>(),
                })
            })
        }
        .boxed()
    }
}

impl<D: TaskDispatcher + ?Sized> TaskDispatcherExt for D {}

/// Starts operations immediately on the calling thread
///
/// This is the documented host default.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl TaskDispatcher for InlineDispatcher {
    fn name(&self) -> &str {
        "inline"
    }

    fn dispatch(&self, operation: DispatchOperation) -> DispatchFuture {
        operation()
    }
}

/// Starts operations as tokio tasks
#[derive(Debug, Clone, Default)]
pub struct PoolDispatcher {
    handle: Option<Handle>,
}

impl PoolDispatcher {
    /// Spawn onto the runtime that is current when an operation is dispatched
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn onto a specific runtime
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl TaskDispatcher for PoolDispatcher {
    fn name(&self) -> &str {
        "pool"
    }

    fn dispatch(&self, operation: DispatchOperation) -> DispatchFuture {
        let handle = match self.handle.clone().or_else(|| Handle::try_current().ok()) {
            Some(handle) => handle,
            None => return future::ready(Err(Fault::new(DispatchError::NoRuntime))).boxed(),
        };
        let task = handle.spawn(async move { operation().await });
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    let message = panic_message(&*e.into_panic());
                    Err(Fault::new(DispatchError::Panicked(message)))
                }
                Err(_) => Err(Fault::new(DispatchError::Cancelled)),
            }
        }
        .boxed()
    }
}

/// Text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Extension carrying the host default dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherExtension {
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl DispatcherExtension {
    /// Wrap a dispatcher
    pub fn new(dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The default dispatcher
    pub fn dispatcher(&self) -> &Arc<dyn TaskDispatcher> {
        &self.dispatcher
    }
}
