//! # flowbridge
//!
//! Bridges native Rust futures into a resumable, tree-structured workflow
//! runtime.
//!
//! ## Features
//!
//! - **Suspendable activities**: Start an operation, suspend on a bookmark and
//!   resume from any thread when it finishes, or complete in the same turn
//! - **Task activities**: Run a future through a pluggable dispatcher
//! - **Dispatcher scopes**: Choose where the work of a subtree runs
//! - **Retry**: Attempt a body repeatedly with an exception handler and backoff
//! - **Host runtime**: Cooperative scheduler with bookmarks, no-persist scopes
//!   and an instance store seam
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowbridge::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let workflow = Sequence::new(vec![
//!     Delay::new(Duration::from_millis(50)).into_ref(),
//!     task_fn("answer", |_ctx, dispatcher| {
//!         Ok(Some(dispatcher.run(|| async { Ok::<_, Fault>(42u32) })))
//!     }),
//! ])
//! .into_ref();
//!
//! let outcome = WorkflowHost::new().run(workflow).await?;
//! let answer = outcome.output().and_then(|output| output.downcast_ref::<u32>());
//! assert_eq!(answer, Some(&42));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Built-in activities
pub mod activities;

/// Suspendable and task activity adapters
pub mod bridge;

/// Shared utilities
pub mod common;

/// Host configuration
pub mod config;

/// Task dispatchers and dispatcher scopes
pub mod dispatch;

/// Fault type raised by activities
pub mod fault;

/// Workflow host runtime
pub mod runtime;

pub use bridge::task::{task, task_fn, TaskActivity, TaskAdapter};
pub use bridge::{
    suspendable, BridgeError, Continuation, PendingOperation, Suspendable, SuspendableActivity,
};
pub use config::{ConfigError, ConfigResult, DispatcherKind, HostConfig};
pub use dispatch::{
    DispatchError, DispatcherExtension, DispatcherScope, InlineDispatcher, PoolDispatcher,
    TaskDispatcher, TaskDispatcherExt, TaskFuture,
};
pub use fault::Fault;
pub use runtime::{
    Activity, ActivityContext, ActivityMetadata, ActivityOutput, ActivityRef, InstanceProxy,
    InstanceStatus, RunState, RuntimeError, RuntimeResult, WorkflowHost, WorkflowInstance,
    WorkflowInstanceId, WorkflowOutcome,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        suspendable, task, task_fn, Activity, ActivityContext, ActivityMetadata, ActivityRef,
        Continuation, DispatcherScope, Fault, HostConfig, InlineDispatcher, PendingOperation,
        PoolDispatcher, RunState, RuntimeError, SuspendableActivity, TaskActivity,
        TaskDispatcher, TaskDispatcherExt, TaskFuture, WorkflowHost, WorkflowOutcome,
    };

    pub use crate::activities::{
        code, Backoff, Delay, ForEach, Parallel, ParallelForEach, Retry, RetryExhaustedError,
        RetryOutcome, RetryOutputs, Select, Sequence,
    };
}

/// Test utilities module for testing support
#[doc(hidden)]
pub mod test_utils;
