//! Builder activities that work with the bridge
//!
//! Only the control flow needed around suspendable operations is provided:
//! sequencing, parallelism, iteration, delays and retries, plus closure
//! backed code activities.

mod composite;
mod delay;
mod func;
mod iteration;
pub mod retry;

pub use composite::{Parallel, Sequence};
pub use delay::Delay;
pub use func::{code, FuncActivity};
pub use iteration::{ForEach, ParallelForEach, Select};
pub use retry::{Backoff, Retry, RetryExhaustedError, RetryOutcome, RetryOutputs};
