//! Retry loop with exception handler and backoff

use super::delay::Delay;
use crate::bridge::suspendable;
use crate::fault::Fault;
use crate::runtime::{
    Activity, ActivityContext, ActivityMetadata, ActivityRef, ChildOutcome, CompletedChild,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Attempts made when no limit is configured
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Wait inserted between a failed attempt and the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Start the next attempt immediately
    #[default]
    None,
    /// Fixed delay between attempts
    Fixed(Duration),
    /// Exponential backoff with base delay and max delay
    Exponential {
        /// Delay after the first failure
        base: Duration,
        /// Upper bound for any delay
        max: Duration,
    },
}

impl Backoff {
    /// Delay after failed attempt number `attempt` (starting at 1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(multiplier).min(max)
            }
        }
    }
}

/// Attempt log of one retry execution
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Faults of the failed attempts, first attempt first
    pub exceptions: Vec<Fault>,
}

impl RetryOutcome {
    /// Whether the last attempt succeeded
    pub fn succeeded(&self) -> bool {
        (self.exceptions.len() as u32) < self.attempts
    }
}

/// Raised when every attempt failed
#[derive(Debug, Clone, Error)]
#[error("Retry exhausted after {attempts} attempt(s): {}", join_faults(.exceptions))]
pub struct RetryExhaustedError {
    /// Attempts made
    pub attempts: u32,
    /// Faults of all attempts, first attempt first
    pub exceptions: Vec<Fault>,
}

fn join_faults(faults: &[Fault]) -> String {
    faults
        .iter()
        .map(|fault| fault.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Shared slot receiving the attempt log of a retry
///
/// Written on success and on exhaustion, before the retry completes.
#[derive(Debug, Clone, Default)]
pub struct RetryOutputs(Arc<Mutex<Option<RetryOutcome>>>);

impl RetryOutputs {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded attempt log
    pub fn get(&self) -> Option<RetryOutcome> {
        match self.0.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, outcome: RetryOutcome) {
        match self.0.lock() {
            Ok(mut slot) => *slot = Some(outcome),
            Err(poisoned) => *poisoned.into_inner() = Some(outcome),
        }
    }
}

/// Runs a body until it succeeds or the attempt limit is reached
///
/// After each failed attempt the `on_exception` handler runs with the
/// attempt's [`Fault`] as its argument, then the backoff delay elapses,
/// then the next attempt starts. The handler also runs for the last failed
/// attempt, before the retry gives up. On success the retry's result is a
/// [`RetryOutcome`]; the body's own output is discarded. When every
/// attempt failed, the retry faults with [`RetryExhaustedError`].
pub struct Retry {
    display_name: String,
    body: Option<ActivityRef>,
    max_attempts: u32,
    on_exception: Option<ActivityRef>,
    backoff: Backoff,
    delay: ActivityRef,
    outputs: Option<RetryOutputs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Attempt,
    Handler,
    Backoff,
}

struct RetryState {
    attempts: u32,
    exceptions: Vec<Fault>,
    phase: Phase,
}

impl Retry {
    /// Create a retry without a body
    pub fn new() -> Self {
        Self {
            display_name: "Retry".to_string(),
            body: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            on_exception: None,
            backoff: Backoff::None,
            delay: suspendable(Delay::new(Duration::ZERO)),
            outputs: None,
        }
    }

    /// Set the body
    pub fn body(mut self, body: ActivityRef) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the attempt limit
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Run `handler` after every failed attempt
    pub fn on_exception(mut self, handler: ActivityRef) -> Self {
        self.on_exception = Some(handler);
        self
    }

    /// Wait between attempts
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Record the attempt log into `outputs`
    pub fn outputs(mut self, outputs: RetryOutputs) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Override the display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Wrap into a shareable activity
    pub fn into_ref(self) -> ActivityRef {
        Arc::new(self)
    }

    fn start_attempt(
        &self,
        ctx: &mut ActivityContext<'_>,
        body: &ActivityRef,
        mut state: RetryState,
    ) {
        state.attempts += 1;
        state.phase = Phase::Attempt;
        tracing::debug!(
            "{}: starting attempt {}/{}",
            self.display_name,
            state.attempts,
            self.max_attempts
        );
        ctx.schedule_child(body);
        ctx.set_state(state);
    }

    /// Continue after a failed attempt was handled: give up, wait or retry
    fn after_handler(
        &self,
        ctx: &mut ActivityContext<'_>,
        body: &ActivityRef,
        mut state: RetryState,
    ) -> Result<(), Fault> {
        if state.attempts >= self.max_attempts {
            let outcome = RetryOutcome {
                attempts: state.attempts,
                exceptions: state.exceptions,
            };
            self.record(&outcome);
            return Err(Fault::new(RetryExhaustedError {
                attempts: outcome.attempts,
                exceptions: outcome.exceptions,
            }));
        }

        let delay = self.backoff.delay_for(state.attempts);
        if delay.is_zero() {
            self.start_attempt(ctx, body, state);
            return Ok(());
        }
        tracing::debug!("{}: waiting {:?} before retry", self.display_name, delay);
        state.phase = Phase::Backoff;
        ctx.schedule_child_with(&self.delay, delay);
        ctx.set_state(state);
        Ok(())
    }

    fn record(&self, outcome: &RetryOutcome) {
        if let Some(outputs) = &self.outputs {
            outputs.record(outcome.clone());
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity for Retry {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        match &self.body {
            Some(body) => metadata.add_child(body),
            None => metadata.add_validation_error("Body must be set"),
        }
        if self.max_attempts == 0 {
            metadata.add_validation_error("MaxAttempts must be greater than zero");
        }
        if let Some(handler) = &self.on_exception {
            metadata.add_child(handler);
        }
        if self.backoff != Backoff::None {
            metadata.add_child(&self.delay);
        }
    }

    fn can_induce_idle(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Fault::msg(format!("{} has no body", self.display_name)))?;
        if self.max_attempts == 0 {
            return Err(Fault::msg(format!(
                "{} must allow at least one attempt",
                self.display_name
            )));
        }
        let state = RetryState {
            attempts: 0,
            exceptions: Vec::new(),
            phase: Phase::Attempt,
        };
        self.start_attempt(ctx, body, state);
        Ok(())
    }

    fn on_child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: CompletedChild,
    ) -> Result<(), Fault> {
        let (Some(mut state), Some(body)) = (ctx.take_state::<RetryState>(), self.body.as_ref())
        else {
            return Ok(());
        };

        if ctx.is_cancellation_requested() {
            ctx.mark_canceled();
            return Ok(());
        }

        match (state.phase, child.outcome) {
            (_, ChildOutcome::Canceled) => {
                ctx.mark_canceled();
                Ok(())
            }
            (Phase::Attempt, ChildOutcome::Closed(_)) => {
                let outcome = RetryOutcome {
                    attempts: state.attempts,
                    exceptions: state.exceptions,
                };
                tracing::info!(
                    "{} succeeded on attempt {}/{}",
                    self.display_name,
                    outcome.attempts,
                    self.max_attempts
                );
                self.record(&outcome);
                ctx.set_result(outcome);
                Ok(())
            }
            (Phase::Attempt, ChildOutcome::Faulted(fault)) => {
                tracing::warn!(
                    "{}: attempt {}/{} failed: {}",
                    self.display_name,
                    state.attempts,
                    self.max_attempts,
                    fault
                );
                state.exceptions.push(fault.clone());

                match &self.on_exception {
                    Some(handler) => {
                        state.phase = Phase::Handler;
                        ctx.schedule_child_with(handler, fault);
                        ctx.set_state(state);
                        Ok(())
                    }
                    None => self.after_handler(ctx, body, state),
                }
            }
            (Phase::Handler, ChildOutcome::Closed(_)) => self.after_handler(ctx, body, state),
            (Phase::Backoff, ChildOutcome::Closed(_)) => {
                self.start_attempt(ctx, body, state);
                Ok(())
            }
            (Phase::Handler | Phase::Backoff, ChildOutcome::Faulted(fault)) => Err(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_and_no_backoff() {
        assert_eq!(Backoff::None.delay_for(3), Duration::ZERO);
        assert_eq!(
            Backoff::Fixed(Duration::from_secs(1)).delay_for(9),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_exhausted_error_lists_faults_in_order() {
        let error = RetryExhaustedError {
            attempts: 2,
            exceptions: vec![Fault::msg("C1"), Fault::msg("C2")],
        };
        assert_eq!(error.to_string(), "Retry exhausted after 2 attempt(s): C1; C2");
    }

    #[test]
    fn test_outcome_success_flag() {
        let success = RetryOutcome {
            attempts: 3,
            exceptions: vec![Fault::msg("A"), Fault::msg("B")],
        };
        let exhausted = RetryOutcome {
            attempts: 2,
            exceptions: vec![Fault::msg("C"), Fault::msg("C")],
        };
        assert!(success.succeeded());
        assert!(!exhausted.succeeded());
    }

    #[test]
    fn test_metadata_reports_missing_body_and_zero_attempts() {
        let retry = Retry::new().max_attempts(0);
        let mut metadata = ActivityMetadata::default();
        retry.cache_metadata(&mut metadata);
        assert_eq!(
            metadata.validation_errors(),
            &[
                "Body must be set".to_string(),
                "MaxAttempts must be greater than zero".to_string()
            ]
        );
    }
}
