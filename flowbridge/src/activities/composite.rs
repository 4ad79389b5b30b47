use crate::fault::Fault;
use crate::runtime::{
    Activity, ActivityContext, ActivityMetadata, ActivityRef, ChildOutcome, CompletedChild,
};
use std::sync::Arc;

/// Runs its children one after another
///
/// The output of the last child becomes the sequence's output. A faulting
/// child faults the sequence; the remaining children never run.
pub struct Sequence {
    display_name: String,
    activities: Vec<ActivityRef>,
}

struct NextChild(usize);

impl Sequence {
    /// Create a sequence over `activities`
    pub fn new(activities: Vec<ActivityRef>) -> Self {
        Self {
            display_name: "Sequence".to_string(),
            activities,
        }
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

    fn schedule_next(&self, ctx: &mut ActivityContext<'_>) {
        let next = ctx.state::<NextChild>().map(|n| n.0).unwrap_or(0);
        if let Some(activity) = self.activities.get(next) {
            ctx.set_state(NextChild(next + 1));
            ctx.schedule_child(activity);
        }
    }
}

impl Activity for Sequence {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        for activity in &self.activities {
            metadata.add_child(activity);
        }
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        self.schedule_next(ctx);
        Ok(())
    }

    fn on_child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: CompletedChild,
    ) -> Result<(), Fault> {
        match child.outcome {
            ChildOutcome::Faulted(fault) => Err(fault),
            ChildOutcome::Canceled => {
                ctx.mark_canceled();
                Ok(())
            }
            ChildOutcome::Closed(_) if ctx.is_cancellation_requested() => {
                ctx.mark_canceled();
                Ok(())
            }
            ChildOutcome::Closed(output) => {
                ctx.set_output(output);
                self.schedule_next(ctx);
                Ok(())
            }
        }
    }
}

/// Runs all children at once
///
/// Completes when every child completed. The first child fault faults the
/// parallel and aborts the branches still running.
pub struct Parallel {
    display_name: String,
    branches: Vec<ActivityRef>,
}

impl Parallel {
    /// Create a parallel over `branches`
    pub fn new(branches: Vec<ActivityRef>) -> Self {
        Self {
            display_name: "Parallel".to_string(),
            branches,
        }
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
}

impl Activity for Parallel {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        for branch in &self.branches {
            metadata.add_child(branch);
        }
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        for branch in &self.branches {
            ctx.schedule_child(branch);
        }
        Ok(())
    }

    fn on_child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: CompletedChild,
    ) -> Result<(), Fault> {
        match child.outcome {
            ChildOutcome::Faulted(fault) => Err(fault),
            ChildOutcome::Canceled => {
                ctx.mark_canceled();
                Ok(())
            }
            ChildOutcome::Closed(_) => Ok(()),
        }
    }
}
