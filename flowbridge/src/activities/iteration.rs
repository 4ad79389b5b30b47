//! Activities that run a body once per item
//!
//! The body reads its item through [`ActivityContext::argument`].

use crate::fault::Fault;
use crate::runtime::{
    Activity, ActivityContext, ActivityInstanceId, ActivityMetadata, ActivityRef, ChildOutcome,
    CompletedChild,
};
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Runs the body for each item, one at a time, in order
pub struct ForEach<T> {
    items: Vec<T>,
    body: ActivityRef,
}

struct NextItem(usize);

impl<T: Clone + Send + Sync + 'static> ForEach<T> {
    /// Iterate `items` with `body`
    pub fn new(items: Vec<T>, body: ActivityRef) -> Self {
        Self { items, body }
    }

    /// Wrap into a shareable activity
    pub fn into_ref(self) -> ActivityRef {
        Arc::new(self)
    }

    fn schedule_next(&self, ctx: &mut ActivityContext<'_>) {
        let next = ctx.state::<NextItem>().map(|n| n.0).unwrap_or(0);
        if let Some(item) = self.items.get(next) {
            ctx.set_state(NextItem(next + 1));
            ctx.schedule_child_with(&self.body, item.clone());
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Activity for ForEach<T> {
    fn display_name(&self) -> String {
        "ForEach".to_string()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        metadata.add_child(&self.body);
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
            ChildOutcome::Closed(_) => {
                self.schedule_next(ctx);
                Ok(())
            }
        }
    }
}

/// Runs the body for every item at once
pub struct ParallelForEach<T> {
    items: Vec<T>,
    body: ActivityRef,
}

impl<T: Clone + Send + Sync + 'static> ParallelForEach<T> {
    /// Iterate `items` with `body`
    pub fn new(items: Vec<T>, body: ActivityRef) -> Self {
        Self { items, body }
    }

    /// Wrap into a shareable activity
    pub fn into_ref(self) -> ActivityRef {
        Arc::new(self)
    }
}

impl<T: Clone + Send + Sync + 'static> Activity for ParallelForEach<T> {
    fn display_name(&self) -> String {
        "ParallelForEach".to_string()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        metadata.add_child(&self.body);
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        for item in &self.items {
            ctx.schedule_child_with(&self.body, item.clone());
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

/// Maps every item through the body in parallel
///
/// The body must produce an `R`; the outputs are collected into a `Vec<R>`
/// in item order.
pub struct Select<T, R> {
    items: Vec<T>,
    body: ActivityRef,
    _output: PhantomData<fn() -> R>,
}

struct Selection<R> {
    slots: Vec<Option<R>>,
    index_of: HashMap<ActivityInstanceId, usize>,
}

impl<T, R> Select<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: Any + Send,
{
    /// Map `items` through `body`
    pub fn new(items: Vec<T>, body: ActivityRef) -> Self {
        Self {
            items,
            body,
            _output: PhantomData,
        }
    }

    /// Wrap into a shareable activity
    pub fn into_ref(self) -> ActivityRef {
        Arc::new(self)
    }
}

impl<T, R> Activity for Select<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: Any + Send,
{
    fn display_name(&self) -> String {
        "Select".to_string()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        metadata.add_child(&self.body);
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        if self.items.is_empty() {
            ctx.set_result(Vec::<R>::new());
            return Ok(());
        }
        let mut selection = Selection::<R> {
            slots: (0..self.items.len()).map(|_| None).collect(),
            index_of: HashMap::new(),
        };
        for (index, item) in self.items.iter().enumerate() {
            let child = ctx.schedule_child_with(&self.body, item.clone());
            selection.index_of.insert(child, index);
        }
        ctx.set_state(selection);
        Ok(())
    }

    fn on_child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: CompletedChild,
    ) -> Result<(), Fault> {
        let output = match child.outcome {
            ChildOutcome::Faulted(fault) => return Err(fault),
            ChildOutcome::Canceled => {
                ctx.mark_canceled();
                return Ok(());
            }
            ChildOutcome::Closed(output) => output,
        };
        let value = output.take::<R>().ok_or_else(|| {
            Fault::msg(format!(
                "Select body {} produced no {}",
                child.display_name,
                std::any::type_name::<R>()
            ))
        })?;

        let Some(selection) = ctx.state_mut::<Selection<R>>() else {
            return Ok(());
        };
        if let Some(index) = selection.index_of.remove(&child.id) {
            selection.slots[index] = Some(value);
        }
        if selection.index_of.is_empty() {
            if let Some(selection) = ctx.take_state::<Selection<R>>() {
                let results: Vec<R> = selection.slots.into_iter().flatten().collect();
                ctx.set_result(results);
            }
        }
        Ok(())
    }
}
