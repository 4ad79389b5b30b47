use super::TaskDispatcher;
use crate::fault::Fault;
use crate::runtime::{
    Activity, ActivityContext, ActivityMetadata, ActivityRef, ChildOutcome, CompletedChild,
    NoPersistHandle,
};
use std::sync::Arc;

/// Runs its body with a designated dispatcher
///
/// Every task activity inside the body resolves this dispatcher unless a
/// nested scope shadows it. The scope keeps the instance from being
/// persisted while the body runs.
pub struct DispatcherScope {
    display_name: String,
    dispatcher: Arc<dyn TaskDispatcher>,
    body: Option<ActivityRef>,
}

struct ScopeState {
    no_persist: NoPersistHandle,
}

impl DispatcherScope {
    /// Create a scope without a body
    pub fn new(dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        Self {
            display_name: format!("DispatcherScope({})", dispatcher.name()),
            dispatcher,
            body: None,
        }
    }

    /// Set the body
    pub fn body(mut self, body: ActivityRef) -> Self {
        self.body = Some(body);
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
}

impl Activity for DispatcherScope {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn cache_metadata(&self, metadata: &mut ActivityMetadata) {
        match &self.body {
            Some(body) => metadata.add_child(body),
            None => metadata.add_validation_error("Body must be set"),
        }
    }

    fn execute(&self, ctx: &mut ActivityContext<'_>) -> Result<(), Fault> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Fault::msg(format!("{} has no body", self.display_name)))?;

        let no_persist = ctx.enter_no_persist();
        ctx.properties_mut().set_dispatcher(self.dispatcher.clone());
        ctx.set_state(ScopeState { no_persist });
        tracing::debug!("Entering dispatcher scope {}", self.dispatcher.name());
        ctx.schedule_child(body);
        Ok(())
    }

    fn on_child_completed(
        &self,
        ctx: &mut ActivityContext<'_>,
        child: CompletedChild,
    ) -> Result<(), Fault> {
        ctx.properties_mut().clear_dispatcher();
        if let Some(state) = ctx.take_state::<ScopeState>() {
            ctx.exit_no_persist(state.no_persist);
        }
        tracing::debug!("Leaving dispatcher scope {}", self.dispatcher.name());

        match child.outcome {
            ChildOutcome::Closed(output) => {
                ctx.set_output(output);
                Ok(())
            }
            ChildOutcome::Faulted(fault) => Err(fault),
            ChildOutcome::Canceled => {
                ctx.mark_canceled();
                Ok(())
            }
        }
    }
}
