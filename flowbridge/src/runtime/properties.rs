//! Execution properties inherited down the activity tree

use crate::dispatch::TaskDispatcher;
use std::fmt;
use std::sync::Arc;

/// Per-execution property bag
///
/// Every child receives a copy of its parent's properties when it is
/// scheduled. Changes a parent makes afterwards are not seen by children
/// already running, and changes a child makes never reach the parent.
#[derive(Clone, Default)]
pub struct ExecutionProperties {
    dispatcher: Option<Arc<dyn TaskDispatcher>>,
}

impl ExecutionProperties {
    /// Dispatcher published by the nearest enclosing scope
    pub fn dispatcher(&self) -> Option<&Arc<dyn TaskDispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Publish a dispatcher for children scheduled from now on
    pub fn set_dispatcher(&mut self, dispatcher: Arc<dyn TaskDispatcher>) {
        self.dispatcher = Some(dispatcher);
    }

    /// Remove the published dispatcher, returning it
    pub fn clear_dispatcher(&mut self) -> Option<Arc<dyn TaskDispatcher>> {
        self.dispatcher.take()
    }
}

impl fmt::Debug for ExecutionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionProperties")
            .field("dispatcher", &self.dispatcher.as_ref().map(|d| d.name().to_string()))
            .finish()
    }
}
