//! Host that validates activity trees and creates instances

use super::activity::{ActivityMetadata, ActivityRef};
use super::extensions::{Extensions, InstanceProxy, SuspensionExtension};
use super::instance::{WorkflowInstance, WorkflowOutcome};
use super::store::InstanceStore;
use super::{RuntimeError, RuntimeResult, WorkflowInstanceId};
use crate::config::{DispatcherKind, HostConfig};
use crate::dispatch::{DispatcherExtension, InlineDispatcher, PoolDispatcher, TaskDispatcher};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Creates and runs workflow instances
///
/// The default dispatcher is fixed when the host is built and is handed to
/// every instance through [`DispatcherExtension`].
pub struct WorkflowHost {
    config: HostConfig,
    default_dispatcher: Option<Arc<dyn TaskDispatcher>>,
    extensions: Extensions,
    store: Option<Arc<dyn InstanceStore>>,
}

enum DispatcherChoice {
    FromConfig,
    Explicit(Arc<dyn TaskDispatcher>),
    Disabled,
}

/// Builder for [`WorkflowHost`]
pub struct WorkflowHostBuilder {
    config: HostConfig,
    dispatcher: DispatcherChoice,
    extensions: Extensions,
    store: Option<Arc<dyn InstanceStore>>,
}

impl WorkflowHostBuilder {
    /// Use the given configuration
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this dispatcher as the host default
    pub fn default_dispatcher(mut self, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        self.dispatcher = DispatcherChoice::Explicit(dispatcher);
        self
    }

    /// Build the host without a default dispatcher
    ///
    /// Trees containing task activities then fail validation, since task
    /// activities require [`DispatcherExtension`].
    pub fn without_default_dispatcher(mut self) -> Self {
        self.dispatcher = DispatcherChoice::Disabled;
        self
    }

    /// Attach an extension to every instance
    pub fn extension<E: Any + Send + Sync>(mut self, extension: E) -> Self {
        self.extensions.insert(extension);
        self
    }

    /// Persist instances to this store
    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the host
    pub fn build(self) -> WorkflowHost {
        let default_dispatcher = match self.dispatcher {
            DispatcherChoice::Explicit(dispatcher) => Some(dispatcher),
            DispatcherChoice::Disabled => None,
            DispatcherChoice::FromConfig => Some(match self.config.default_dispatcher {
                DispatcherKind::Inline => Arc::new(InlineDispatcher) as Arc<dyn TaskDispatcher>,
                DispatcherKind::Pool => Arc::new(PoolDispatcher::new()),
            }),
        };
        WorkflowHost {
            config: self.config,
            default_dispatcher,
            extensions: self.extensions,
            store: self.store,
        }
    }
}

impl WorkflowHost {
    /// Create a host with default configuration and the inline dispatcher
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a host
    pub fn builder() -> WorkflowHostBuilder {
        WorkflowHostBuilder {
            config: HostConfig::default(),
            dispatcher: DispatcherChoice::FromConfig,
            extensions: Extensions::new(),
            store: None,
        }
    }

    /// Host configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Dispatcher handed to instances, if any
    pub fn default_dispatcher(&self) -> Option<&Arc<dyn TaskDispatcher>> {
        self.default_dispatcher.as_ref()
    }

    /// Validate a tree and create an instance for it
    pub fn create_instance(&self, root: ActivityRef) -> RuntimeResult<WorkflowInstance> {
        let instance_id = WorkflowInstanceId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let proxy = InstanceProxy::new(instance_id, sender);

        let mut extensions = self.extensions.clone();
        if let Some(dispatcher) = &self.default_dispatcher {
            extensions.insert(DispatcherExtension::new(dispatcher.clone()));
        }
        extensions.insert(SuspensionExtension::new(proxy.clone()));

        let summary = validate_tree(&root, &extensions)?;
        tracing::debug!(
            "Validated workflow {} ({} activities)",
            root.display_name(),
            summary.activity_count
        );

        Ok(WorkflowInstance::new(
            instance_id,
            root,
            extensions,
            proxy,
            receiver,
            self.store.clone(),
            &self.config,
            summary.can_induce_idle,
        ))
    }

    /// Create an instance and run it to completion
    pub async fn run(&self, root: ActivityRef) -> RuntimeResult<WorkflowOutcome> {
        let mut instance = self.create_instance(root)?;
        instance.run().await
    }
}

impl Default for WorkflowHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkflowHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHost")
            .field("config", &self.config)
            .field("default_dispatcher", &self.default_dispatcher)
            .field("extensions", &self.extensions)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

struct TreeSummary {
    activity_count: usize,
    can_induce_idle: bool,
}

/// Walk the declared tree, collecting every validation problem
fn validate_tree(root: &ActivityRef, extensions: &Extensions) -> RuntimeResult<TreeSummary> {
    let mut errors = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![root.clone()];
    let mut summary = TreeSummary {
        activity_count: 0,
        can_induce_idle: false,
    };

    while let Some(activity) = pending.pop() {
        // Definitions may be shared by several parents; walk each once
        if !visited.insert(Arc::as_ptr(&activity) as *const () as usize) {
            continue;
        }
        summary.activity_count += 1;
        summary.can_induce_idle |= activity.can_induce_idle();

        let mut metadata = ActivityMetadata::default();
        activity.cache_metadata(&mut metadata);
        let name = activity.display_name();

        for error in &metadata.errors {
            errors.push(format!("{}: {}", name, error));
        }
        for required in &metadata.required_extensions {
            if !extensions.contains_type_id(required.type_id) {
                errors.push(format!(
                    "{}: required extension {} is not available",
                    name, required.type_name
                ));
            }
        }
        pending.extend(metadata.children);
    }

    if errors.is_empty() {
        Ok(summary)
    } else {
        Err(RuntimeError::ValidationFailed(errors.join("; ")))
    }
}
