//! Typed extension registry and the cross-thread instance proxy

use super::bookmark::{BookmarkName, BookmarkPayload};
use super::{RuntimeError, RuntimeResult, WorkflowInstanceId};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Host services attached to a workflow instance, looked up by type
#[derive(Clone, Default)]
pub struct Extensions {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: HashMap<TypeId, &'static str>,
}

impl Extensions {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an extension, replacing any previous one of the same type
    pub fn insert<E: Any + Send + Sync>(&mut self, extension: E) {
        self.insert_arc(Arc::new(extension));
    }

    /// Attach an already shared extension
    pub fn insert_arc<E: Any + Send + Sync>(&mut self, extension: Arc<E>) {
        let type_id = TypeId::of::<E>();
        self.entries.insert(type_id, extension);
        self.names.insert(type_id, std::any::type_name::<E>());
    }

    /// Look up an extension by type
    pub fn get<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        self.entries
            .get(&TypeId::of::<E>())
            .and_then(|entry| entry.clone().downcast::<E>().ok())
    }

    /// Whether an extension of the given type is attached
    pub fn contains<E: Any>(&self) -> bool {
        self.contains_type_id(TypeId::of::<E>())
    }

    pub(crate) fn contains_type_id(&self, type_id: TypeId) -> bool {
        self.entries.contains_key(&type_id)
    }

    /// Number of attached extensions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no extension is attached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names.values().collect();
        names.sort();
        f.debug_struct("Extensions").field("types", &names).finish()
    }
}

/// Signal sent to an instance from outside its scheduler turn
pub(crate) enum InstanceSignal {
    ResumeBookmark {
        name: BookmarkName,
        payload: BookmarkPayload,
    },
    Cancel,
}

impl fmt::Debug for InstanceSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceSignal::ResumeBookmark { name, .. } => f
                .debug_struct("ResumeBookmark")
                .field("name", name)
                .finish_non_exhaustive(),
            InstanceSignal::Cancel => f.write_str("Cancel"),
        }
    }
}

/// Thread-safe handle for resuming bookmarks of a running instance
///
/// Sending never blocks. Signals are queued and picked up by the instance
/// between work items, so a resumption issued while the owning activity is
/// still inside its execute call is processed after that call returns.
#[derive(Clone)]
pub struct InstanceProxy {
    instance_id: WorkflowInstanceId,
    sender: mpsc::UnboundedSender<InstanceSignal>,
}

impl InstanceProxy {
    pub(crate) fn new(
        instance_id: WorkflowInstanceId,
        sender: mpsc::UnboundedSender<InstanceSignal>,
    ) -> Self {
        Self {
            instance_id,
            sender,
        }
    }

    /// Instance this proxy talks to
    pub fn instance_id(&self) -> WorkflowInstanceId {
        self.instance_id
    }

    /// Resume a bookmark with a payload
    pub fn resume_bookmark(
        &self,
        name: &BookmarkName,
        payload: BookmarkPayload,
    ) -> RuntimeResult<()> {
        tracing::debug!("Queueing resumption of bookmark {}", name);
        self.send(InstanceSignal::ResumeBookmark {
            name: name.clone(),
            payload,
        })
    }

    /// Request cancellation of the root activity
    pub fn cancel(&self) -> RuntimeResult<()> {
        self.send(InstanceSignal::Cancel)
    }

    fn send(&self, signal: InstanceSignal) -> RuntimeResult<()> {
        self.sender
            .send(signal)
            .map_err(|_| RuntimeError::InstanceUnavailable(self.instance_id))
    }
}

impl fmt::Debug for InstanceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProxy")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

/// Extension that lets suspended activities resume their own bookmarks
///
/// The host attaches one per instance.
#[derive(Debug, Clone)]
pub struct SuspensionExtension {
    proxy: InstanceProxy,
}

impl SuspensionExtension {
    pub(crate) fn new(proxy: InstanceProxy) -> Self {
        Self { proxy }
    }

    /// Proxy of the instance the extension belongs to
    pub fn proxy(&self) -> &InstanceProxy {
        &self.proxy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Greeting(&'static str);

    #[test]
    fn test_extension_lookup_by_type() {
        let mut extensions = Extensions::new();
        assert!(extensions.get::<Greeting>().is_none());

        extensions.insert(Greeting("hello"));
        assert!(extensions.contains::<Greeting>());
        assert_eq!(*extensions.get::<Greeting>().unwrap(), Greeting("hello"));

        extensions.insert(Greeting("replaced"));
        assert_eq!(extensions.len(), 1);
        assert_eq!(*extensions.get::<Greeting>().unwrap(), Greeting("replaced"));
    }

    #[test]
    fn test_proxy_reports_closed_instance() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let proxy = InstanceProxy::new(WorkflowInstanceId::new(), sender);
        drop(receiver);

        let result = proxy.resume_bookmark(&BookmarkName::new("late"), Box::new(()));
        assert!(matches!(result, Err(RuntimeError::InstanceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_proxy_queues_signals_in_order() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let proxy = InstanceProxy::new(WorkflowInstanceId::new(), sender);

        proxy
            .resume_bookmark(&BookmarkName::new("first"), Box::new(1u32))
            .unwrap();
        proxy.cancel().unwrap();

        match receiver.recv().await.unwrap() {
            InstanceSignal::ResumeBookmark { name, payload } => {
                assert_eq!(name.as_str(), "first");
                assert_eq!(*payload.downcast::<u32>().unwrap(), 1);
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert!(matches!(receiver.recv().await.unwrap(), InstanceSignal::Cancel));
    }
}
