//! `Backend`: the sole constructor of typed queue handles
//!
//! A `Backend` owns one `QueueStore` and hands out `Queue`/`ListQueue`
//! handles scoped under a path prefix, the same "single owning type hands
//! out typed handles by key" shape the teacher's `WorkflowRegistry` uses
//! for workflow factories.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::http::client::HttpQueue;
use crate::queue::list::ListQueue;
use crate::queue::{Queue, QueuePath, QueueStore};

/// Constructs queues and list-queues scoped under a path prefix, backed by
/// one storage handle.
pub struct Backend<S> {
    store: Arc<S>,
    prefix: QueuePath,
}

impl<S> Clone for Backend<S> {
    fn clone(&self) -> Self {
        Backend { store: self.store.clone(), prefix: self.prefix.clone() }
    }
}

impl<S: QueueStore> Backend<S> {
    pub fn new(store: S) -> Self {
        Backend { store: Arc::new(store), prefix: QueuePath::root() }
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Backend { store, prefix: QueuePath::root() }
    }

    /// A backend view scoped one segment deeper, e.g. per-workflow-instance.
    pub fn scoped(&self, segment: impl Into<String>) -> Self {
        Backend { store: self.store.clone(), prefix: self.prefix.join(segment) }
    }

    pub fn prefix(&self) -> &QueuePath {
        &self.prefix
    }

    /// The raw store handle, for building transport-level adapters (e.g.
    /// the HTTP queue protocol server) that must operate on untyped paths.
    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// A queue at `prefix/name`.
    pub fn queue<T: Serialize + DeserializeOwned + Send + Sync>(
        &self,
        name: impl Into<String>,
    ) -> Queue<S, T> {
        Queue::new(self.store.clone(), self.prefix.join(name))
    }

    /// A list-queue at `prefix/name`.
    pub fn list_queue<T: Serialize + DeserializeOwned + Send + Sync>(
        &self,
        name: impl Into<String>,
    ) -> ListQueue<S, T> {
        ListQueue::new(self.store.clone(), self.prefix.join(name))
    }

    /// The canonical output queue at `prefix/output`, the fixed sink a
    /// pipeline's caller reads its final result from.
    pub fn output<T: Serialize + DeserializeOwned + Send + Sync>(&self) -> Queue<S, T> {
        self.queue("output")
    }

    /// A write-only handle to a queue at a remote backend's HTTP endpoint.
    pub fn queue_at<T: Serialize + Send + Sync>(&self, url: impl Into<String>) -> HttpQueue<T> {
        HttpQueue::new(url.into())
    }
}

/// A fresh, time-ordered instance key for a new workflow/task invocation,
/// for callers that don't already have a natural key of their own.
pub fn new_instance_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::InMemoryStore;

    #[tokio::test]
    async fn queue_and_list_queue_are_scoped_under_prefix() {
        let backend = Backend::new(InMemoryStore::new()).scoped("orders");

        let q: Queue<InMemoryStore, i32> = backend.queue("pending");
        assert_eq!(q.path().flattened(), "orders-pending");

        let lq: ListQueue<InMemoryStore, i32> = backend.list_queue("states");
        assert_eq!(lq.path().flattened(), "orders-states");
    }

    #[test]
    fn new_instance_id_produces_distinct_values() {
        assert_ne!(new_instance_id(), new_instance_id());
    }

    #[tokio::test]
    async fn output_is_the_canonical_queue_at_the_output_path() {
        let backend = Backend::new(InMemoryStore::new()).scoped("orders");
        let a: Queue<InMemoryStore, i32> = backend.queue("output");
        let b: Queue<InMemoryStore, i32> = backend.output();
        assert_eq!(a.path(), b.path());
        assert_eq!(b.path().flattened(), "orders-output");
    }
}
