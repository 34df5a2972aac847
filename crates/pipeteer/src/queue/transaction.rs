//! Multi-queue atomic commits
//!
//! A `Transaction` buffers mutations against queues that share one
//! `QueueStore` and applies them as a single atomic unit on `commit`. It is
//! generic over exactly one store type, so two queues backed by different
//! storages can never be enrolled in the same transaction — that is
//! enforced at compile time, not checked at runtime.
//!
//! There is no Python-style "enter/exit" auto-commit: a `Transaction`
//! dropped without calling `commit` simply discards its buffered ops,
//! which is the rollback behavior — nothing was ever applied to the store.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Error;
use crate::queue::list::ListQueue;
use crate::queue::store::Op;
use crate::queue::{Queue, QueueStore};

pub struct Transaction<S> {
    store: Arc<S>,
    ops: Vec<Op>,
}

impl<S: QueueStore> Transaction<S> {
    pub(crate) fn new(store: Arc<S>) -> Self {
        Transaction { store, ops: Vec::new() }
    }

    /// Stage a push onto `queue` at `key`.
    pub fn push<T: Serialize>(
        &mut self,
        queue: &Queue<S, T>,
        key: &str,
        value: T,
    ) -> Result<(), Error> {
        self.ops.push(Op::Push {
            path: queue.path().clone(),
            key: key.to_string(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    /// Stage a pop from `queue` at `key`.
    pub fn pop<T>(&mut self, queue: &Queue<S, T>, key: &str) {
        self.ops.push(Op::Pop { path: queue.path().clone(), key: key.to_string() });
    }

    /// Stage an append onto `list` at `key`.
    pub fn append<T: Serialize>(
        &mut self,
        list: &ListQueue<S, T>,
        key: &str,
        value: T,
    ) -> Result<(), Error> {
        self.ops.push(Op::Append {
            path: list.path().clone(),
            key: key.to_string(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every staged op atomically.
    pub async fn commit(self) -> Result<(), Error> {
        self.store.commit_txn(self.ops).await
    }
}
