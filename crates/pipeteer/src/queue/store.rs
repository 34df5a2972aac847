//! The `QueueStore` trait: storage-level operations over string keys and
//! JSON payloads, shared by every queue, list-queue, and transaction built
//! on top of it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::queue::path::QueuePath;

/// A buffered mutation, collected by a [`Transaction`](crate::queue::transaction::Transaction)
/// and applied atomically by [`QueueStore::commit_txn`].
#[derive(Debug, Clone)]
pub enum Op {
    Push { path: QueuePath, key: String, value: Value },
    Pop { path: QueuePath, key: String },
    Append { path: QueuePath, key: String, value: Value },
}

/// Storage-level contract for a durable, reservation-leased keyed mailbox.
///
/// Every method operates on a single queue path and raw JSON values; typed
/// access is layered on top by [`Queue<S, T>`](crate::queue::Queue).
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Insert or replace the value at `key`. Replacing clears any existing
    /// reservation on that key.
    async fn push(&self, path: &QueuePath, key: &str, value: Value) -> Result<(), Error>;

    /// Remove the value at `key`, if any.
    async fn pop(&self, path: &QueuePath, key: &str) -> Result<(), Error>;

    /// Read the value at `key`. If `reserve` is `Some`, the item becomes
    /// invisible to `read_any`/`items` until the lease expires.
    async fn read(
        &self,
        path: &QueuePath,
        key: &str,
        reserve: Option<Duration>,
    ) -> Result<Value, Error>;

    /// Read one unreserved (or lease-expired) item, reserving it for
    /// `reserve` if given. Returns `Error::InexistentItem` if none are
    /// visible right now.
    async fn read_any(
        &self,
        path: &QueuePath,
        reserve: Option<Duration>,
    ) -> Result<(String, Value), Error>;

    /// Read up to `max` visible items, reserving each for `reserve`.
    async fn items(
        &self,
        path: &QueuePath,
        reserve: Option<Duration>,
        max: Option<usize>,
    ) -> Result<Vec<(String, Value)>, Error>;

    /// Whether a key currently has a value, regardless of reservation.
    async fn has(&self, path: &QueuePath, key: &str) -> Result<bool, Error>;

    /// All keys currently present, regardless of reservation.
    async fn keys(&self, path: &QueuePath) -> Result<Vec<String>, Error>;

    /// All values currently present, regardless of reservation.
    async fn values(&self, path: &QueuePath) -> Result<Vec<Value>, Error>;

    /// Remove every item under `path`.
    async fn clear(&self, path: &QueuePath) -> Result<(), Error>;

    /// Atomically append `value` onto the array stored at `key` (creating
    /// it as a single-element array if absent). Backs [`ListQueue`](crate::queue::list::ListQueue).
    async fn append(&self, path: &QueuePath, key: &str, value: Value) -> Result<(), Error>;

    /// Apply a batch of operations as a single atomic unit.
    async fn commit_txn(&self, ops: Vec<Op>) -> Result<(), Error>;
}
