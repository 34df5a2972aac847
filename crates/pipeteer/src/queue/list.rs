//! `ListQueue`: a queue whose values are arrays, appended to atomically at
//! the storage layer rather than via read-modify-write.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::queue::{QueuePath, QueueStore};

/// A [`Queue`](crate::queue::Queue)-like handle whose per-key value is a
/// `Vec<T>`, with an `append` operation that adds one element without a
/// client-side read-modify-write round trip.
pub struct ListQueue<S, T> {
    store: Arc<S>,
    path: QueuePath,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<S, T> Clone for ListQueue<S, T> {
    fn clone(&self) -> Self {
        ListQueue { store: self.store.clone(), path: self.path.clone(), _marker: std::marker::PhantomData }
    }
}

impl<S: QueueStore, T: Serialize + DeserializeOwned + Send + Sync> ListQueue<S, T> {
    pub(crate) fn new(store: Arc<S>, path: QueuePath) -> Self {
        ListQueue { store, path, _marker: std::marker::PhantomData }
    }

    pub fn path(&self) -> &QueuePath {
        &self.path
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// Atomically append `value` onto the array stored at `key`.
    pub async fn append(&self, key: &str, value: T) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        self.store.append(&self.path, key, value).await
    }

    pub async fn read(&self, key: &str) -> Result<Vec<T>, Error> {
        let value = self.store.read(&self.path, key, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn has(&self, key: &str) -> Result<bool, Error> {
        self.store.has(&self.path, key).await
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.store.clear(&self.path).await
    }
}
