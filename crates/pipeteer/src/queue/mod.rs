//! Typed queue handles layered over [`QueueStore`]

pub mod list;
pub mod memory;
pub mod path;
pub mod postgres;
pub mod routed;
pub mod store;
pub mod transaction;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

pub use path::QueuePath;
pub use store::{Op, QueueStore};
pub use transaction::Transaction;

use crate::error::Error;

/// The interval `wait_any` sleeps between empty polls, matching the fixed
/// one-second polling discipline named in the queue's external contract.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A durable, typed, reservation-leased keyed mailbox over one queue path.
///
/// `Queue<S, T>` is a thin, stateless view: all durable state lives in the
/// `S: QueueStore` handle it wraps. Cloning a `Queue` is cheap and yields
/// another view of the same underlying path.
pub struct Queue<S, T> {
    store: Arc<S>,
    path: QueuePath,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T> Clone for Queue<S, T> {
    fn clone(&self) -> Self {
        Queue {
            store: self.store.clone(),
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S: QueueStore, T: Serialize + DeserializeOwned + Send + Sync> Queue<S, T> {
    pub(crate) fn new(store: Arc<S>, path: QueuePath) -> Self {
        Queue { store, path, _marker: PhantomData }
    }

    pub fn path(&self) -> &QueuePath {
        &self.path
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    pub async fn push(&self, key: &str, value: T) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        self.store.push(&self.path, key, value).await
    }

    pub async fn pop(&self, key: &str) -> Result<(), Error> {
        self.store.pop(&self.path, key).await
    }

    pub async fn read(&self, key: &str, reserve: Option<Duration>) -> Result<T, Error> {
        let value = self.store.read(&self.path, key, reserve).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn read_any(&self, reserve: Option<Duration>) -> Result<(String, T), Error> {
        let (key, value) = self.store.read_any(&self.path, reserve).await?;
        Ok((key, serde_json::from_value(value)?))
    }

    /// Block, polling every second, until an item becomes visible.
    #[tracing::instrument(skip(self), fields(path = %self.path))]
    pub async fn wait_any(&self, reserve: Option<Duration>) -> Result<(String, T), Error> {
        loop {
            match self.read_any(reserve).await {
                Ok(item) => return Ok(item),
                Err(Error::InexistentItem(_)) => {
                    debug!("queue empty, sleeping before next poll");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn items(
        &self,
        reserve: Option<Duration>,
        max: Option<usize>,
    ) -> Result<Vec<(String, T)>, Error> {
        let rows = self.store.items(&self.path, reserve, max).await?;
        rows.into_iter()
            .map(|(k, v)| Ok((k, serde_json::from_value(v)?)))
            .collect()
    }

    pub async fn has(&self, key: &str) -> Result<bool, Error> {
        self.store.has(&self.path, key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.store.keys(&self.path).await
    }

    pub async fn values(&self) -> Result<Vec<T>, Error> {
        let values = self.store.values(&self.path).await?;
        values.into_iter().map(|v| Ok(serde_json::from_value(v)?)).collect()
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.store.clear(&self.path).await
    }

    pub fn begin(&self) -> Transaction<S> {
        Transaction::new(self.store.clone())
    }
}
