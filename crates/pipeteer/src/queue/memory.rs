//! In-memory `QueueStore`, primarily for tests
//!
//! Stores all data in memory and provides the same semantics as the
//! Postgres-backed store (reservation leases, replace-on-push, atomic
//! append). Transactions are serialized behind a single lock, which is
//! correct but coarse — fine for a test double, not a tuning target.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Error;
use crate::queue::path::QueuePath;
use crate::queue::store::{Op, QueueStore};

struct Row {
    value: Value,
    reserved_until: Option<DateTime<Utc>>,
}

/// In-memory implementation of [`QueueStore`].
pub struct InMemoryStore {
    paths: DashMap<QueuePath, RwLock<HashMap<String, Row>>>,
    txn_lock: AsyncMutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore { paths: DashMap::new(), txn_lock: AsyncMutex::new(()) }
    }

    fn entry(
        &self,
        path: &QueuePath,
    ) -> dashmap::mapref::one::RefMut<'_, QueuePath, RwLock<HashMap<String, Row>>> {
        self.paths.entry(path.clone()).or_insert_with(|| RwLock::new(HashMap::new()))
    }

    fn apply_one(&self, op: Op) -> Result<(), Error> {
        match op {
            Op::Push { path, key, value } => {
                let map = self.entry(&path);
                map.write().insert(key, Row { value, reserved_until: None });
            }
            Op::Pop { path, key } => {
                let map = self.entry(&path);
                map.write().remove(&key);
            }
            Op::Append { path, key, value } => {
                let map = self.entry(&path);
                let mut guard = map.write();
                let row = guard.entry(key).or_insert_with(|| Row {
                    value: Value::Array(Vec::new()),
                    reserved_until: None,
                });
                match &mut row.value {
                    Value::Array(arr) => arr.push(value),
                    other => *other = Value::Array(vec![other.clone(), value]),
                }
            }
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    async fn push(&self, path: &QueuePath, key: &str, value: Value) -> Result<(), Error> {
        let map = self.entry(path);
        map.write().insert(key.to_string(), Row { value, reserved_until: None });
        Ok(())
    }

    async fn pop(&self, path: &QueuePath, key: &str) -> Result<(), Error> {
        let map = self.entry(path);
        map.write().remove(key);
        Ok(())
    }

    async fn read(
        &self,
        path: &QueuePath,
        key: &str,
        reserve: Option<Duration>,
    ) -> Result<Value, Error> {
        let map = self.entry(path);
        let mut guard = map.write();
        let now = Utc::now();
        let row = guard
            .get_mut(key)
            .filter(|row| row.reserved_until.map(|t| t <= now).unwrap_or(true))
            .ok_or_else(|| Error::InexistentItem(key.to_string()))?;
        if let Some(d) = reserve {
            row.reserved_until = Some(now + chrono::Duration::from_std(d).unwrap_or_default());
        }
        Ok(row.value.clone())
    }

    async fn read_any(
        &self,
        path: &QueuePath,
        reserve: Option<Duration>,
    ) -> Result<(String, Value), Error> {
        let map = self.entry(path);
        let mut guard = map.write();
        let now = Utc::now();
        let visible_key = guard
            .iter()
            .find(|(_, row)| row.reserved_until.map(|t| t <= now).unwrap_or(true))
            .map(|(k, _)| k.clone());

        let key = visible_key.ok_or_else(|| Error::InexistentItem("<any>".to_string()))?;
        let row = guard.get_mut(&key).expect("key just found");
        if let Some(d) = reserve {
            row.reserved_until = Some(now + chrono::Duration::from_std(d).unwrap_or_default());
        }
        Ok((key, row.value.clone()))
    }

    async fn items(
        &self,
        path: &QueuePath,
        reserve: Option<Duration>,
        max: Option<usize>,
    ) -> Result<Vec<(String, Value)>, Error> {
        let map = self.entry(path);
        let mut guard = map.write();
        let now = Utc::now();
        let limit = max.unwrap_or(usize::MAX);

        let visible_keys: Vec<String> = guard
            .iter()
            .filter(|(_, row)| row.reserved_until.map(|t| t <= now).unwrap_or(true))
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect();

        let mut out = Vec::with_capacity(visible_keys.len());
        for key in visible_keys {
            let row = guard.get_mut(&key).expect("key just found");
            if let Some(d) = reserve {
                row.reserved_until = Some(now + chrono::Duration::from_std(d).unwrap_or_default());
            }
            out.push((key, row.value.clone()));
        }
        Ok(out)
    }

    async fn has(&self, path: &QueuePath, key: &str) -> Result<bool, Error> {
        let map = self.entry(path);
        Ok(map.read().contains_key(key))
    }

    async fn keys(&self, path: &QueuePath) -> Result<Vec<String>, Error> {
        let map = self.entry(path);
        Ok(map.read().keys().cloned().collect())
    }

    async fn values(&self, path: &QueuePath) -> Result<Vec<Value>, Error> {
        let map = self.entry(path);
        Ok(map.read().values().map(|r| r.value.clone()).collect())
    }

    async fn clear(&self, path: &QueuePath) -> Result<(), Error> {
        let map = self.entry(path);
        map.write().clear();
        Ok(())
    }

    async fn append(&self, path: &QueuePath, key: &str, value: Value) -> Result<(), Error> {
        self.apply_one(Op::Append { path: path.clone(), key: key.to_string(), value })
    }

    async fn commit_txn(&self, ops: Vec<Op>) -> Result<(), Error> {
        let _guard = self.txn_lock.lock().await;
        for op in ops {
            self.apply_one(op)?;
        }
        Ok(())
    }
}
