//! Postgres-backed `QueueStore`
//!
//! One table per queue path (`key TEXT PRIMARY KEY, value JSONB, ttl
//! TIMESTAMPTZ`), created lazily on first use. Reservation is the same
//! `ttl <= now()` visibility test the teacher's task queue uses for
//! `visible_at`, and claiming is done with `FOR UPDATE SKIP LOCKED` so
//! concurrent workers never double-claim the same row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::Error;
use crate::queue::path::QueuePath;
use crate::queue::store::{Op, QueueStore};

/// Postgres implementation of [`QueueStore`].
pub struct PostgresStore {
    pool: PgPool,
    known_tables: DashSet<String>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool, known_tables: DashSet::new() }
    }

    fn table_name(path: &QueuePath) -> String {
        let flattened = path.flattened();
        let sanitized: String = flattened
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("pq_{sanitized}")
    }

    async fn ensure_table(&self, path: &QueuePath) -> Result<String, Error> {
        let table = Self::table_name(path);
        if self.known_tables.contains(&table) {
            return Ok(table);
        }

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\
                key TEXT PRIMARY KEY, \
                value JSONB NOT NULL, \
                ttl TIMESTAMPTZ\
            )"
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        self.known_tables.insert(table.clone());
        debug!(table, "ensured queue table exists");
        Ok(table)
    }

    async fn apply_one(&self, op: &Op) -> Result<(), Error> {
        match op {
            Op::Push { path, key, value } => {
                let table = self.ensure_table(path).await?;
                let sql = format!(
                    "INSERT INTO \"{table}\" (key, value, ttl) VALUES ($1, $2, NULL) \
                     ON CONFLICT (key) DO UPDATE SET value = excluded.value, ttl = NULL"
                );
                sqlx::query(&sql).bind(key).bind(value).execute(&self.pool).await?;
            }
            Op::Pop { path, key } => {
                let table = self.ensure_table(path).await?;
                let sql = format!("DELETE FROM \"{table}\" WHERE key = $1");
                sqlx::query(&sql).bind(key).execute(&self.pool).await?;
            }
            Op::Append { path, key, value } => {
                let table = self.ensure_table(path).await?;
                let sql = format!(
                    "INSERT INTO \"{table}\" (key, value, ttl) VALUES ($1, jsonb_build_array($2::jsonb), NULL) \
                     ON CONFLICT (key) DO UPDATE SET value = \"{table}\".value || excluded.value"
                );
                sqlx::query(&sql).bind(key).bind(value).execute(&self.pool).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for PostgresStore {
    async fn push(&self, path: &QueuePath, key: &str, value: Value) -> Result<(), Error> {
        self.apply_one(&Op::Push { path: path.clone(), key: key.to_string(), value }).await
    }

    async fn pop(&self, path: &QueuePath, key: &str) -> Result<(), Error> {
        self.apply_one(&Op::Pop { path: path.clone(), key: key.to_string() }).await
    }

    async fn read(
        &self,
        path: &QueuePath,
        key: &str,
        reserve: Option<Duration>,
    ) -> Result<Value, Error> {
        let table = self.ensure_table(path).await?;
        if let Some(d) = reserve {
            let ttl = Utc::now() + chrono::Duration::from_std(d).unwrap_or_default();
            let sql = format!(
                "UPDATE \"{table}\" SET ttl = $2 WHERE key = $1 AND (ttl IS NULL OR ttl <= NOW()) \
                 RETURNING value"
            );
            let row = sqlx::query(&sql)
                .bind(key)
                .bind(ttl)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::InexistentItem(key.to_string()))?;
            return Ok(row.get::<Value, _>("value"));
        }

        let sql = format!(
            "SELECT value FROM \"{table}\" WHERE key = $1 AND (ttl IS NULL OR ttl <= NOW())"
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::InexistentItem(key.to_string()))?;
        Ok(row.get::<Value, _>("value"))
    }

    async fn read_any(
        &self,
        path: &QueuePath,
        reserve: Option<Duration>,
    ) -> Result<(String, Value), Error> {
        let table = self.ensure_table(path).await?;
        let ttl = reserve.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default());

        let sql = format!(
            "WITH claimable AS (\
                SELECT key FROM \"{table}\" WHERE ttl IS NULL OR ttl <= NOW() \
                ORDER BY key LIMIT 1 FOR UPDATE SKIP LOCKED\
             ) \
             UPDATE \"{table}\" t SET ttl = $1 FROM claimable c \
             WHERE t.key = c.key RETURNING t.key, t.value"
        );
        let row = sqlx::query(&sql)
            .bind(ttl)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::InexistentItem("<any>".to_string()))?;
        Ok((row.get::<String, _>("key"), row.get::<Value, _>("value")))
    }

    async fn items(
        &self,
        path: &QueuePath,
        reserve: Option<Duration>,
        max: Option<usize>,
    ) -> Result<Vec<(String, Value)>, Error> {
        let table = self.ensure_table(path).await?;
        let ttl = reserve.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default());
        let limit = max.map(|m| m as i64).unwrap_or(i64::MAX);

        let sql = format!(
            "WITH claimable AS (\
                SELECT key FROM \"{table}\" WHERE ttl IS NULL OR ttl <= NOW() \
                ORDER BY key LIMIT $2 FOR UPDATE SKIP LOCKED\
             ) \
             UPDATE \"{table}\" t SET ttl = $1 FROM claimable c \
             WHERE t.key = c.key RETURNING t.key, t.value"
        );
        let rows = sqlx::query(&sql).bind(ttl).bind(limit).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("key"), r.get::<Value, _>("value")))
            .collect())
    }

    async fn has(&self, path: &QueuePath, key: &str) -> Result<bool, Error> {
        let table = self.ensure_table(path).await?;
        let sql = format!("SELECT 1 FROM \"{table}\" WHERE key = $1");
        Ok(sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?.is_some())
    }

    async fn keys(&self, path: &QueuePath) -> Result<Vec<String>, Error> {
        let table = self.ensure_table(path).await?;
        let sql = format!("SELECT key FROM \"{table}\"");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }

    async fn values(&self, path: &QueuePath) -> Result<Vec<Value>, Error> {
        let table = self.ensure_table(path).await?;
        let sql = format!("SELECT value FROM \"{table}\"");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.get::<Value, _>("value")).collect())
    }

    async fn clear(&self, path: &QueuePath) -> Result<(), Error> {
        let table = self.ensure_table(path).await?;
        let sql = format!("TRUNCATE \"{table}\"");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn append(&self, path: &QueuePath, key: &str, value: Value) -> Result<(), Error> {
        self.apply_one(&Op::Append { path: path.clone(), key: key.to_string(), value }).await
    }

    async fn commit_txn(&self, ops: Vec<Op>) -> Result<(), Error> {
        for path in ops.iter().map(op_path) {
            self.ensure_table(path).await?;
        }

        let mut tx = self.pool.begin().await?;
        for op in &ops {
            match op {
                Op::Push { path, key, value } => {
                    let table = Self::table_name(path);
                    let sql = format!(
                        "INSERT INTO \"{table}\" (key, value, ttl) VALUES ($1, $2, NULL) \
                         ON CONFLICT (key) DO UPDATE SET value = excluded.value, ttl = NULL"
                    );
                    sqlx::query(&sql).bind(key).bind(value).execute(&mut *tx).await?;
                }
                Op::Pop { path, key } => {
                    let table = Self::table_name(path);
                    let sql = format!("DELETE FROM \"{table}\" WHERE key = $1");
                    sqlx::query(&sql).bind(key).execute(&mut *tx).await?;
                }
                Op::Append { path, key, value } => {
                    let table = Self::table_name(path);
                    let sql = format!(
                        "INSERT INTO \"{table}\" (key, value, ttl) VALUES ($1, jsonb_build_array($2::jsonb), NULL) \
                         ON CONFLICT (key) DO UPDATE SET value = \"{table}\".value || excluded.value"
                    );
                    sqlx::query(&sql).bind(key).bind(value).execute(&mut *tx).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

fn op_path(op: &Op) -> &QueuePath {
    match op {
        Op::Push { path, .. } | Op::Pop { path, .. } | Op::Append { path, .. } => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_sanitizes_non_alnum_characters() {
        assert_eq!(PostgresStore::table_name(&QueuePath::from("orders/step.1")), "pq_orders_step_1");
        assert_eq!(PostgresStore::table_name(&QueuePath::root()), "pq_root");
    }
}
