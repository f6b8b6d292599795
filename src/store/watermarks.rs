// src/store/watermarks.rs
//! Per-source "checked up to" timestamps. Keys are lowercased handles; values
//! only move forward. Storage failures never reach the pipeline: reads fall
//! back to `now - lookback`, failed writes drop the cache entry so the next
//! read goes back to the table.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, warn};

use super::{fmt_ts, parse_ts};

pub struct WatermarkStore {
    pool: SqlitePool,
    lookback: Duration,
    cache: RwLock<HashMap<String, DateTime<Utc>>>,
}

pub fn source_key(source: &str) -> String {
    source.trim().trim_start_matches('@').to_ascii_lowercase()
}

impl WatermarkStore {
    pub fn new(pool: SqlitePool, lookback: Duration) -> Self {
        Self {
            pool,
            lookback,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Watermark for `source`, seeding `now - lookback` on first sight.
    pub async fn get(&self, source: &str) -> DateTime<Utc> {
        let key = source_key(source);
        if let Some(ts) = self.cached(&key) {
            return ts;
        }
        let seed = Utc::now() - self.lookback;
        match self.load_or_seed(&key, seed).await {
            Ok(ts) => {
                self.cache
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, ts);
                ts
            }
            Err(e) => {
                warn!(
                    target: "ingest",
                    source = %key,
                    error = %e,
                    "watermark read failed; using lookback default"
                );
                seed
            }
        }
    }

    /// Move the watermark to `max(current, ts)`.
    pub async fn advance(&self, source: &str, ts: DateTime<Utc>) {
        let key = source_key(source);
        let target = match self.cached(&key) {
            Some(current) if current > ts => current,
            _ => ts,
        };
        let res: Result<DateTime<Utc>> = async {
            let stored: String = sqlx::query_scalar(
                r#"
                INSERT INTO watermarks (source_id, last_checked_at, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(source_id) DO UPDATE SET
                    last_checked_at = MAX(watermarks.last_checked_at, excluded.last_checked_at),
                    updated_at = excluded.updated_at
                RETURNING last_checked_at
                "#,
            )
            .bind(&key)
            .bind(fmt_ts(target))
            .bind(fmt_ts(Utc::now()))
            .fetch_one(&self.pool)
            .await?;
            parse_ts(&stored)
        }
        .await;

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match res {
            Ok(stored) => {
                debug!(target: "ingest", source = %key, at = %fmt_ts(stored), "watermark advanced");
                cache.insert(key, stored);
            }
            Err(e) => {
                warn!(target: "ingest", source = %key, error = %e, "watermark write failed");
                cache.remove(&key);
            }
        }
    }

    /// Stored value without seeding or caching.
    pub async fn peek(&self, source: &str) -> Result<Option<DateTime<Utc>>> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT last_checked_at FROM watermarks WHERE source_id = ?")
                .bind(source_key(source))
                .fetch_optional(&self.pool)
                .await?;
        stored.as_deref().map(parse_ts).transpose()
    }

    pub fn invalidate_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn cached(&self, key: &str) -> Option<DateTime<Utc>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    async fn load_or_seed(&self, key: &str, seed: DateTime<Utc>) -> Result<DateTime<Utc>> {
        sqlx::query(
            r#"
            INSERT INTO watermarks (source_id, last_checked_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(source_id) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(fmt_ts(seed))
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        let stored: String =
            sqlx::query_scalar("SELECT last_checked_at FROM watermarks WHERE source_id = ?")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        parse_ts(&stored)
    }
}
