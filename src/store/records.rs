// src/store/records.rs
//! Persistence of accepted records. Duplicate `canonical_url`/`external_id`
//! inserts are the dedup mechanism: first writer wins, later ones are counted
//! and dropped.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use tracing::{debug, warn};

use super::{fmt_ts, parse_ts};
use crate::ingest::types::{CanonicalRecord, MediaKind};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

const INSERT_SQL: &str = r#"
    INSERT INTO records (
        external_id, text, author_display_name, author_handle, author_verified,
        author_verification_kind, author_avatar_url, canonical_url,
        media_preview_url, media_kind, topics, published_at, inserted_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

// `?` is bound twice with the same topic (NULL = no filter).
const TOPIC_FILTER: &str = r#"
    (? IS NULL OR EXISTS (
        SELECT 1 FROM json_each(records.topics)
        WHERE lower(json_each.value) = lower(?)
    ))
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Page request; `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub page: u32,
    pub limit: u32,
    /// Case-insensitive exact topic match; `None` lists everything.
    pub topic: Option<String>,
}

impl RecordQuery {
    fn normalized(&self) -> (u32, u32, Option<String>) {
        let page = self.page.max(1);
        let limit = match self.limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        let topic = self
            .topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("all"))
            .map(str::to_string);
        (page, limit, topic)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub records: Vec<CanonicalRecord>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl RecordPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.limit.max(1) as u64)
    }
}

#[derive(FromRow)]
struct RecordRow {
    external_id: Option<String>,
    text: String,
    author_display_name: String,
    author_handle: String,
    author_verified: bool,
    author_verification_kind: String,
    author_avatar_url: String,
    canonical_url: String,
    media_preview_url: Option<String>,
    media_kind: String,
    topics: String,
    published_at: String,
    inserted_at: String,
}

impl RecordRow {
    fn into_record(self) -> anyhow::Result<CanonicalRecord> {
        Ok(CanonicalRecord {
            external_id: self.external_id,
            text: self.text,
            author_display_name: self.author_display_name,
            author_handle: self.author_handle,
            author_verified: self.author_verified,
            author_verification_kind: self.author_verification_kind,
            author_avatar_url: self.author_avatar_url,
            canonical_url: self.canonical_url,
            media_preview_url: self.media_preview_url,
            media_kind: MediaKind::from_oracle(&self.media_kind),
            topics: serde_json::from_str(&self.topics).unwrap_or_default(),
            published_at: self.published_at,
            inserted_at: parse_ts(&self.inserted_at)?,
        })
    }
}

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert every record independently inside one transaction. Never fails
    /// the caller: duplicates are counted, other errors logged and counted.
    pub async fn bulk_insert(&self, records: &[CanonicalRecord]) -> InsertSummary {
        let mut summary = InsertSummary::default();
        if records.is_empty() {
            return summary;
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(
                    target: "store",
                    error = %e,
                    count = records.len(),
                    "bulk insert: begin failed"
                );
                summary.failed = records.len();
                return summary;
            }
        };

        for rec in records {
            if rec.canonical_url.trim().is_empty() {
                warn!(
                    target: "store",
                    handle = %rec.author_handle,
                    "record without canonical url skipped"
                );
                summary.failed += 1;
                continue;
            }
            let topics =
                serde_json::to_string(&rec.topics).unwrap_or_else(|_| "[]".to_string());
            let res = sqlx::query(INSERT_SQL)
                .bind(rec.external_id.as_deref().filter(|s| !s.is_empty()))
                .bind(&rec.text)
                .bind(&rec.author_display_name)
                .bind(&rec.author_handle)
                .bind(rec.author_verified)
                .bind(&rec.author_verification_kind)
                .bind(&rec.author_avatar_url)
                .bind(&rec.canonical_url)
                .bind(rec.media_preview_url.as_deref())
                .bind(rec.media_kind.as_str())
                .bind(topics)
                .bind(&rec.published_at)
                .bind(fmt_ts(rec.inserted_at))
                .execute(&mut *tx)
                .await;

            match res {
                Ok(_) => summary.inserted += 1,
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    debug!(target: "store", url = %rec.canonical_url, "duplicate record ignored");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!(
                        target: "store",
                        url = %rec.canonical_url,
                        error = %e,
                        "record insert failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        if let Err(e) = tx.commit().await {
            warn!(target: "store", error = %e, "bulk insert: commit failed");
            summary.failed += summary.inserted;
            summary.inserted = 0;
        }
        summary
    }

    /// Newest first by insertion time, then by source timestamp.
    pub async fn list(&self, query: &RecordQuery) -> anyhow::Result<RecordPage> {
        let (page, limit, topic) = query.normalized();
        let offset = (page as i64 - 1) * limit as i64;

        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            r#"
            SELECT external_id, text, author_display_name, author_handle, author_verified,
                   author_verification_kind, author_avatar_url, canonical_url,
                   media_preview_url, media_kind, topics, published_at, inserted_at
            FROM records
            WHERE {TOPIC_FILTER}
            ORDER BY inserted_at DESC, published_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(topic.as_deref())
        .bind(topic.as_deref())
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM records WHERE {TOPIC_FILTER}"
        ))
        .bind(topic.as_deref())
        .bind(topic.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(RecordRow::into_record)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(RecordPage {
            records,
            page,
            limit,
            total: total.max(0) as u64,
        })
    }

    /// Every topic that appears on at least one record, sorted.
    pub async fn distinct_topics(&self) -> anyhow::Result<Vec<String>> {
        let topics: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT json_each.value
            FROM records, json_each(records.topics)
            WHERE json_each.value <> ''
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}
