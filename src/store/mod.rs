//! SQLite storage: pool bootstrap + schema. Records and watermarks live in
//! their own submodules and are the only writers of their tables.

pub mod records;
pub mod watermarks;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub use records::{InsertSummary, RecordPage, RecordQuery, RecordStore};
pub use watermarks::WatermarkStore;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT UNIQUE,
        text TEXT NOT NULL,
        author_display_name TEXT NOT NULL DEFAULT '',
        author_handle TEXT NOT NULL DEFAULT '',
        author_verified INTEGER NOT NULL DEFAULT 0,
        author_verification_kind TEXT NOT NULL DEFAULT '',
        author_avatar_url TEXT NOT NULL DEFAULT '',
        canonical_url TEXT NOT NULL UNIQUE,
        media_preview_url TEXT,
        media_kind TEXT NOT NULL DEFAULT 'none',
        topics TEXT NOT NULL DEFAULT '[]',
        published_at TEXT NOT NULL DEFAULT '',
        inserted_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_records_inserted_at ON records(inserted_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_records_author_handle ON records(author_handle)",
    r#"
    CREATE TABLE IF NOT EXISTS watermarks (
        source_id TEXT PRIMARY KEY,
        last_checked_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// Open (creating if needed) the database at `database_url` and apply the schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    ensure_parent_dir(database_url)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .with_context(|| format!("connecting to {database_url}"))?;
    migrate(&pool).await?;
    info!(url = %database_url, "storage ready");
    Ok(pool)
}

/// Private in-memory database. One pinned connection, since every new
/// `:memory:` connection would be a separate empty database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("opening in-memory sqlite")?;
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .context("applying schema")?;
    }
    Ok(())
}

fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Fixed-width UTC text so lexicographic order equals time order.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad stored timestamp '{s}'"))?
        .with_timezone(&Utc))
}
