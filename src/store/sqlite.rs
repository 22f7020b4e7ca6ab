use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

use super::{Store, StoreError};
use crate::model::{NewSource, Platform, Post, PostStatus, QueueEntry, RowId, Source};

/// Local store with the same `posts`/`sources`/`queue` layout as the hosted
/// project.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and apply
    /// migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let normalized = prepare_sqlite_url(database_url);
        // Enable WAL and stricter durability.
        let options = SqliteConnectOptions::from_str(&normalized)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Seed a post. Ingestion lives outside this service; this exists for
    /// local development and tests.
    #[instrument(skip_all)]
    pub async fn insert_post(
        &self,
        content: &str,
        status: PostStatus,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO posts (content, status, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(content)
        .bind(status.as_str())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

fn bind_id<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    id: &'q RowId,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match id {
        RowId::Int(v) => query.bind(*v),
        RowId::Text(v) => query.bind(v.as_str()),
    }
}

fn row_id(row: &SqliteRow, column: &str) -> Result<RowId, StoreError> {
    if let Ok(id) = row.try_get::<i64, _>(column) {
        return Ok(RowId::Int(id));
    }
    Ok(RowId::Text(row.try_get::<String, _>(column)?))
}

fn post_from_row(row: &SqliteRow) -> Result<Post, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<PostStatus>()
        .map_err(|err| StoreError::InvalidRow(err.to_string()))?;
    let mut fields = Map::new();
    if let Some(content) = row.try_get::<Option<String>, _>("content")? {
        fields.insert("content".into(), Value::String(content));
    }
    Ok(Post {
        id: row_id(row, "id")?,
        status,
        created_at: row.try_get("created_at")?,
        fields,
    })
}

fn source_from_row(row: &SqliteRow) -> Result<Source, StoreError> {
    Ok(Source {
        id: row_id(row, "id")?,
        username: row.try_get("username")?,
        category: row.try_get("category")?,
        is_active: row.try_get("is_active")?,
    })
}

fn queue_entry_from_row(row: &SqliteRow) -> Result<QueueEntry, StoreError> {
    let platform: String = row.try_get("platform")?;
    Ok(QueueEntry {
        post_id: row_id(row, "post_id")?,
        platform: platform
            .parse::<Platform>()
            .map_err(|err| StoreError::InvalidRow(err.to_string()))?,
        scheduled_for: row.try_get("scheduled_for")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip_all)]
    async fn count_posts(&self, status: Option<PostStatus>) -> Result<u64, StoreError> {
        let count = match status {
            Some(status) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.max(0) as u64)
    }

    #[instrument(skip_all)]
    async fn list_posts(&self, status: PostStatus, limit: usize) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, content, status, created_at FROM posts WHERE status = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(post_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn update_post_status(&self, id: &RowId, status: PostStatus) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE posts SET status = ? WHERE id = ?").bind(status.as_str());
        bind_id(query, id).execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let query = sqlx::query(
            "INSERT INTO queue (post_id, platform, scheduled_for) VALUES (?, ?, ?)",
        );
        bind_id(query, &entry.post_id)
            .bind(entry.platform.as_str())
            .bind(entry.scheduled_for)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn approve_and_enqueue(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let query = sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(PostStatus::Approved.as_str());
        bind_id(query, &entry.post_id).execute(&mut *tx).await?;
        let query = sqlx::query(
            "INSERT INTO queue (post_id, platform, scheduled_for) VALUES (?, ?, ?)",
        );
        bind_id(query, &entry.post_id)
            .bind(entry.platform.as_str())
            .bind(entry.scheduled_for)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT post_id, platform, scheduled_for FROM queue ORDER BY scheduled_for, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(queue_entry_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn insert_source(&self, source: &NewSource) -> Result<Source, StoreError> {
        let row = sqlx::query(
            "INSERT INTO sources (username, category, is_active) VALUES (?, ?, ?) \
             RETURNING id, username, category, is_active",
        )
        .bind(&source.username)
        .bind(&source.category)
        .bind(source.is_active)
        .fetch_one(&self.pool)
        .await?;
        source_from_row(&row)
    }

    #[instrument(skip_all)]
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query("SELECT id, username, category, is_active FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }
}
