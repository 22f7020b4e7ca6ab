//! Persistence layer: the `Store` trait and its backends.
//!
//! - `supabase`: hosted PostgREST tables, used in production.
//! - `sqlite`: local sqlx database with the same three tables, used for
//!   development and tests.
//!
//! Every operation reports failures as `StoreError`; deciding whether a failure
//! is masked or surfaced belongs to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Backend;

use crate::model::{NewSource, Post, PostStatus, QueueEntry, RowId, Source};

pub mod sqlite;
pub mod supabase;

pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store URL: {0}")]
    Url(String),
    #[error("request to store failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected store payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid row: {0}")]
    InvalidRow(String),
    #[error("store returned no rows for {0}")]
    Empty(&'static str),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Number of posts, optionally restricted to one status.
    async fn count_posts(&self, status: Option<PostStatus>) -> Result<u64, StoreError>;

    /// Posts with `status`, newest `created_at` first, at most `limit` rows.
    async fn list_posts(&self, status: PostStatus, limit: usize) -> Result<Vec<Post>, StoreError>;

    /// Set the status of a post. Unknown ids are not an error.
    async fn update_post_status(&self, id: &RowId, status: PostStatus) -> Result<(), StoreError>;

    async fn enqueue(&self, entry: &QueueEntry) -> Result<(), StoreError>;

    /// Mark `entry.post_id` approved and add `entry` to the queue, leaving
    /// neither write behind when the other fails.
    ///
    /// The default issues both writes in turn and, when the enqueue fails,
    /// puts the post back to `pending` before returning the enqueue error.
    async fn approve_and_enqueue(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        self.update_post_status(&entry.post_id, PostStatus::Approved)
            .await?;
        if let Err(err) = self.enqueue(entry).await {
            if let Err(revert) = self
                .update_post_status(&entry.post_id, PostStatus::Pending)
                .await
            {
                warn!(post_id = %entry.post_id, ?revert, "failed to revert approval");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Queue entries ordered by `scheduled_for`.
    async fn list_queue(&self) -> Result<Vec<QueueEntry>, StoreError>;

    /// Insert a source and return the stored row.
    async fn insert_source(&self, source: &NewSource) -> Result<Source, StoreError>;

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError>;
}

/// Open the backend selected in the configuration.
pub async fn connect(cfg: &crate::config::Store) -> Result<Arc<dyn Store>, StoreError> {
    match cfg.backend {
        Backend::Supabase => {
            info!(url = %cfg.supabase.url, "using supabase store");
            Ok(Arc::new(SupabaseStore::new(
                &cfg.supabase.url,
                cfg.supabase.key.clone(),
            )?))
        }
        Backend::Sqlite => {
            info!(url = %cfg.sqlite.database_url, "using sqlite store");
            Ok(Arc::new(SqliteStore::connect(&cfg.sqlite.database_url).await?))
        }
    }
}
