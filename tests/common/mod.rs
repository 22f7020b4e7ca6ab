#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use content_admin::model::{NewSource, Post, PostStatus, QueueEntry, RowId, Source};
use content_admin::relay::{Notifier, RelayError, TextFormat};
use content_admin::store::{SqliteStore, Store, StoreError};
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::Mutex;

pub async fn setup_store() -> SqliteStore {
    SqliteStore::in_memory().await.unwrap()
}

/// Seed `count` posts with `status`, the i-th one created i minutes ago.
pub async fn seed_posts(store: &SqliteStore, status: PostStatus, count: usize) -> Vec<i64> {
    let now = Utc::now();
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = store
            .insert_post(&format!("{} post {}", status.as_str(), i), status, now - Duration::minutes(i as i64))
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

/// Store whose every call fails as if the hosted project were unreachable.
#[derive(Debug, Clone, Default)]
pub struct UnreachableStore;

fn unreachable() -> StoreError {
    StoreError::Api {
        status: 503,
        message: "store unreachable".into(),
    }
}

#[async_trait]
impl Store for UnreachableStore {
    async fn count_posts(&self, _status: Option<PostStatus>) -> Result<u64, StoreError> {
        Err(unreachable())
    }

    async fn list_posts(&self, _status: PostStatus, _limit: usize) -> Result<Vec<Post>, StoreError> {
        Err(unreachable())
    }

    async fn update_post_status(&self, _id: &RowId, _status: PostStatus) -> Result<(), StoreError> {
        Err(unreachable())
    }

    async fn enqueue(&self, _entry: &QueueEntry) -> Result<(), StoreError> {
        Err(unreachable())
    }

    async fn list_queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        Err(unreachable())
    }

    async fn insert_source(&self, _source: &NewSource) -> Result<Source, StoreError> {
        Err(unreachable())
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        Err(unreachable())
    }
}

/// Real store whose `enqueue` always fails.
#[derive(Debug, Clone)]
pub struct FailingQueueStore(pub SqliteStore);

#[async_trait]
impl Store for FailingQueueStore {
    async fn count_posts(&self, status: Option<PostStatus>) -> Result<u64, StoreError> {
        self.0.count_posts(status).await
    }

    async fn list_posts(&self, status: PostStatus, limit: usize) -> Result<Vec<Post>, StoreError> {
        self.0.list_posts(status, limit).await
    }

    async fn update_post_status(&self, id: &RowId, status: PostStatus) -> Result<(), StoreError> {
        self.0.update_post_status(id, status).await
    }

    async fn enqueue(&self, _entry: &QueueEntry) -> Result<(), StoreError> {
        Err(StoreError::Api {
            status: 500,
            message: "queue insert failed".into(),
        })
    }

    async fn list_queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        self.0.list_queue().await
    }

    async fn insert_source(&self, source: &NewSource) -> Result<Source, StoreError> {
        self.0.insert_source(source).await
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.0.list_sources().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub format: TextFormat,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat) -> Result<(), RelayError> {
        if self.fail {
            return Err(RelayError::Telegram(teloxide::RequestError::Api(
                teloxide::ApiError::BotBlocked,
            )));
        }
        self.sent.lock().await.push(SentMessage {
            chat_id,
            text: text.to_string(),
            format,
        });
        Ok(())
    }
}
