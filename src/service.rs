//! Moderation and source-management operations.
//!
//! Each operation returns its failure as a value; callers choose whether to
//! mask it (read endpoints) or surface it (writes).

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config;
use crate::model::{
    normalize_username, Decision, NewSource, Post, PostStatus, QueueEntry, RowId, Source, Stats,
    ValidationError, PENDING_LIMIT,
};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Closed set of source categories plus the one used when none is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPolicy {
    default: String,
    allowed: Vec<String>,
}

impl CategoryPolicy {
    /// Entries are compared in lowercase, the same form requests are
    /// normalized to.
    pub fn new(default: impl Into<String>, allowed: Vec<String>) -> Self {
        Self {
            default: default.into().trim().to_lowercase(),
            allowed: allowed.iter().map(|c| c.trim().to_lowercase()).collect(),
        }
    }

    pub fn resolve(&self, requested: Option<&str>) -> Result<String, ValidationError> {
        let requested = requested.map(str::trim).filter(|c| !c.is_empty());
        let Some(category) = requested else {
            return Ok(self.default.clone());
        };
        let category = category.to_lowercase();
        if self.allowed.iter().any(|c| c == &category) {
            Ok(category)
        } else {
            Err(ValidationError::Category {
                given: category,
                allowed: self.allowed.join(", "),
            })
        }
    }
}

impl From<&config::Sources> for CategoryPolicy {
    fn from(cfg: &config::Sources) -> Self {
        Self::new(cfg.default_category.clone(), cfg.categories.clone())
    }
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        (&config::Sources::default()).into()
    }
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
    categories: CategoryPolicy,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, categories: CategoryPolicy) -> Self {
        Self { store, categories }
    }

    #[instrument(skip_all)]
    pub async fn stats(&self) -> Result<Stats, ServiceError> {
        let (total, published) = futures::try_join!(
            self.store.count_posts(None),
            self.store.count_posts(Some(PostStatus::Published)),
        )?;
        Ok(Stats { total, published })
    }

    #[instrument(skip_all)]
    pub async fn pending_posts(&self) -> Result<Vec<Post>, ServiceError> {
        Ok(self
            .store
            .list_posts(PostStatus::Pending, PENDING_LIMIT)
            .await?)
    }

    /// Record a moderation decision. Approvals also schedule the post for
    /// publishing one minute from now.
    #[instrument(skip(self))]
    pub async fn decide(&self, id: &RowId, decision: &str) -> Result<(), ServiceError> {
        let decision: Decision = decision.parse()?;
        if decision.enqueues() {
            let entry = QueueEntry::for_approval(id.clone(), Utc::now());
            self.store.approve_and_enqueue(&entry).await?;
            info!(scheduled_for = %entry.scheduled_for, "post approved and queued");
        } else {
            self.store.update_post_status(id, decision.status()).await?;
            info!(status = decision.status().as_str(), "post decided");
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn add_source(
        &self,
        username: &str,
        category: Option<&str>,
    ) -> Result<Source, ServiceError> {
        let source = NewSource {
            username: normalize_username(username)?,
            category: self.categories.resolve(category)?,
            is_active: true,
        };
        let stored = self.store.insert_source(&source).await?;
        info!(username = %stored.username, category = %stored.category, "source added");
        Ok(stored)
    }

    #[instrument(skip_all)]
    pub async fn sources(&self) -> Result<Vec<Source>, ServiceError> {
        Ok(self.store.list_sources().await?)
    }
}
