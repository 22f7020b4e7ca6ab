//! Periodic publishing-queue check.
//!
//! The trigger owns only the schedule. What a check does is delegated to a
//! `QueueDrainer`; the production drainer is `UnimplementedDrainer`, which
//! publishes nothing and says so.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("queue draining is not implemented")]
    Unimplemented,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait QueueDrainer: Send + Sync {
    /// Publish due queue entries; returns how many were handled.
    async fn drain(&self) -> Result<usize, DrainError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnimplementedDrainer;

#[async_trait]
impl QueueDrainer for UnimplementedDrainer {
    async fn drain(&self) -> Result<usize, DrainError> {
        Err(DrainError::Unimplemented)
    }
}

#[derive(Clone)]
pub struct QueueTrigger {
    period: Duration,
    drainer: Arc<dyn QueueDrainer>,
}

impl QueueTrigger {
    pub fn new(period: Duration, drainer: Arc<dyn QueueDrainer>) -> Self {
        Self { period, drainer }
    }

    /// Run one queue check.
    pub async fn fire(&self) -> Result<usize, DrainError> {
        info!("checking publishing queue");
        self.drainer.drain().await
    }

    /// Run one queue check, reporting its outcome only through the log.
    #[instrument(skip_all)]
    async fn check(&self) {
        match self.fire().await {
            Ok(handled) => info!(handled, "queue check finished"),
            Err(DrainError::Unimplemented) => info!("queue check skipped: draining not implemented"),
            Err(err) => warn!(?err, "queue check failed"),
        }
    }

    /// Fire every period, starting one period from now, until `cancel` is
    /// triggered. Ticks missed while a check is running are skipped.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + self.period, self.period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => self.check().await,
                }
            }
            info!("queue trigger stopped");
        })
    }
}
