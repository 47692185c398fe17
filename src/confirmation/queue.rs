//! Bounded in-process confirmation queue.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::config::ConfirmationConfig;
use crate::confirmation::{ConfirmationDispatcher, ConfirmationTask, DispatchError};
use crate::observability::metrics;

/// Dispatcher backed by a bounded tokio channel.
///
/// `enqueue` waits for queue space at most `timeout`; a slow consumer turns
/// into a `DispatchError::Timeout` instead of stalling admissions.
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: mpsc::Sender<ConfirmationTask>,
    timeout: Duration,
}

impl QueueDispatcher {
    /// Create a dispatcher and the receiver the worker consumes.
    pub fn channel(
        capacity: usize,
        timeout: Duration,
    ) -> (Self, mpsc::Receiver<ConfirmationTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, timeout }, rx)
    }

    pub fn from_config(config: &ConfirmationConfig) -> (Self, mpsc::Receiver<ConfirmationTask>) {
        Self::channel(
            config.queue_capacity,
            Duration::from_millis(config.dispatch_timeout_ms),
        )
    }

    /// Tasks currently waiting.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[async_trait]
impl ConfirmationDispatcher for QueueDispatcher {
    async fn enqueue(&self, task: ConfirmationTask) -> Result<(), DispatchError> {
        let subscription_id = task.subscription_id;
        let result = match self.tx.send_timeout(task, self.timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(DispatchError::Timeout(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
            Err(SendTimeoutError::Closed(_)) => Err(DispatchError::Closed),
        };

        match &result {
            Ok(()) => {
                metrics::record_dispatch("queued");
                tracing::debug!(subscription_id = %subscription_id, "Confirmation task queued");
            }
            Err(e) => {
                metrics::record_dispatch("failed");
                tracing::error!(subscription_id = %subscription_id, error = %e, "Confirmation dispatch failed");
            }
        }
        result
    }
}
