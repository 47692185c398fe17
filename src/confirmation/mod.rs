//! Confirmation handshake subsystem.
//!
//! # Data Flow
//! ```text
//! Admitter
//!     → ConfirmationDispatcher::enqueue (queue.rs, bounded mpsc + send timeout)
//!     → ConfirmationWorker (worker.rs, bounded concurrency)
//!     → IntentVerifier (verifier.rs, GET callback with hub.challenge)
//!     → SubscriptionStore::confirm
//! ```
//!
//! # Design Decisions
//! - Dispatch is at-least-once: every accepted admission enqueues a task,
//!   including re-subscriptions of an existing row
//! - Confirming is idempotent, so repeated tasks for one subscription converge
//! - A full or closed queue is an error for the admission, never a silent drop

pub mod queue;
pub mod verifier;
pub mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::{PendingConfirmation, Subscription};

pub use queue::QueueDispatcher;
pub use verifier::{HttpVerifier, IntentVerifier, VerificationRequest, VerifyError};
pub use worker::{ConfirmationOutcome, ConfirmationWorker, Confirmer};

/// Kind of handshake requested. This hub only issues subscription handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Subscribe,
}

impl Mode {
    /// Value of the `hub.mode` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Subscribe => "subscribe",
        }
    }
}

/// A unit of work for the confirmation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationTask {
    pub subscription_id: Uuid,
    pub mode: Mode,
    pub secret: String,
    pub lease_seconds: u64,
}

impl ConfirmationTask {
    pub fn subscribe(subscription_id: Uuid, secret: String, lease_seconds: u64) -> Self {
        Self {
            subscription_id,
            mode: Mode::Subscribe,
            secret,
            lease_seconds,
        }
    }

    /// Rebuild the task for a handshake recorded on a subscription.
    pub fn from_pending(subscription: &Subscription) -> Option<Self> {
        subscription.pending.as_ref().map(|pending| {
            Self::subscribe(subscription.id, pending.secret.clone(), pending.lease_seconds)
        })
    }

    /// What the store records while this task is outstanding.
    pub fn pending(&self) -> PendingConfirmation {
        PendingConfirmation {
            secret: self.secret.clone(),
            lease_seconds: self.lease_seconds,
        }
    }
}

/// Errors raised when handing a task to the confirmation workflow.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The queue stayed full for the whole dispatch timeout.
    #[error("confirmation queue full after {0} ms")]
    Timeout(u64),

    /// The consumer side is gone.
    #[error("confirmation queue closed")]
    Closed,
}

/// Hands confirmation tasks to the asynchronous workflow.
#[async_trait]
pub trait ConfirmationDispatcher: Send + Sync {
    async fn enqueue(&self, task: ConfirmationTask) -> Result<(), DispatchError>;
}
