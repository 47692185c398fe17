//! Subscription persistence.
//!
//! # Data Flow
//! ```text
//! Admitter ──upsert(owner, callback, domain)──► SubscriptionStore
//! ConfirmationWorker ──find(id) / confirm(id, ..)──► SubscriptionStore
//! Admin API ──list() / count()──► SubscriptionStore
//! ```
//!
//! # Design Decisions
//! - One row per (owner, callback_url); `upsert` is the only way rows are
//!   created, and it is atomic per key so racing admissions share a row
//! - `domain` is last-writer-wins; `secret`, `confirmed` and `expires_at`
//!   belong to the confirmation workflow
//! - An accepted request records its secret and lease as `pending` until the
//!   handshake settles, so unfinished confirmations survive a restart
//! - Rows are never deleted here

pub mod memory;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::topics::OwnerId;

pub use memory::MemoryStore;

/// A persisted subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner: OwnerId,
    /// Normalized callback URL.
    pub callback_url: String,
    /// Verified domain asserted by the caller of the latest admission.
    pub domain: Option<String>,
    /// Shared secret for signing notifications, set on confirmation.
    pub secret: Option<String>,
    pub confirmed: bool,
    /// Lease end (unix seconds), set on confirmation.
    pub expires_at: Option<u64>,
    /// Handshake requested by the latest accepted admission, not yet settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingConfirmation>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Subscription {
    /// A fresh, unconfirmed subscription.
    pub fn new(owner: OwnerId, callback_url: String, now: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            callback_url,
            domain: None,
            secret: None,
            confirmed: false,
            expires_at: None,
            pending: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Confirmed and the lease has not run out.
    pub fn is_active(&self) -> bool {
        self.confirmed && self.expires_at.is_some_and(|expiry| expiry > unix_now())
    }
}

/// Secret and lease of a handshake that has not completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub secret: String,
    pub lease_seconds: u64,
}

/// Errors raised by a subscription store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing storage cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("subscription {0} not found")]
    NotFound(Uuid),

    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Find the row for `(owner, callback_url)` or create it, then set its
    /// domain. Atomic per key.
    async fn upsert(
        &self,
        owner: &OwnerId,
        callback_url: &str,
        domain: Option<&str>,
    ) -> StoreResult<Subscription>;

    async fn find(&self, id: Uuid) -> StoreResult<Option<Subscription>>;

    async fn find_by_callback(
        &self,
        owner: &OwnerId,
        callback_url: &str,
    ) -> StoreResult<Option<Subscription>>;

    /// Mark a subscription confirmed with its secret and lease end.
    /// Repeating it with the same values leaves the row unchanged.
    async fn confirm(&self, id: Uuid, secret: &str, expires_at: u64) -> StoreResult<Subscription>;

    /// Record the handshake an admission is about to dispatch. Replaces any
    /// earlier pending handshake.
    async fn set_pending(&self, id: Uuid, pending: PendingConfirmation) -> StoreResult<()>;

    /// Settle a handshake. Only clears `pending` when it still equals
    /// `settled`, so a newer admission's handshake is kept.
    async fn clear_pending(&self, id: Uuid, settled: &PendingConfirmation) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<Subscription>>;

    async fn count(&self) -> StoreResult<usize>;
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_subscription_is_unconfirmed() {
        let sub = Subscription::new(OwnerId::new("alice"), "https://good.example/cb".into(), 10);
        assert!(!sub.confirmed);
        assert!(!sub.is_active());
        assert_eq!(sub.created_at, sub.updated_at);
    }

    #[test]
    fn test_active_requires_unexpired_lease() {
        let mut sub = Subscription::new(OwnerId::new("alice"), "https://good.example/cb".into(), 10);
        sub.confirmed = true;
        sub.expires_at = Some(unix_now() + 60);
        assert!(sub.is_active());

        sub.expires_at = Some(unix_now() - 1);
        assert!(!sub.is_active());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Unavailable("disk full".into());
        assert_eq!(err.to_string(), "store unavailable: disk full");
    }
}
