//! Subscription admission.
//!
//! # Flow
//! ```text
//! SubscribeRequest
//!     → normalize_url(callback)        (once; reused below)
//!     → validate(owner, callback, blocklist)
//!     → [valid] store.upsert(owner, callback, domain)
//!     → [valid] store.set_pending(secret, lease)
//!     → [valid] dispatcher.enqueue(subscribe task)
//!     → Admission (message, status)
//! ```
//!
//! Rejections never touch the store or the queue. Store and queue failures
//! are returned as `HubError`, separate from the admission statuses.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::blocklist::DomainBlocklist;
use crate::confirmation::{ConfirmationDispatcher, ConfirmationTask};
use crate::error::HubError;
use crate::observability::metrics;
use crate::store::SubscriptionStore;
use crate::subscription::callback::normalize_url;
use crate::subscription::validator::{validate, SubscribeStatus};
use crate::topics::OwnerId;

/// A subscription request as seen by the admitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Resolved topic owner; `None` when the topic did not resolve.
    pub owner: Option<OwnerId>,
    /// Raw callback as supplied by the subscriber.
    pub callback: String,
    pub secret: String,
    pub lease_seconds: u64,
    pub domain: Option<String>,
}

/// Answer to an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub status: SubscribeStatus,
}

impl Admission {
    /// User-visible message; empty when accepted.
    pub fn message(&self) -> &'static str {
        match self.status {
            SubscribeStatus::InvalidTopic => "Invalid topic URL",
            SubscribeStatus::InvalidCallback => "Invalid callback URL",
            SubscribeStatus::CallbackNotAllowed => "Callback URL not allowed",
            SubscribeStatus::Valid => "",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.status {
            SubscribeStatus::InvalidTopic | SubscribeStatus::InvalidCallback => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SubscribeStatus::CallbackNotAllowed => StatusCode::FORBIDDEN,
            SubscribeStatus::Valid => StatusCode::ACCEPTED,
        }
    }

    /// `(message, status)` pair.
    pub fn into_parts(self) -> (&'static str, StatusCode) {
        (self.message(), self.status_code())
    }
}

impl From<SubscribeStatus> for Admission {
    fn from(status: SubscribeStatus) -> Self {
        Self { status }
    }
}

/// Admits subscription requests.
pub struct Admitter {
    blocklist: Arc<dyn DomainBlocklist>,
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Arc<dyn ConfirmationDispatcher>,
}

impl Admitter {
    pub fn new(
        blocklist: Arc<dyn DomainBlocklist>,
        store: Arc<dyn SubscriptionStore>,
        dispatcher: Arc<dyn ConfirmationDispatcher>,
    ) -> Self {
        Self {
            blocklist,
            store,
            dispatcher,
        }
    }

    /// Validate a request and, when valid, persist it and queue its confirmation.
    pub async fn admit(&self, request: SubscribeRequest) -> Result<Admission, HubError> {
        let SubscribeRequest {
            owner,
            callback,
            secret,
            lease_seconds,
            domain,
        } = request;

        let normalized = normalize_url(&callback);
        let status = validate(owner.as_ref(), normalized.as_ref(), self.blocklist.as_ref());
        metrics::record_admission(status.as_str());

        let (owner, callback_url) = match (status, owner, normalized) {
            (SubscribeStatus::Valid, Some(owner), Some(url)) => (owner, String::from(url)),
            (status, owner, _) => {
                tracing::info!(
                    owner = ?owner,
                    callback = %callback,
                    outcome = status.as_str(),
                    "Subscription rejected"
                );
                return Ok(Admission::from(status));
            }
        };

        let subscription = self
            .store
            .upsert(&owner, &callback_url, domain.as_deref())
            .await?;

        let task = ConfirmationTask::subscribe(subscription.id, secret, lease_seconds);
        self.store.set_pending(subscription.id, task.pending()).await?;
        self.dispatcher.enqueue(task).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            owner = %owner,
            callback = %callback_url,
            lease_seconds,
            "Subscription accepted"
        );
        Ok(Admission::from(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::blocklist::DomainBlocks;
    use crate::confirmation::{DispatchError, Mode};
    use crate::store::{MemoryStore, PendingConfirmation, StoreError, StoreResult, Subscription};

    /// Records every task; optionally fails.
    #[derive(Default)]
    struct RecordingDispatcher {
        tasks: Mutex<Vec<ConfirmationTask>>,
        fail: AtomicBool,
    }

    impl RecordingDispatcher {
        fn tasks(&self) -> Vec<ConfirmationTask> {
            self.tasks.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConfirmationDispatcher for RecordingDispatcher {
        async fn enqueue(&self, task: ConfirmationTask) -> Result<(), DispatchError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DispatchError::Closed);
            }
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }
    }

    /// Store whose backend is down.
    struct UnavailableStore;

    #[async_trait]
    impl SubscriptionStore for UnavailableStore {
        async fn upsert(&self, _: &OwnerId, _: &str, _: Option<&str>) -> StoreResult<Subscription> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn find(&self, _: Uuid) -> StoreResult<Option<Subscription>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn find_by_callback(&self, _: &OwnerId, _: &str) -> StoreResult<Option<Subscription>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn confirm(&self, id: Uuid, _: &str, _: u64) -> StoreResult<Subscription> {
            Err(StoreError::NotFound(id))
        }
        async fn set_pending(&self, id: Uuid, _: PendingConfirmation) -> StoreResult<()> {
            Err(StoreError::NotFound(id))
        }
        async fn clear_pending(&self, id: Uuid, _: &PendingConfirmation) -> StoreResult<()> {
            Err(StoreError::NotFound(id))
        }
        async fn list(&self) -> StoreResult<Vec<Subscription>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> StoreResult<usize> {
            Ok(0)
        }
    }

    struct Fixture {
        admitter: Arc<Admitter>,
        store: MemoryStore,
        dispatcher: Arc<RecordingDispatcher>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new(None);
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let blocklist = Arc::new(DomainBlocks::new(&["blocked.example".to_string()]));
        let admitter = Arc::new(Admitter::new(
            blocklist,
            Arc::new(store.clone()),
            dispatcher.clone(),
        ));
        Fixture {
            admitter,
            store,
            dispatcher,
        }
    }

    fn request(owner: Option<&str>, callback: &str) -> SubscribeRequest {
        SubscribeRequest {
            owner: owner.map(OwnerId::new),
            callback: callback.to_string(),
            secret: "s3cr3t".to_string(),
            lease_seconds: 86_400,
            domain: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_topic_is_rejected_without_side_effects() {
        let f = fixture();

        let admission = f.admitter.admit(request(None, "https://good.example/cb")).await.unwrap();

        assert_eq!(
            admission.into_parts(),
            ("Invalid topic URL", StatusCode::UNPROCESSABLE_ENTITY)
        );
        assert!(f.store.is_empty());
        assert!(f.dispatcher.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_callbacks_are_rejected_without_side_effects() {
        let f = fixture();

        for callback in ["", "not a url", "/cb", "ftp://good.example/cb"] {
            let admission = f.admitter.admit(request(Some("alice"), callback)).await.unwrap();
            assert_eq!(
                admission.into_parts(),
                ("Invalid callback URL", StatusCode::UNPROCESSABLE_ENTITY),
                "callback {callback:?}"
            );
        }
        assert!(f.store.is_empty());
        assert!(f.dispatcher.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_callback_is_forbidden() {
        let f = fixture();

        let admission = f
            .admitter
            .admit(request(Some("alice"), "https://blocked.example/cb"))
            .await
            .unwrap();

        assert_eq!(
            admission.into_parts(),
            ("Callback URL not allowed", StatusCode::FORBIDDEN)
        );
        assert!(f.store.is_empty());
        assert!(f.dispatcher.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_valid_request_persists_and_dispatches() {
        let f = fixture();

        let admission = f
            .admitter
            .admit(request(Some("alice"), "https://good.example/cb"))
            .await
            .unwrap();

        assert_eq!(admission.into_parts(), ("", StatusCode::ACCEPTED));

        let rows = f.store.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].owner, OwnerId::new("alice"));
        assert_eq!(rows[0].callback_url, "https://good.example/cb");
        assert!(!rows[0].confirmed);

        assert_eq!(
            rows[0].pending,
            Some(PendingConfirmation {
                secret: "s3cr3t".into(),
                lease_seconds: 86_400,
            })
        );

        let tasks = f.dispatcher.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].subscription_id, rows[0].id);
        assert_eq!(tasks[0].mode, Mode::Subscribe);
        assert_eq!(tasks[0].secret, "s3cr3t");
        assert_eq!(tasks[0].lease_seconds, 86_400);
    }

    #[tokio::test]
    async fn test_persists_normalized_callback() {
        let f = fixture();

        f.admitter
            .admit(request(Some("alice"), "HTTPS://Good.Example:443/%7Ecb"))
            .await
            .unwrap();
        f.admitter
            .admit(request(Some("alice"), "https://good.example/~cb"))
            .await
            .unwrap();

        let rows = f.store.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].callback_url, "https://good.example/~cb");
        assert_eq!(f.dispatcher.tasks().len(), 2);
    }

    #[tokio::test]
    async fn test_resubscribe_updates_domain_and_dispatches_again() {
        let f = fixture();

        let mut first = request(Some("alice"), "https://good.example/cb");
        first.domain = Some("first.example".into());
        let mut second = request(Some("alice"), "https://good.example/cb");
        second.domain = Some("second.example".into());

        f.admitter.admit(first).await.unwrap();
        f.admitter.admit(second).await.unwrap();

        let rows = f.store.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].domain.as_deref(), Some("second.example"));

        let tasks = f.dispatcher.tasks();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.subscription_id == rows[0].id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_converge() {
        let f = fixture();
        let n = 32;

        let mut handles = tokio::task::JoinSet::new();
        for _ in 0..n {
            let admitter = f.admitter.clone();
            handles.spawn(async move {
                admitter
                    .admit(request(Some("alice"), "https://good.example/cb"))
                    .await
                    .unwrap()
            });
        }

        while let Some(admission) = handles.join_next().await {
            assert_eq!(admission.unwrap().status_code(), StatusCode::ACCEPTED);
        }

        assert_eq!(f.store.len(), 1);
        let tasks = f.dispatcher.tasks();
        assert_eq!(tasks.len(), n);
        let id = f.store.list().await.unwrap()[0].id;
        assert!(tasks.iter().all(|t| t.subscription_id == id));
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let admitter = Admitter::new(
            Arc::new(DomainBlocks::default()),
            Arc::new(UnavailableStore),
            dispatcher.clone(),
        );

        let err = admitter
            .admit(request(Some("alice"), "https://good.example/cb"))
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::Store(StoreError::Unavailable(_))));
        assert!(dispatcher.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_an_error() {
        let f = fixture();
        f.dispatcher.fail.store(true, Ordering::SeqCst);

        let err = f
            .admitter
            .admit(request(Some("alice"), "https://good.example/cb"))
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::Dispatch(DispatchError::Closed)));

        // The handshake stays recorded for the next start.
        let rows = f.store.pending();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pending.as_ref().map(|p| p.lease_seconds), Some(86_400));
    }

    #[tokio::test]
    async fn test_rejections_do_not_reach_a_failing_store() {
        let admitter = Admitter::new(
            Arc::new(DomainBlocks::default()),
            Arc::new(UnavailableStore),
            Arc::new(RecordingDispatcher::default()),
        );

        let admission = admitter.admit(request(None, "https://good.example/cb")).await.unwrap();
        assert_eq!(admission.status, SubscribeStatus::InvalidTopic);
    }
}
