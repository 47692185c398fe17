//! Confirmation worker.
//!
//! # Responsibilities
//! - Consume confirmation tasks from the queue
//! - Verify intent with the subscriber, retrying transient failures
//! - Record confirmed subscriptions with their secret and lease
//!
//! # Design Decisions
//! - Bounded concurrency via semaphore; the queue provides backpressure
//! - A missing subscription or a wrong challenge ends the task, it is not retried
//! - Settling a task (confirmed or finally unverified) clears the row's
//!   `pending` handshake; anything unsettled is replayed from the store at
//!   the next start via `with_backlog`
//! - On shutdown the queue is closed and left to the store; in-flight
//!   verifications are awaited before `run` returns

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::config::ConfirmationConfig;
use crate::confirmation::verifier::generate_challenge;
use crate::confirmation::{ConfirmationTask, IntentVerifier, VerificationRequest, VerifyError};
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::store::{unix_now, StoreResult, Subscription, SubscriptionStore};
use crate::topics::OwnerResolver;

/// Result of processing one task.
#[derive(Debug)]
pub enum ConfirmationOutcome {
    Confirmed(Subscription),
    Unverified(VerifyError),
    /// The subscription no longer exists.
    Missing,
}

/// Processes individual tasks. Cheap to clone; shared by every in-flight task.
#[derive(Clone)]
pub struct Confirmer {
    store: Arc<dyn SubscriptionStore>,
    topics: Arc<dyn OwnerResolver>,
    verifier: Arc<dyn IntentVerifier>,
    backoff: Backoff,
    max_attempts: u32,
}

impl Confirmer {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        topics: Arc<dyn OwnerResolver>,
        verifier: Arc<dyn IntentVerifier>,
        config: &ConfirmationConfig,
    ) -> Self {
        Self {
            store,
            topics,
            verifier,
            backoff: Backoff::from_config(config),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Verify and confirm the subscription a task refers to.
    pub async fn process(&self, task: ConfirmationTask) -> StoreResult<ConfirmationOutcome> {
        let Some(subscription) = self.store.find(task.subscription_id).await? else {
            tracing::warn!(subscription_id = %task.subscription_id, "Subscription vanished before confirmation");
            metrics::record_confirmation("missing");
            return Ok(ConfirmationOutcome::Missing);
        };

        let settled = task.pending();
        let request = VerificationRequest {
            callback_url: subscription.callback_url.clone(),
            mode: task.mode,
            topic: self.topics.topic_url(&subscription.owner),
            challenge: generate_challenge(),
            lease_seconds: task.lease_seconds,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.verifier.verify(&request).await {
                Ok(()) => {
                    let expires_at = unix_now().saturating_add(task.lease_seconds);
                    let confirmed = self
                        .store
                        .confirm(subscription.id, &task.secret, expires_at)
                        .await?;
                    self.store.clear_pending(subscription.id, &settled).await?;

                    metrics::record_confirmation("confirmed");
                    tracing::info!(
                        subscription_id = %confirmed.id,
                        callback = %confirmed.callback_url,
                        expires_at,
                        attempt,
                        "Subscription confirmed"
                    );
                    return Ok(ConfirmationOutcome::Confirmed(confirmed));
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    tracing::info!(
                        subscription_id = %subscription.id,
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "Retrying verification"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.store.clear_pending(subscription.id, &settled).await?;
                    metrics::record_confirmation("unverified");
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        callback = %subscription.callback_url,
                        attempt,
                        error = %e,
                        "Verification failed"
                    );
                    return Ok(ConfirmationOutcome::Unverified(e));
                }
            }
        }
    }
}

/// Long-running consumer of the confirmation queue.
pub struct ConfirmationWorker {
    tasks: mpsc::Receiver<ConfirmationTask>,
    backlog: VecDeque<ConfirmationTask>,
    confirmer: Confirmer,
    limit: Arc<Semaphore>,
}

impl ConfirmationWorker {
    pub fn new(
        tasks: mpsc::Receiver<ConfirmationTask>,
        confirmer: Confirmer,
        concurrency: usize,
    ) -> Self {
        Self {
            tasks,
            backlog: VecDeque::new(),
            confirmer,
            limit: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Tasks recovered from the store, processed before the queue.
    pub fn with_backlog(mut self, backlog: Vec<ConfirmationTask>) -> Self {
        self.backlog.extend(backlog);
        self
    }

    /// Run until shutdown or until every dispatcher is dropped, then wait
    /// for in-flight verifications.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(backlog = self.backlog.len(), "Confirmation worker started");

        let mut in_flight = JoinSet::new();
        let mut deferred = 0usize;

        loop {
            let task = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Confirmation worker stopping");
                    break;
                }
                task = next_task(&mut self.backlog, &mut self.tasks) => match task {
                    Some(task) => task,
                    None => {
                        tracing::info!("Confirmation queue closed");
                        break;
                    }
                },
            };

            let permit = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Confirmation worker stopping");
                    deferred += 1;
                    break;
                }
                permit = self.limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let confirmer = self.confirmer.clone();
            in_flight.spawn(async move {
                let subscription_id = task.subscription_id;
                if let Err(e) = confirmer.process(task).await {
                    metrics::record_confirmation("store_error");
                    tracing::error!(subscription_id = %subscription_id, error = %e, "Confirmation failed");
                }
                drop(permit);
            });

            // Reap finished verifications so the set stays small.
            while in_flight.try_join_next().is_some() {}
        }

        // New admissions now fail to dispatch; their handshakes stay pending
        // in the store, like everything still buffered here.
        self.tasks.close();
        deferred += self.backlog.len();
        while self.tasks.try_recv().is_ok() {
            deferred += 1;
        }
        if deferred > 0 {
            tracing::info!(deferred, "Unprocessed confirmations left pending for next start");
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Confirmation task panicked");
            }
        }
        tracing::info!("Confirmation worker stopped");
    }
}

async fn next_task(
    backlog: &mut VecDeque<ConfirmationTask>,
    tasks: &mut mpsc::Receiver<ConfirmationTask>,
) -> Option<ConfirmationTask> {
    match backlog.pop_front() {
        Some(task) => Some(task),
        None => tasks.recv().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::lifecycle::Shutdown;
    use crate::store::MemoryStore;
    use crate::topics::{OwnerId, TopicRegistry};

    /// Verifier that replays scripted results and records requests.
    struct ScriptedVerifier {
        script: Mutex<Vec<Result<(), VerifyError>>>,
        calls: AtomicU32,
        seen: Mutex<Vec<VerificationRequest>>,
    }

    impl ScriptedVerifier {
        fn new(mut script: Vec<Result<(), VerifyError>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl IntentVerifier for ScriptedVerifier {
        async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            self.script.lock().unwrap().pop().unwrap_or(Ok(()))
        }
    }

    /// Verifier that always succeeds after a delay.
    struct SlowVerifier {
        delay: Duration,
    }

    #[async_trait]
    impl IntentVerifier for SlowVerifier {
        async fn verify(&self, _: &VerificationRequest) -> Result<(), VerifyError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    fn config() -> ConfirmationConfig {
        ConfirmationConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..ConfirmationConfig::default()
        }
    }

    async fn setup(verifier: Arc<ScriptedVerifier>) -> (MemoryStore, Confirmer, Subscription) {
        let store = MemoryStore::new(None);
        let topics = Arc::new(
            TopicRegistry::new("https://hub.example", &["alice".to_string()]).unwrap(),
        );
        let subscription = store
            .upsert(&OwnerId::new("alice"), "https://good.example/cb", None)
            .await
            .unwrap();
        let confirmer = Confirmer::new(Arc::new(store.clone()), topics, verifier, &config());
        (store, confirmer, subscription)
    }

    #[tokio::test]
    async fn test_confirms_on_success() {
        let verifier = ScriptedVerifier::new(vec![Ok(())]);
        let (store, confirmer, subscription) = setup(verifier.clone()).await;

        let task = ConfirmationTask::subscribe(subscription.id, "s3cr3t".into(), 86_400);
        let outcome = confirmer.process(task).await.unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Confirmed(_)));

        let stored = store.find(subscription.id).await.unwrap().unwrap();
        assert!(stored.confirmed);
        assert!(stored.is_active());
        assert_eq!(stored.secret.as_deref(), Some("s3cr3t"));

        let seen = verifier.seen.lock().unwrap();
        assert_eq!(seen[0].topic, "https://hub.example/users/alice.atom");
        assert_eq!(seen[0].callback_url, "https://good.example/cb");
        assert_eq!(seen[0].lease_seconds, 86_400);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let verifier = ScriptedVerifier::new(vec![
            Err(VerifyError::Status(503)),
            Err(VerifyError::Status(502)),
            Ok(()),
        ]);
        let (_store, confirmer, subscription) = setup(verifier.clone()).await;

        let task = ConfirmationTask::subscribe(subscription.id, "s".into(), 60);
        let outcome = confirmer.process(task).await.unwrap();

        assert!(matches!(outcome, ConfirmationOutcome::Confirmed(_)));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let verifier = ScriptedVerifier::new(vec![
            Err(VerifyError::Status(503)),
            Err(VerifyError::Status(503)),
            Err(VerifyError::Status(503)),
            Ok(()),
        ]);
        let (store, confirmer, subscription) = setup(verifier.clone()).await;

        let task = ConfirmationTask::subscribe(subscription.id, "s".into(), 60);
        let outcome = confirmer.process(task).await.unwrap();

        assert!(matches!(outcome, ConfirmationOutcome::Unverified(VerifyError::Status(503))));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 3);
        assert!(!store.find(subscription.id).await.unwrap().unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_challenge_mismatch_is_final() {
        let verifier = ScriptedVerifier::new(vec![Err(VerifyError::ChallengeMismatch)]);
        let (store, confirmer, subscription) = setup(verifier.clone()).await;

        let task = ConfirmationTask::subscribe(subscription.id, "s".into(), 60);
        let outcome = confirmer.process(task).await.unwrap();

        assert!(matches!(outcome, ConfirmationOutcome::Unverified(VerifyError::ChallengeMismatch)));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        assert!(!store.find(subscription.id).await.unwrap().unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_settling_clears_pending() {
        let verifier = ScriptedVerifier::new(vec![Ok(()), Err(VerifyError::ChallengeMismatch)]);
        let (store, confirmer, subscription) = setup(verifier).await;

        let task = ConfirmationTask::subscribe(subscription.id, "s".into(), 60);
        store.set_pending(subscription.id, task.pending()).await.unwrap();
        confirmer.process(task.clone()).await.unwrap();
        assert!(store.pending().is_empty());

        store.set_pending(subscription.id, task.pending()).await.unwrap();
        confirmer.process(task).await.unwrap();
        assert!(store.pending().is_empty());
    }

    #[tokio::test]
    async fn test_missing_subscription() {
        let verifier = ScriptedVerifier::new(vec![]);
        let (_store, confirmer, _) = setup(verifier.clone()).await;

        let task = ConfirmationTask::subscribe(Uuid::new_v4(), "s".into(), 60);
        let outcome = confirmer.process(task).await.unwrap();

        assert!(matches!(outcome, ConfirmationOutcome::Missing));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_tasks_converge() {
        let verifier = ScriptedVerifier::new(vec![]);
        let (store, confirmer, subscription) = setup(verifier).await;

        for _ in 0..3 {
            let task = ConfirmationTask::subscribe(subscription.id, "s3cr3t".into(), 60);
            confirmer.process(task).await.unwrap();
        }

        assert_eq!(store.len(), 1);
        let stored = store.find(subscription.id).await.unwrap().unwrap();
        assert!(stored.confirmed);
        assert_eq!(stored.secret.as_deref(), Some("s3cr3t"));
    }

    #[tokio::test]
    async fn test_worker_drains_queue_and_stops() {
        let verifier = ScriptedVerifier::new(vec![]);
        let (store, confirmer, subscription) = setup(verifier).await;

        let (tx, rx) = mpsc::channel(8);
        let shutdown = Shutdown::new();
        let worker = ConfirmationWorker::new(rx, confirmer, 2);
        let handle = tokio::spawn(worker.run(shutdown.subscribe()));

        tx.send(ConfirmationTask::subscribe(subscription.id, "s".into(), 60))
            .await
            .unwrap();

        let mut confirmed = false;
        for _ in 0..50 {
            if store.find(subscription.id).await.unwrap().unwrap().confirmed {
                confirmed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(confirmed);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_keeps_queued_tasks_for_next_start() {
        let store = MemoryStore::new(None);
        let topics = Arc::new(
            TopicRegistry::new("https://hub.example", &["alice".to_string()]).unwrap(),
        );
        let confirmer = |delay: Duration| {
            Confirmer::new(
                Arc::new(store.clone()),
                topics.clone(),
                Arc::new(SlowVerifier { delay }),
                &config(),
            )
        };

        let (tx, rx) = mpsc::channel(8);
        for i in 0..5 {
            let callback = format!("https://good.example/cb{i}");
            let row = store
                .upsert(&OwnerId::new("alice"), &callback, None)
                .await
                .unwrap();
            let task = ConfirmationTask::subscribe(row.id, "s3cr3t".into(), 60);
            store.set_pending(row.id, task.pending()).await.unwrap();
            tx.send(task).await.unwrap();
        }

        let shutdown = Shutdown::new();
        let worker = ConfirmationWorker::new(rx, confirmer(Duration::from_millis(100)), 1);
        let handle = tokio::spawn(worker.run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        // The in-flight verification finished; the rest wait in the store.
        let confirmed = |rows: Vec<Subscription>| rows.iter().filter(|s| s.confirmed).count();
        assert_eq!(confirmed(store.list().await.unwrap()), 1);
        assert_eq!(store.pending().len(), 4);
        assert!(tx
            .send(ConfirmationTask::subscribe(Uuid::new_v4(), "s".into(), 60))
            .await
            .is_err());

        // Next start replays them.
        let backlog: Vec<ConfirmationTask> = store
            .pending()
            .iter()
            .filter_map(ConfirmationTask::from_pending)
            .collect();
        let (_tx, rx) = mpsc::channel(8);
        let shutdown = Shutdown::new();
        let worker = ConfirmationWorker::new(rx, confirmer(Duration::from_millis(1)), 4)
            .with_backlog(backlog);
        let handle = tokio::spawn(worker.run(shutdown.subscribe()));

        let mut drained = false;
        for _ in 0..100 {
            if store.pending().is_empty() {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained);
        assert_eq!(confirmed(store.list().await.unwrap()), 5);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
