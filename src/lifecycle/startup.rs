//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the subscription snapshot
//! - Recover handshakes left pending by the previous run
//! - Build blocklist, topic registry and confirmation queue from config
//! - Wire the admitter with its collaborators
//!
//! The confirmation worker is left to the caller, which picks the verifier
//! and owns the task receiver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::blocklist::DomainBlocks;
use crate::config::HubConfig;
use crate::confirmation::{ConfirmationTask, QueueDispatcher};
use crate::http::server::AppState;
use crate::store::{MemoryStore, StoreError};
use crate::subscription::Admitter;
use crate::topics::TopicRegistry;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load subscriptions: {0}")]
    Store(#[from] StoreError),

    #[error("invalid hub.base_url: {0}")]
    BaseUrl(#[from] url::ParseError),
}

/// Everything a running hub needs, wired together.
pub struct Services {
    pub state: AppState,
    /// Concrete store handle, for snapshot flushing.
    pub store: MemoryStore,
    /// Receiving end of the confirmation queue.
    pub tasks: mpsc::Receiver<ConfirmationTask>,
    /// Confirmations accepted earlier but never settled.
    pub backlog: Vec<ConfirmationTask>,
}

/// Initialize subsystems in dependency order.
pub fn build_services(config: HubConfig) -> Result<Services, StartupError> {
    let store = match &config.subscriptions.persistence_path {
        Some(path) => MemoryStore::load_from_file(&PathBuf::from(path))?,
        None => MemoryStore::new(None),
    };

    let backlog: Vec<ConfirmationTask> = store
        .pending()
        .iter()
        .filter_map(ConfirmationTask::from_pending)
        .collect();

    let blocklist = Arc::new(DomainBlocks::new(&config.blocklist.domains));
    let topics = Arc::new(TopicRegistry::from_config(&config.hub, &config.topics)?);
    let (dispatcher, tasks) = QueueDispatcher::from_config(&config.confirmation);

    let shared_store = Arc::new(store.clone());
    let admitter = Arc::new(Admitter::new(
        blocklist.clone(),
        shared_store.clone(),
        Arc::new(dispatcher),
    ));

    tracing::info!(
        subscriptions = store.len(),
        pending_confirmations = backlog.len(),
        blocked_domains = blocklist.len(),
        owners = topics.owners().len(),
        "Services initialized"
    );

    let state = AppState {
        admitter,
        topics,
        blocklist,
        store: shared_store,
        config: Arc::new(config),
        started_at: Instant::now(),
    };

    Ok(Services {
        state,
        store,
        tasks,
        backlog,
    })
}
