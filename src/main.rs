//! WebSub hub (v1)
//!
//! Accepts WebSub subscription requests, stores them and verifies intent
//! with the subscriber asynchronously.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────────────────┐
//!                     │                         HUB                               │
//!                     │                                                           │
//!  POST /hub          │  ┌─────────┐    ┌──────────┐    ┌────────────┐            │
//!  ───────────────────┼─▶│  http   │───▶│  topics  │───▶│  admitter  │            │
//!                     │  │ handler │    │ resolver │    │            │            │
//!                     │  └─────────┘    └──────────┘    └─────┬──────┘            │
//!                     │                                       │                   │
//!                     │             ┌─────────────────────────┼──────────────┐    │
//!                     │             ▼                         ▼              ▼    │
//!                     │      ┌────────────┐          ┌──────────────┐ ┌─────────┐ │
//!                     │      │ validator  │          │    store     │ │  queue  │ │
//!                     │      │+ blocklist │          │ (upsert)     │ │ (mpsc)  │ │
//!                     │      └────────────┘          └──────────────┘ └────┬────┘ │
//!                     │                                                    │      │
//!                     │                                                    ▼      │
//!  GET callback       │                                           ┌────────────┐  │
//!  ◀──────────────────┼───────────────────────────────────────────│  worker    │  │
//!  ?hub.challenge=..  │                                           │ (verifier) │  │
//!                     │                                           └────────────┘  │
//!                     │  ┌─────────────────────────────────────────────────────┐  │
//!                     │  │ config (hot reload) · observability · lifecycle     │  │
//!                     │  └─────────────────────────────────────────────────────┘  │
//!                     └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use websub_hub::config::watcher::ConfigWatcher;
use websub_hub::config::{load_config, HubConfig};
use websub_hub::confirmation::{ConfirmationWorker, Confirmer, HttpVerifier};
use websub_hub::http::{AppState, HubServer};
use websub_hub::lifecycle::{build_services, signals, Services, Shutdown};
use websub_hub::observability::{logging, metrics};
use websub_hub::store::MemoryStore;

#[derive(Parser)]
#[command(name = "websub-hub", version, about = "WebSub hub", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Reloaded on change.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => HubConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("websub-hub v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_url = %config.hub.base_url,
        owners = config.topics.owners.len(),
        blocked_domains = config.blocklist.domains.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let Services {
        state,
        store,
        tasks,
        backlog,
    } = build_services(config)?;
    let shutdown = Shutdown::new();

    // Confirmation worker
    let confirmation = &state.config.confirmation;
    let verifier = Arc::new(HttpVerifier::new(Duration::from_secs(
        confirmation.request_timeout_secs,
    ))?);
    let confirmer = Confirmer::new(
        state.store.clone(),
        state.topics.clone(),
        verifier,
        confirmation,
    );
    let worker =
        ConfirmationWorker::new(tasks, confirmer, confirmation.workers).with_backlog(backlog);
    let worker_task = tokio::spawn(worker.run(shutdown.subscribe()));

    // Snapshot flushing
    let flush_secs = state.config.subscriptions.flush_interval_secs;
    if state.config.subscriptions.persistence_path.is_some() && flush_secs > 0 {
        tokio::spawn(flush_periodically(
            store.clone(),
            Duration::from_secs(flush_secs),
            shutdown.subscribe(),
        ));
    }

    // Hot reload of blocklist and owners
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            tokio::spawn(apply_config_updates(updates, state.clone()));
            match watcher.run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let listener = TcpListener::bind(&state.config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HubServer::new(state);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let finished_early = tokio::select! {
        _ = signals::wait_for_signal() => None,
        result = &mut server_task => Some(result),
    };
    shutdown.trigger();

    let server_result = match finished_early {
        Some(result) => result,
        None => server_task.await,
    };
    let _ = worker_task.await;

    tokio::task::spawn_blocking(move || store.save_to_file()).await??;

    server_result??;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn flush_periodically(
    store: MemoryStore,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let snapshot = store.clone();
                match tokio::task::spawn_blocking(move || snapshot.save_to_file()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Snapshot flush failed"),
                    Err(e) => tracing::error!(error = %e, "Snapshot flush task panicked"),
                }
            }
        }
    }
}

async fn apply_config_updates(mut updates: mpsc::UnboundedReceiver<HubConfig>, state: AppState) {
    while let Some(config) = updates.recv().await {
        state.blocklist.replace(&config.blocklist.domains);
        state.topics.replace_owners(&config.topics.owners);
    }
}
