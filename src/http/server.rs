//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with hub, health and admin handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit, headers)
//! - Serve on a listener until shutdown is signalled

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::blocklist::DomainBlocks;
use crate::config::HubConfig;
use crate::http::handlers;
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::store::SubscriptionStore;
use crate::subscription::Admitter;
use crate::topics::TopicRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub admitter: Arc<Admitter>,
    pub topics: Arc<TopicRegistry>,
    pub blocklist: Arc<DomainBlocks>,
    pub store: Arc<dyn SubscriptionStore>,
    pub config: Arc<HubConfig>,
    pub started_at: Instant,
}

/// HTTP server for the hub.
pub struct HubServer {
    router: Router,
}

impl HubServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    /// Run the server until a shutdown signal arrives.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route(&config.hub.path, post(handlers::hub))
        .route("/health", get(handlers::health));

    if config.admin.enabled {
        router = router.merge(setup_admin_router(state.clone()));
    }

    router
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(set_request_id_layer())
}
