//! Admin API: read-only views of hub state behind a bearer token.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/subscriptions", get(get_subscriptions))
        .route("/admin/blocklist", get(get_blocklist))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
