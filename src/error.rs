//! Infrastructure errors surfaced by request handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::confirmation::DispatchError;
use crate::store::StoreError;

/// Failures that abort an operation, as opposed to validation outcomes.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("subscription store failed: {0}")]
    Store(#[from] StoreError),

    #[error("confirmation dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}
