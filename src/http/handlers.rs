//! Hub endpoint handlers.

use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::{de, Deserialize, Deserializer};

use crate::error::HubError;
use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::subscription::SubscribeRequest;
use crate::topics::OwnerResolver;

/// Form body of a hub request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubForm {
    #[serde(rename = "hub.mode", default)]
    pub mode: String,

    #[serde(rename = "hub.topic", default)]
    pub topic: String,

    #[serde(rename = "hub.callback", default)]
    pub callback: String,

    #[serde(rename = "hub.secret", default)]
    pub secret: String,

    /// Blank counts as absent.
    #[serde(
        rename = "hub.lease_seconds",
        default,
        deserialize_with = "blank_as_none"
    )]
    pub lease_seconds: Option<u64>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// `POST {hub.path}`: subscription requests.
pub async fn hub(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HubForm>,
) -> Result<Response, HubError> {
    let start = Instant::now();

    if form.mode != "subscribe" {
        tracing::debug!(
            request_id = %request_id(&headers),
            mode = %form.mode,
            "Unsupported hub.mode"
        );
        metrics::record_request("POST", 422, start);
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, "Unknown mode").into_response());
    }

    let domain = headers
        .get(state.config.security.verified_domain_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    let request = SubscribeRequest {
        owner: state.topics.resolve(&form.topic),
        callback: form.callback,
        secret: form.secret,
        lease_seconds: form
            .lease_seconds
            .unwrap_or(state.config.subscriptions.default_lease_secs),
        domain,
    };

    let admission = state.admitter.admit(request).await?;
    let (message, status) = admission.into_parts();

    tracing::debug!(
        request_id = %request_id(&headers),
        topic = %form.topic,
        status = status.as_u16(),
        "Hub request handled"
    );
    metrics::record_request("POST", status.as_u16(), start);

    Ok((status, message).into_response())
}

/// `GET /health`: liveness probe.
pub async fn health() -> &'static str {
    "ok"
}
