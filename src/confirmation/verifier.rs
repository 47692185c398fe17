//! Verification of intent against the subscriber's callback.
//!
//! The hub sends `GET {callback}?hub.mode=..&hub.topic=..&hub.challenge=..&hub.lease_seconds=..`
//! and the subscriber proves control of the endpoint by echoing the challenge
//! with a 2xx status.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::confirmation::Mode;

/// Parameters of one verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub callback_url: String,
    pub mode: Mode,
    pub topic: String,
    pub challenge: String,
    pub lease_seconds: u64,
}

/// Why a callback failed verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("callback unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("callback answered with status {0}")]
    Status(u16),

    #[error("callback did not echo the challenge")]
    ChallengeMismatch,
}

impl VerifyError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            VerifyError::Transport(_) => true,
            VerifyError::Status(status) => *status >= 500 || *status == 429,
            VerifyError::ChallengeMismatch => false,
        }
    }
}

/// Performs the verification-of-intent request.
#[async_trait]
pub trait IntentVerifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError>;
}

/// Verifier that talks HTTP to the callback.
#[derive(Clone)]
pub struct HttpVerifier {
    client: reqwest::Client,
}

impl HttpVerifier {
    /// Build a verifier with a per-request timeout. Redirects are not followed:
    /// the callback itself must answer.
    pub fn new(timeout: Duration) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("websub-hub/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntentVerifier for HttpVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError> {
        let lease = request.lease_seconds.to_string();
        let response = self
            .client
            .get(&request.callback_url)
            .query(&[
                ("hub.mode", request.mode.as_str()),
                ("hub.topic", request.topic.as_str()),
                ("hub.challenge", request.challenge.as_str()),
                ("hub.lease_seconds", lease.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        if body.trim() == request.challenge {
            Ok(())
        } else {
            Err(VerifyError::ChallengeMismatch)
        }
    }
}

/// Random alphanumeric challenge.
pub fn generate_challenge() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(32)
        .collect()
}
