use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Parameters of a `hub.mode=subscribe` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeParams {
    pub topic: String,
    pub callback: String,
    pub secret: Option<String>,
    pub lease_seconds: Option<u64>,
}

impl SubscribeParams {
    pub fn new(topic: impl Into<String>, callback: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            callback: callback.into(),
            secret: None,
            lease_seconds: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_lease_seconds(mut self, lease_seconds: u64) -> Self {
        self.lease_seconds = Some(lease_seconds);
        self
    }

    fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("hub.mode", "subscribe".to_string()),
            ("hub.topic", self.topic.clone()),
            ("hub.callback", self.callback.clone()),
        ];
        if let Some(secret) = &self.secret {
            form.push(("hub.secret", secret.clone()));
        }
        if let Some(lease) = self.lease_seconds {
            form.push(("hub.lease_seconds", lease.to_string()));
        }
        form
    }
}

/// What the hub answered. The hub reports rejections in the body,
/// so non-2xx statuses are returned here rather than as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub status: u16,
    pub message: String,
}

impl SubscribeResponse {
    pub fn is_accepted(&self) -> bool {
        self.status == 202
    }
}

pub struct HubClient {
    client: Client,
    hub_url: String,
}

impl HubClient {
    /// `hub_url` is the full hub endpoint, e.g. `http://localhost:8080/hub`.
    pub fn new(hub_url: &str) -> Self {
        Self::with_client(Client::new(), hub_url)
    }

    pub fn with_client(client: Client, hub_url: &str) -> Self {
        Self {
            client,
            hub_url: hub_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send a subscription request.
    pub async fn subscribe(&self, params: &SubscribeParams) -> Result<SubscribeResponse, reqwest::Error> {
        let resp = self.client.post(&self.hub_url).form(&params.form()).send().await?;

        let status = resp.status().as_u16();
        let message = resp.text().await?;
        Ok(SubscribeResponse { status, message })
    }

    /// Fetch `/admin/status` from the hub's origin.
    pub async fn status(&self, api_key: &str) -> Result<serde_json::Value, reqwest::Error> {
        let origin = match reqwest::Url::parse(&self.hub_url) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => self.hub_url.clone(),
        };

        self.client
            .get(format!("{}/admin/status", origin))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
