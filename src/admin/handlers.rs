use axum::{extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::error::HubError;
use crate::http::server::AppState;
use crate::store::Subscription;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub subscriptions: usize,
    pub confirmed_subscriptions: usize,
    pub blocked_domains: usize,
    pub topic_owners: usize,
}

/// Admin view of a subscription. The secret is never exposed.
#[derive(Serialize)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub owner: String,
    pub topic: String,
    pub callback_url: String,
    pub domain: Option<String>,
    pub confirmed: bool,
    pub active: bool,
    pub expires_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl SubscriptionView {
    fn new(subscription: Subscription, topic: String) -> Self {
        Self {
            id: subscription.id,
            active: subscription.is_active(),
            owner: subscription.owner.to_string(),
            topic,
            callback_url: subscription.callback_url,
            domain: subscription.domain,
            confirmed: subscription.confirmed,
            expires_at: subscription.expires_at,
            created_at: subscription.created_at,
            updated_at: subscription.updated_at,
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<SystemStatus>, HubError> {
    let subscriptions = state.store.list().await?;
    let confirmed = subscriptions.iter().filter(|s| s.confirmed).count();

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        subscriptions: subscriptions.len(),
        confirmed_subscriptions: confirmed,
        blocked_domains: state.blocklist.len(),
        topic_owners: state.topics.owners().len(),
    }))
}

pub async fn get_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubscriptionView>>, HubError> {
    use crate::topics::OwnerResolver;

    let views = state
        .store
        .list()
        .await?
        .into_iter()
        .map(|s| {
            let topic = state.topics.topic_url(&s.owner);
            SubscriptionView::new(s, topic)
        })
        .collect();
    Ok(Json(views))
}

pub async fn get_blocklist(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.blocklist.domains())
}
