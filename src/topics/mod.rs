//! Topic resolution.
//!
//! A topic is the Atom feed of a local owner, published as
//! `{base_url}/users/{name}.atom`. Resolving a topic URL yields the owner
//! it belongs to, or nothing when the URL is foreign or the owner unknown.
//!
//! The owner set is swapped atomically on config reload.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::schema::{HubSettings, TopicsConfig};
use crate::subscription::callback::normalize_url;

/// Identity of a topic owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Owner names are case-insensitive; the id is stored lowercased.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps topic URLs to owners and back.
pub trait OwnerResolver: Send + Sync {
    /// The owner a topic URL names, if it names a known one.
    fn resolve(&self, topic: &str) -> Option<OwnerId>;

    /// Canonical topic URL of an owner.
    fn topic_url(&self, owner: &OwnerId) -> String;
}

/// Registry of the owners this hub publishes topics for.
pub struct TopicRegistry {
    base: Url,
    owners: ArcSwap<HashSet<String>>,
}

impl TopicRegistry {
    /// Create a registry rooted at `base_url`.
    pub fn new(base_url: &str, owners: &[String]) -> Result<Self, url::ParseError> {
        let base = Url::parse(base_url)?;
        Ok(Self {
            base,
            owners: ArcSwap::from_pointee(owner_set(owners)),
        })
    }

    pub fn from_config(hub: &HubSettings, topics: &TopicsConfig) -> Result<Self, url::ParseError> {
        Self::new(&hub.base_url, &topics.owners)
    }

    /// Replace the owner set.
    pub fn replace_owners(&self, owners: &[String]) {
        let next = owner_set(owners);
        tracing::info!(owners = next.len(), "Topic owners updated");
        self.owners.store(Arc::new(next));
    }

    /// Known owners, sorted.
    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.owners.load().iter().cloned().collect();
        owners.sort();
        owners
    }

    fn owner_name<'a>(&self, url: &'a Url) -> Option<&'a str> {
        if url.host_str() != self.base.host_str()
            || url.port_or_known_default() != self.base.port_or_known_default()
        {
            return None;
        }

        let prefix = self.base.path().trim_end_matches('/');
        let name = url
            .path()
            .strip_prefix(prefix)?
            .strip_prefix("/users/")?
            .strip_suffix(".atom")?;

        if name.is_empty() || name.contains('/') {
            None
        } else {
            Some(name)
        }
    }
}

impl OwnerResolver for TopicRegistry {
    fn resolve(&self, topic: &str) -> Option<OwnerId> {
        let url = normalize_url(topic)?;
        let owner = OwnerId::new(self.owner_name(&url)?);

        if self.owners.load().contains(owner.as_str()) {
            Some(owner)
        } else {
            None
        }
    }

    fn topic_url(&self, owner: &OwnerId) -> String {
        format!(
            "{}/users/{}.atom",
            self.base.as_str().trim_end_matches('/'),
            owner
        )
    }
}

fn owner_set(owners: &[String]) -> HashSet<String> {
    owners
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
