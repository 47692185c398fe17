//! In-memory subscription store with JSON snapshots.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::observability::metrics;
use crate::store::{
    unix_now, PendingConfirmation, StoreError, StoreResult, Subscription, SubscriptionStore,
};
use crate::topics::OwnerId;

type SubscriptionKey = (OwnerId, String);

/// A thread-safe subscription store.
///
/// Rows live in a `DashMap` keyed by `(owner, callback_url)`; the entry API
/// holds the shard lock across find-or-create, which serializes racing
/// upserts for the same key. A second map indexes rows by id.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<DashMap<SubscriptionKey, Subscription>>,
    ids: Arc<DashMap<Uuid, SubscriptionKey>>,
    persistence_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            ids: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from a snapshot file if it exists.
    pub fn load_from_file(path: &Path) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let rows: Vec<Subscription> = serde_json::from_reader(reader)?;

            for row in rows {
                let key = (row.owner.clone(), row.callback_url.clone());
                store.ids.insert(row.id, key.clone());
                store.rows.insert(key, row);
            }
            metrics::record_subscription_count(store.rows.len());
            tracing::info!(
                path = ?path,
                subscriptions = store.rows.len(),
                "Loaded subscriptions from snapshot"
            );
        }
        Ok(store)
    }

    /// Write a snapshot, if a path is configured.
    ///
    /// Writes to a temporary file first so a crash never leaves a torn snapshot.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let mut rows: Vec<Subscription> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|row| row.created_at);

        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &rows)?;
        }
        fs::rename(&tmp, path)?;

        tracing::debug!(path = ?path, subscriptions = rows.len(), "Saved subscription snapshot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with an unsettled handshake, oldest first.
    pub fn pending(&self) -> Vec<Subscription> {
        let mut rows: Vec<Subscription> = self
            .rows
            .iter()
            .filter(|r| r.value().pending.is_some())
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|row| row.updated_at);
        rows
    }

    fn key_for(&self, id: Uuid) -> Option<SubscriptionKey> {
        // Clone out so the index guard is released before touching `rows`.
        self.ids.get(&id).map(|key| key.value().clone())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn upsert(
        &self,
        owner: &OwnerId,
        callback_url: &str,
        domain: Option<&str>,
    ) -> StoreResult<Subscription> {
        let now = unix_now();
        let key = (owner.clone(), callback_url.to_string());

        let (subscription, created) = match self.rows.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let row = occupied.get_mut();
                row.domain = domain.map(str::to_owned);
                row.updated_at = now;
                (row.clone(), false)
            }
            Entry::Vacant(vacant) => {
                let mut row = Subscription::new(owner.clone(), callback_url.to_string(), now);
                row.domain = domain.map(str::to_owned);
                // Index before the shard guard drops: a racing upsert that
                // sees this row must also be able to find it by id.
                self.ids.insert(row.id, key);
                vacant.insert(row.clone());
                (row, true)
            }
        };

        if created {
            metrics::record_subscription_count(self.rows.len());
            tracing::debug!(subscription_id = %subscription.id, "Subscription created");
        }

        Ok(subscription)
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<Subscription>> {
        Ok(self
            .key_for(id)
            .and_then(|key| self.rows.get(&key).map(|row| row.value().clone())))
    }

    async fn find_by_callback(
        &self,
        owner: &OwnerId,
        callback_url: &str,
    ) -> StoreResult<Option<Subscription>> {
        let key = (owner.clone(), callback_url.to_string());
        Ok(self.rows.get(&key).map(|row| row.value().clone()))
    }

    async fn confirm(&self, id: Uuid, secret: &str, expires_at: u64) -> StoreResult<Subscription> {
        let key = self.key_for(id).ok_or(StoreError::NotFound(id))?;
        let mut row = self.rows.get_mut(&key).ok_or(StoreError::NotFound(id))?;

        let secret = (!secret.is_empty()).then(|| secret.to_string());
        if !row.confirmed || row.secret != secret || row.expires_at != Some(expires_at) {
            row.confirmed = true;
            row.secret = secret;
            row.expires_at = Some(expires_at);
            row.updated_at = unix_now();
        }

        Ok(row.clone())
    }

    async fn set_pending(&self, id: Uuid, pending: PendingConfirmation) -> StoreResult<()> {
        let key = self.key_for(id).ok_or(StoreError::NotFound(id))?;
        let mut row = self.rows.get_mut(&key).ok_or(StoreError::NotFound(id))?;
        row.pending = Some(pending);
        Ok(())
    }

    async fn clear_pending(&self, id: Uuid, settled: &PendingConfirmation) -> StoreResult<()> {
        let key = self.key_for(id).ok_or(StoreError::NotFound(id))?;
        let mut row = self.rows.get_mut(&key).ok_or(StoreError::NotFound(id))?;
        if row.pending.as_ref() == Some(settled) {
            row.pending = None;
        }
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<Subscription>> {
        let mut rows: Vec<Subscription> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by(|a, b| {
            (a.created_at, a.owner.as_str(), a.callback_url.as_str())
                .cmp(&(b.created_at, b.owner.as_str(), b.callback_url.as_str()))
        });
        Ok(rows)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.rows.len())
    }
}
