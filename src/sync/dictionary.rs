//! Synchronized Dictionary
//!
//! Groups a channel's records by the value of one key field. The first
//! refresh reads the whole (optionally filtered) channel; later refreshes
//! replay the change feed since the last checkpoint. A record whose key
//! value changes moves to its new bucket.

use super::{RefreshWindow, DEFAULT_CACHE_UPDATE_INTERVAL};
use crate::channel::{Channel, Filter};
use crate::error::StorageError;
use crate::types::{Record, RecordId, UpdateKind, Value, Version};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

struct DictionaryState {
    window: RefreshWindow,
    last_version: Option<Version>,
    buckets: HashMap<String, Vec<Record>>,
    // record id -> key of the bucket holding it
    owners: HashMap<RecordId, String>,
}

impl DictionaryState {
    fn unindex(&mut self, id: &str) {
        let Some(key) = self.owners.remove(id) else {
            return;
        };
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|record| record.id != id);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    fn upsert(&mut self, key_field: &str, record: Record) {
        let key = record.get(key_field).and_then(Value::key_string);
        if let (Some(current), Some(key)) = (self.owners.get(&record.id), &key) {
            if current == key {
                if let Some(slot) = self
                    .buckets
                    .get_mut(key)
                    .and_then(|bucket| bucket.iter_mut().find(|r| r.id == record.id))
                {
                    *slot = record;
                    return;
                }
            }
        }

        self.unindex(&record.id);
        if let Some(key) = key {
            self.owners.insert(record.id.clone(), key.clone());
            self.buckets.entry(key).or_default().push(record);
        }
    }
}

/// Channel records grouped by a key field, refreshed within a staleness window
pub struct SynchronizedDictionary {
    channel: Arc<dyn Channel>,
    key_field: String,
    filter: Option<Filter>,
    state: Mutex<DictionaryState>,
}

impl SynchronizedDictionary {
    pub fn new(channel: Arc<dyn Channel>, key_field: impl Into<String>) -> Self {
        Self {
            channel,
            key_field: key_field.into(),
            filter: None,
            state: Mutex::new(DictionaryState {
                window: RefreshWindow::new(DEFAULT_CACHE_UPDATE_INTERVAL),
                last_version: None,
                buckets: HashMap::new(),
                owners: HashMap::new(),
            }),
        }
    }

    /// Only track records matching `filter`
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_cache_update_interval(mut self, interval: Duration) -> Self {
        self.state.get_mut().window.set_interval(interval);
        self
    }

    /// Change the staleness window; zero forces a refresh on every `get`
    pub async fn set_cache_update_interval(&self, interval: Duration) {
        self.state.lock().await.window.set_interval(interval);
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Records currently filed under `key`, refreshing first if stale
    pub async fn get(&self, key: &str) -> Result<Vec<Record>, StorageError> {
        let mut state = self.state.lock().await;
        self.refresh_if_stale(&mut state).await?;
        Ok(state.buckets.get(key).cloned().unwrap_or_default())
    }

    /// Buckets for several keys, all read from one refreshed state
    pub async fn get_many(&self, keys: &[&str]) -> Result<Vec<Vec<Record>>, StorageError> {
        let mut state = self.state.lock().await;
        self.refresh_if_stale(&mut state).await?;
        Ok(keys
            .iter()
            .map(|key| state.buckets.get(*key).cloned().unwrap_or_default())
            .collect())
    }

    /// Refresh regardless of the staleness window
    pub async fn refresh(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        self.refresh_now(&mut state).await
    }

    /// Channel version the cached contents reflect
    pub async fn version(&self) -> Option<Version> {
        self.state.lock().await.last_version
    }

    async fn refresh_if_stale(&self, state: &mut DictionaryState) -> Result<(), StorageError> {
        if state.window.is_fresh() {
            return Ok(());
        }
        self.refresh_now(state).await
    }

    async fn refresh_now(&self, state: &mut DictionaryState) -> Result<(), StorageError> {
        match state.last_version {
            None => self.rebuild(state).await?,
            Some(from) => self.apply_updates(state, from).await?,
        }
        state.window.mark();
        Ok(())
    }

    async fn rebuild(&self, state: &mut DictionaryState) -> Result<(), StorageError> {
        // version first: anything landing after it is replayed on the next refresh
        let version = self.channel.get_version().await?;
        let ids = self.channel.get_ids(self.filter.as_ref(), None).await?;
        let records = self.channel.read_many(Some(&ids)).await?;

        state.buckets.clear();
        state.owners.clear();
        let count = records.len();
        for record in records {
            state.upsert(&self.key_field, record);
        }
        state.last_version = Some(version);
        debug!(
            key_field = %self.key_field,
            records = count,
            version = %version,
            "Rebuilt synchronized dictionary"
        );
        Ok(())
    }

    async fn apply_updates(
        &self,
        state: &mut DictionaryState,
        from: Version,
    ) -> Result<(), StorageError> {
        let updates = self
            .channel
            .get_updates(Some(from), self.filter.as_ref(), None)
            .await?;
        let Some(last) = updates.last() else {
            return Ok(());
        };

        let mut to_fetch: Vec<RecordId> = Vec::new();
        for update in &updates {
            if update.kind != UpdateKind::Deleted && !to_fetch.contains(&update.id) {
                to_fetch.push(update.id.clone());
            }
        }
        let fetched = if to_fetch.is_empty() {
            Vec::new()
        } else {
            self.channel.read_many(Some(&to_fetch)).await?
        };

        // fetched records reflect current state, so deletions go first
        for update in &updates {
            if update.kind == UpdateKind::Deleted {
                state.unindex(&update.id);
            }
        }
        for record in fetched {
            state.upsert(&self.key_field, record);
        }
        state.last_version = Some(last.version);
        debug!(
            key_field = %self.key_field,
            updates = updates.len(),
            version = %last.version,
            "Applied updates to synchronized dictionary"
        );
        Ok(())
    }
}
