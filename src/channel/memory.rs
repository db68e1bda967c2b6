//! In-memory channel
//!
//! Records live in an insertion-ordered map behind a `parking_lot` lock,
//! next to the change log. Enumeration follows insertion order.

use super::query::{select_ids, Filter, QueryOptions};
use super::{narrow_updates, Channel};
use crate::error::StorageError;
use crate::types::{NewRecord, Record, RecordId, Update, UpdateKind, Value, Version};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

#[derive(Default)]
struct MemoryState {
    records: IndexMap<RecordId, Record>,
    updates: Vec<Update>,
}

impl MemoryState {
    fn version(&self) -> Version {
        Version(self.updates.len() as u64)
    }

    fn append(&mut self, kind: UpdateKind, id: &str) -> Version {
        let version = self.version().next();
        self.updates.push(Update {
            kind,
            id: id.to_string(),
            version,
        });
        version
    }

    fn generate_id(&self) -> RecordId {
        loop {
            let id = ulid::Ulid::new().to_string();
            if !self.records.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Channel kept entirely in process memory
#[derive(Default)]
pub struct MemoryChannel {
    name: String,
    state: RwLock<MemoryState>,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Seed a channel with existing records; seeding does not touch the log.
    pub fn with_records(name: impl Into<String>, records: Vec<Record>) -> Self {
        let channel = Self::new(name);
        {
            let mut state = channel.state.write();
            for record in records {
                state.records.insert(record.id.clone(), record);
            }
        }
        channel
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn create(&self, record: NewRecord) -> Result<Record, StorageError> {
        let mut state = self.state.write();
        let id = match &record.id {
            Some(id) => id.clone(),
            None => state.generate_id(),
        };
        if state.records.contains_key(&id) {
            return Err(StorageError::AlreadyExists(id));
        }
        let record = record.into_record(id.clone());
        state.records.insert(id.clone(), record.clone());
        let version = state.append(UpdateKind::Created, &id);
        debug!(channel = %self.name, id = %id, version = %version, "Created record");
        Ok(record)
    }

    async fn read(&self, id: &str) -> Result<Record, StorageError> {
        self.state
            .read()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn read_many(&self, ids: Option<&[RecordId]>) -> Result<Vec<Record>, StorageError> {
        let state = self.state.read();
        Ok(match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| state.records.get(id).cloned())
                .collect(),
            None => state.records.values().cloned().collect(),
        })
    }

    async fn update(&self, record: Record) -> Result<Record, StorageError> {
        let mut state = self.state.write();
        let stored = state
            .records
            .get_mut(&record.id)
            .ok_or_else(|| StorageError::NotFound(record.id.clone()))?;
        Value::merge_fields(&mut stored.fields, record.fields);
        let merged = stored.clone();
        let version = state.append(UpdateKind::Changed, &merged.id);
        debug!(channel = %self.name, id = %merged.id, version = %version, "Updated record");
        Ok(merged)
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.state.write();
        if state.records.shift_remove(id).is_none() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        let version = state.append(UpdateKind::Deleted, id);
        debug!(channel = %self.name, id = %id, version = %version, "Removed record");
        Ok(())
    }

    async fn get_ids(
        &self,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<RecordId>, StorageError> {
        let state = self.state.read();
        select_ids(state.records.values(), filter, options)
    }

    async fn get_version(&self) -> Result<Version, StorageError> {
        Ok(self.state.read().version())
    }

    async fn get_updates(
        &self,
        from: Option<Version>,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<Update>, StorageError> {
        let updates: Vec<Update> = {
            let state = self.state.read();
            let skip = from.map_or(0, |v| v.0 as usize).min(state.updates.len());
            state.updates[skip..].to_vec()
        };
        narrow_updates(self, updates, filter, options).await
    }
}
