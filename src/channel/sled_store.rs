//! Sled-backed channel
//!
//! Each channel owns three trees in a shared sled database:
//! `<name>_records` (id → bincode `StoredRecord`), `<name>_log`
//! (big-endian version → bincode [`Update`]) and `<name>_order`
//! (big-endian creation version → id). A mutation writes all of them in one
//! transaction, so a record change and its log entry land together.
//! Enumeration walks `<name>_order`, so records come back in creation order
//! whatever their ids look like.

use super::query::{select_ids, Filter, QueryOptions};
use super::{narrow_updates, Channel};
use crate::error::StorageError;
use crate::types::{Fields, NewRecord, Record, RecordId, Update, UpdateKind, Value, Version};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::sync::Arc;
use tokio::task;
use tracing::debug;

pub fn records_tree_name(name: &str) -> String {
    format!("{}_records", name)
}

pub fn log_tree_name(name: &str) -> String {
    format!("{}_log", name)
}

pub fn order_tree_name(name: &str) -> String {
    format!("{}_order", name)
}

fn version_key(version: Version) -> Vec<u8> {
    version.0.to_be_bytes().to_vec()
}

fn flatten(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::Backend(e),
    }
}

fn abort<T>(err: impl Into<StorageError>) -> Result<T, ConflictableTransactionError<StorageError>> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

/// Value stored under a record id
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    // version of the Created entry; key into the order tree
    created: Version,
    fields: Fields,
}

/// Channel persisted in sled
#[derive(Clone)]
pub struct SledChannel {
    name: Arc<str>,
    records: Tree,
    log: Tree,
    order: Tree,
    // serializes version assignment across writers
    write_lock: Arc<Mutex<()>>,
}

impl SledChannel {
    /// Open (or create) the trees for channel `name` in `db`
    pub fn open(db: &Db, name: &str) -> Result<Self, StorageError> {
        let records = db.open_tree(records_tree_name(name))?;
        let log = db.open_tree(log_tree_name(name))?;
        let order = db.open_tree(order_tree_name(name))?;
        Ok(Self {
            name: Arc::from(name),
            records,
            log,
            order,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Channel in a throwaway database, removed on drop
    pub fn temporary(name: &str) -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .flush_every_ms(None)
            .open()?;
        Self::open(&db, name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flush all trees to disk
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.records.flush_async().await?;
        self.log.flush_async().await?;
        self.order.flush_async().await?;
        Ok(())
    }

    fn head(&self) -> Result<Version, StorageError> {
        match self.log.last()? {
            Some((_, entry)) => Ok(bincode::deserialize::<Update>(&entry)?.version),
            None => Ok(Version(0)),
        }
    }

    fn generate_id(&self) -> Result<RecordId, StorageError> {
        loop {
            let id = ulid::Ulid::new().to_string();
            if !self.records.contains_key(id.as_bytes())? {
                return Ok(id);
            }
        }
    }

    fn decode(id: &[u8], stored: &[u8]) -> Result<Record, StorageError> {
        let stored: StoredRecord = bincode::deserialize(stored)?;
        Ok(Record {
            id: String::from_utf8_lossy(id).into_owned(),
            fields: stored.fields,
        })
    }

    fn all_records(&self) -> Result<Vec<Record>, StorageError> {
        let mut records = Vec::new();
        for entry in self.order.iter().values() {
            let id = entry?;
            // removed between the two reads
            if let Some(stored) = self.records.get(&id)? {
                records.push(Self::decode(&id, &stored)?);
            }
        }
        Ok(records)
    }

    fn create_blocking(&self, record: NewRecord) -> Result<Record, StorageError> {
        let _guard = self.write_lock.lock();
        let id = match record.id.clone() {
            Some(id) => id,
            None => self.generate_id()?,
        };
        let record = record.into_record(id);
        let version = self.head()?.next();
        let encoded = bincode::serialize(&StoredRecord {
            created: version,
            fields: record.fields.clone(),
        })?;
        let entry = bincode::serialize(&Update {
            kind: UpdateKind::Created,
            id: record.id.clone(),
            version,
        })?;

        (&self.records, &self.log, &self.order)
            .transaction(|(records, log, order)| {
                if records.get(record.id.as_bytes())?.is_some() {
                    return abort(StorageError::AlreadyExists(record.id.clone()));
                }
                records.insert(record.id.as_bytes(), encoded.clone())?;
                log.insert(version_key(version), entry.clone())?;
                order.insert(version_key(version), record.id.as_bytes())?;
                Ok(())
            })
            .map_err(flatten)?;

        debug!(channel = %self.name, id = %record.id, version = %version, "Created record");
        Ok(record)
    }

    fn read_blocking(&self, id: &str) -> Result<Record, StorageError> {
        match self.records.get(id.as_bytes())? {
            Some(stored) => Self::decode(id.as_bytes(), &stored),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    fn read_many_blocking(&self, ids: Option<Vec<RecordId>>) -> Result<Vec<Record>, StorageError> {
        let Some(ids) = ids else {
            return self.all_records();
        };
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(stored) = self.records.get(id.as_bytes())? {
                records.push(Self::decode(id.as_bytes(), &stored)?);
            }
        }
        Ok(records)
    }

    fn update_blocking(&self, patch: Record) -> Result<Record, StorageError> {
        let _guard = self.write_lock.lock();
        let version = self.head()?.next();
        let entry = bincode::serialize(&Update {
            kind: UpdateKind::Changed,
            id: patch.id.clone(),
            version,
        })?;

        let merged = (&self.records, &self.log)
            .transaction(|(records, log)| {
                let Some(raw) = records.get(patch.id.as_bytes())? else {
                    return abort(StorageError::NotFound(patch.id.clone()));
                };
                let mut stored: StoredRecord = match bincode::deserialize(&raw) {
                    Ok(stored) => stored,
                    Err(e) => return abort(e),
                };
                Value::merge_fields(&mut stored.fields, patch.fields.clone());
                let encoded = match bincode::serialize(&stored) {
                    Ok(encoded) => encoded,
                    Err(e) => return abort(e),
                };
                records.insert(patch.id.as_bytes(), encoded)?;
                log.insert(version_key(version), entry.clone())?;
                Ok(Record {
                    id: patch.id.clone(),
                    fields: stored.fields,
                })
            })
            .map_err(flatten)?;

        debug!(channel = %self.name, id = %merged.id, version = %version, "Updated record");
        Ok(merged)
    }

    fn remove_blocking(&self, id: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let version = self.head()?.next();
        let entry = bincode::serialize(&Update {
            kind: UpdateKind::Deleted,
            id: id.to_string(),
            version,
        })?;

        (&self.records, &self.log, &self.order)
            .transaction(|(records, log, order)| {
                let Some(raw) = records.remove(id.as_bytes())? else {
                    return abort(StorageError::NotFound(id.to_string()));
                };
                let stored: StoredRecord = match bincode::deserialize(&raw) {
                    Ok(stored) => stored,
                    Err(e) => return abort(e),
                };
                order.remove(version_key(stored.created))?;
                log.insert(version_key(version), entry.clone())?;
                Ok(())
            })
            .map_err(flatten)?;

        debug!(channel = %self.name, id = %id, version = %version, "Removed record");
        Ok(())
    }

    fn updates_after_blocking(&self, from: Option<Version>) -> Result<Vec<Update>, StorageError> {
        let start = version_key(from.unwrap_or_default().next());
        self.log
            .range(start..)
            .values()
            .map(|entry| Ok(bincode::deserialize::<Update>(&entry?)?))
            .collect()
    }
}

#[async_trait]
impl Channel for SledChannel {
    // each operation hops onto the blocking pool since sled calls are synchronous
    async fn create(&self, record: NewRecord) -> Result<Record, StorageError> {
        let me = self.clone();
        task::spawn_blocking(move || me.create_blocking(record)).await?
    }

    async fn read(&self, id: &str) -> Result<Record, StorageError> {
        let me = self.clone();
        let id = id.to_string();
        task::spawn_blocking(move || me.read_blocking(&id)).await?
    }

    async fn read_many(&self, ids: Option<&[RecordId]>) -> Result<Vec<Record>, StorageError> {
        let me = self.clone();
        let ids = ids.map(<[RecordId]>::to_vec);
        task::spawn_blocking(move || me.read_many_blocking(ids)).await?
    }

    async fn update(&self, record: Record) -> Result<Record, StorageError> {
        let me = self.clone();
        task::spawn_blocking(move || me.update_blocking(record)).await?
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        let me = self.clone();
        let id = id.to_string();
        task::spawn_blocking(move || me.remove_blocking(&id)).await?
    }

    async fn get_ids(
        &self,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<RecordId>, StorageError> {
        let me = self.clone();
        let filter = filter.cloned();
        let options = options.cloned();
        task::spawn_blocking(move || {
            let records = me.all_records()?;
            select_ids(&records, filter.as_ref(), options.as_ref())
        })
        .await?
    }

    async fn get_version(&self) -> Result<Version, StorageError> {
        let me = self.clone();
        task::spawn_blocking(move || me.head()).await?
    }

    async fn get_updates(
        &self,
        from: Option<Version>,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<Update>, StorageError> {
        let me = self.clone();
        let updates = task::spawn_blocking(move || me.updates_after_blocking(from)).await??;
        narrow_updates(self, updates, filter, options).await
    }
}
