//! Versioned Channels
//!
//! A channel is a named collection of records with CRUD operations, filtered
//! enumeration, and an append-only change log addressed by [`Version`].
//! Every mutating operation appends exactly one [`Update`]; failed operations
//! leave both the records and the version untouched.

pub mod memory;
pub mod query;
pub mod registry;
pub mod sled_store;

use crate::error::StorageError;
use crate::types::{NewRecord, Record, RecordId, Update, Version};
use async_trait::async_trait;

pub use memory::MemoryChannel;
pub use query::{Filter, QueryOptions, SortDirection};
pub use registry::ChannelRegistry;
pub use sled_store::SledChannel;

/// Channel contract shared by every storage backend
#[async_trait]
pub trait Channel: Send + Sync {
    /// Store a new record, generating an id when none is supplied.
    ///
    /// Fails with `AlreadyExists` when the id is taken.
    async fn create(&self, record: NewRecord) -> Result<Record, StorageError>;

    async fn read(&self, id: &str) -> Result<Record, StorageError>;

    /// Batch lookup; `None` reads every record in creation order. Unknown ids
    /// are skipped.
    async fn read_many(&self, ids: Option<&[RecordId]>) -> Result<Vec<Record>, StorageError>;

    /// Merge the supplied fields into the stored record with the same id.
    async fn update(&self, record: Record) -> Result<Record, StorageError>;

    async fn remove(&self, id: &str) -> Result<(), StorageError>;

    /// Matching ids; without an `order` they come back in creation order.
    async fn get_ids(
        &self,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<RecordId>, StorageError>;

    async fn get_version(&self) -> Result<Version, StorageError>;

    /// Change-log entries strictly after `from` (all of them for `None`).
    ///
    /// With a filter or options, created/changed entries are kept only when
    /// their record is currently in the matching id set; deletions always pass
    /// through since a deleted record can no longer be matched.
    async fn get_updates(
        &self,
        from: Option<Version>,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<Update>, StorageError>;

    /// Create records in order, stopping at the first failure
    async fn create_many(&self, records: Vec<NewRecord>) -> Result<Vec<Record>, StorageError> {
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            created.push(self.create(record).await?);
        }
        Ok(created)
    }
}

/// Narrow a raw change feed to the entries visible through `filter`/`options`.
///
/// Shared by the backends so both apply the same deletion pass-through rule.
pub(crate) async fn narrow_updates<C: Channel + ?Sized>(
    channel: &C,
    updates: Vec<Update>,
    filter: Option<&Filter>,
    options: Option<&QueryOptions>,
) -> Result<Vec<Update>, StorageError> {
    let unfiltered = filter.map_or(true, Filter::is_empty) && options.is_none();
    if updates.is_empty() || unfiltered {
        return Ok(updates);
    }
    let visible: std::collections::HashSet<RecordId> =
        channel.get_ids(filter, options).await?.into_iter().collect();
    Ok(updates
        .into_iter()
        .filter(|update| {
            update.kind == crate::types::UpdateKind::Deleted || visible.contains(&update.id)
        })
        .collect())
}
