use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use syncstore::channel::{Channel, Filter, MemoryChannel, QueryOptions, SledChannel};
use syncstore::error::StorageError;
use syncstore::types::{NewRecord, Record, RecordId, Update, Version};

/// One channel per backend, named after the backend
pub fn backends(name: &str) -> Vec<(&'static str, Arc<dyn Channel>)> {
    vec![
        ("memory", Arc::new(MemoryChannel::new(name)) as Arc<dyn Channel>),
        (
            "sled",
            Arc::new(SledChannel::temporary(name).unwrap()) as Arc<dyn Channel>,
        ),
    ]
}

/// Channel wrapper whose reads can be switched to fail; counts change feed reads
pub struct FlakyChannel {
    inner: Arc<dyn Channel>,
    failing: AtomicBool,
    feed_reads: AtomicUsize,
}

impl FlakyChannel {
    pub fn new(inner: Arc<dyn Channel>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            feed_reads: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn feed_reads(&self) -> usize {
        self.feed_reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected failure",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for FlakyChannel {
    async fn create(&self, record: NewRecord) -> Result<Record, StorageError> {
        self.inner.create(record).await
    }

    async fn read(&self, id: &str) -> Result<Record, StorageError> {
        self.check()?;
        self.inner.read(id).await
    }

    async fn read_many(&self, ids: Option<&[RecordId]>) -> Result<Vec<Record>, StorageError> {
        self.check()?;
        self.inner.read_many(ids).await
    }

    async fn update(&self, record: Record) -> Result<Record, StorageError> {
        self.inner.update(record).await
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        self.inner.remove(id).await
    }

    async fn get_ids(
        &self,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<RecordId>, StorageError> {
        self.check()?;
        self.inner.get_ids(filter, options).await
    }

    async fn get_version(&self) -> Result<Version, StorageError> {
        self.check()?;
        self.inner.get_version().await
    }

    async fn get_updates(
        &self,
        from: Option<Version>,
        filter: Option<&Filter>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<Update>, StorageError> {
        self.check()?;
        self.feed_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_updates(from, filter, options).await
    }
}
