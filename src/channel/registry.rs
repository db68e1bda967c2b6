//! Channel registry
//!
//! Resolves channel names to live instances. Declared channels are created
//! lazily on first lookup through a backend-specific factory and memoized, so
//! every caller shares the same instance (and change log) per name.

use super::{Channel, MemoryChannel, SledChannel};
use crate::error::StorageError;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Creates the channel instance for a declared name
pub type ChannelFactory =
    Box<dyn Fn(&str) -> Result<Arc<dyn Channel>, StorageError> + Send + Sync>;

pub struct ChannelRegistry {
    declared: BTreeSet<String>,
    factory: Option<ChannelFactory>,
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelRegistry {
    /// Registry creating declared channels on demand with `factory`
    pub fn new<I, S>(declared: I, factory: ChannelFactory) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declared: declared.into_iter().map(Into::into).collect(),
            factory: Some(factory),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Registry over a fixed set of already-built channels
    pub fn from_channels(channels: HashMap<String, Arc<dyn Channel>>) -> Self {
        Self {
            declared: channels.keys().cloned().collect(),
            factory: None,
            channels: RwLock::new(channels),
        }
    }

    /// Declared channels kept in process memory
    pub fn in_memory<I, S>(declared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            declared,
            Box::new(|name: &str| Ok(Arc::new(MemoryChannel::new(name)) as Arc<dyn Channel>)),
        )
    }

    /// Declared channels persisted as tree pairs in `db`
    pub fn sled<I, S>(db: sled::Db, declared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            declared,
            Box::new(move |name: &str| Ok(Arc::new(SledChannel::open(&db, name)?) as Arc<dyn Channel>)),
        )
    }

    /// Look up `name`; undeclared names resolve to `None`
    pub fn get(&self, name: &str) -> Result<Option<Arc<dyn Channel>>, StorageError> {
        if let Some(channel) = self.channels.read().get(name) {
            return Ok(Some(Arc::clone(channel)));
        }
        if !self.declared.contains(name) {
            return Ok(None);
        }
        let Some(factory) = &self.factory else {
            return Ok(None);
        };

        let mut channels = self.channels.write();
        // another caller may have created it between the two locks
        if let Some(channel) = channels.get(name) {
            return Ok(Some(Arc::clone(channel)));
        }
        let channel = factory(name)?;
        debug!(channel = %name, "Opened channel");
        channels.insert(name.to_string(), Arc::clone(&channel));
        Ok(Some(channel))
    }

    /// Names of all declared channels, sorted
    pub fn names(&self) -> Vec<String> {
        self.declared.iter().cloned().collect()
    }
}
