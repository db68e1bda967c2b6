//! Server core assembly
//!
//! Wires the channel registry for the configured backend to the node tree,
//! the ACL and membership dictionaries, the validator and the request
//! handler.

use crate::access::model::{NODE_ID_FIELD, USER_ID_FIELD};
use crate::access::{AccessTable, NodeAccessValidator};
use crate::channel::{Channel, ChannelRegistry};
use crate::config::{ServerConfig, StorageBackend};
use crate::dispatch::RequestHandler;
use crate::error::{ApiError, StorageError};
use crate::sync::{SynchronizedDictionary, SynchronizedTree};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Node hierarchy
pub const NODES_CHANNEL: &str = "_nodes";
/// ACL entries
pub const NODE_ACCESS_CHANNEL: &str = "_node_access";
/// User/group memberships
pub const USER_GROUPS_CHANNEL: &str = "_user_groups";

pub const SYSTEM_CHANNELS: [&str; 3] = [NODES_CHANNEL, NODE_ACCESS_CHANNEL, USER_GROUPS_CHANNEL];

pub struct SyncCore {
    db: Option<sled::Db>,
    registry: Arc<ChannelRegistry>,
    tree: Arc<SynchronizedTree>,
    validator: Arc<NodeAccessValidator>,
    handler: RequestHandler,
}

impl SyncCore {
    /// Open the configured backend and assemble the core. `root` anchors
    /// relative storage paths.
    pub fn open(config: &ServerConfig, root: &Path) -> Result<Self, ApiError> {
        let names = config.channel_names();
        let (registry, db) = match config.storage.backend {
            StorageBackend::Memory => (ChannelRegistry::in_memory(names), None),
            StorageBackend::Sled => {
                let path = config.storage.resolve_path(root)?;
                std::fs::create_dir_all(&path).map_err(StorageError::from)?;
                let db = sled::open(&path).map_err(StorageError::from)?;
                info!(path = %path.display(), "Opened sled database");
                (ChannelRegistry::sled(db.clone(), names), Some(db))
            }
        };
        let mut core = Self::from_registry(
            Arc::new(registry),
            config.access.clone(),
            config.cache.update_interval(),
        )?;
        core.db = db;
        Ok(core)
    }

    /// Assemble around an existing registry; it must resolve the system channels.
    /// An empty access table leaves requests unchecked.
    pub fn from_registry(
        registry: Arc<ChannelRegistry>,
        access: AccessTable,
        update_interval: Duration,
    ) -> Result<Self, ApiError> {
        let system = |name: &str| -> Result<Arc<dyn Channel>, ApiError> {
            registry
                .get(name)?
                .ok_or_else(|| ApiError::ChannelNotFound(name.to_string()))
        };

        let tree = Arc::new(
            SynchronizedTree::new(system(NODES_CHANNEL)?).with_cache_update_interval(update_interval),
        );
        let node_access = Arc::new(
            SynchronizedDictionary::new(system(NODE_ACCESS_CHANNEL)?, NODE_ID_FIELD)
                .with_cache_update_interval(update_interval),
        );
        let user_groups = Arc::new(
            SynchronizedDictionary::new(system(USER_GROUPS_CHANNEL)?, USER_ID_FIELD)
                .with_cache_update_interval(update_interval),
        );
        let validator = Arc::new(NodeAccessValidator::new(
            Arc::clone(&tree),
            node_access,
            user_groups,
        ));

        let checked = !access.is_empty();
        let mut handler = RequestHandler::new(Arc::clone(&registry));
        if checked {
            handler = handler.with_access_control(Arc::clone(&validator), access);
        }
        info!(
            channels = registry.names().len(),
            access_control = checked,
            interval_ms = update_interval.as_millis() as u64,
            "Assembled sync core"
        );

        Ok(Self {
            db: None,
            registry,
            tree,
            validator,
            handler,
        })
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn tree(&self) -> &Arc<SynchronizedTree> {
        &self.tree
    }

    pub fn validator(&self) -> &Arc<NodeAccessValidator> {
        &self.validator
    }

    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Persist pending writes of a sled backend; a no-op in memory
    pub async fn flush(&self) -> Result<(), ApiError> {
        if let Some(db) = &self.db {
            db.flush_async().await.map_err(StorageError::from)?;
        }
        Ok(())
    }

    /// Resolve a declared channel by name
    pub fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, ApiError> {
        self.registry
            .get(name)?
            .ok_or_else(|| ApiError::ChannelNotFound(name.to_string()))
    }
}
