//! Synchronized Tree
//!
//! Materializes a channel of records linked by `parentId` into a rooted
//! hierarchy. The root is the first record whose `parentId` is explicitly
//! null; records whose parent cannot be reached from the root are left out.
//! Any new change in the channel triggers a full rebuild into a fresh
//! immutable [`Hierarchy`] snapshot, so handles taken earlier keep seeing the
//! tree they came from.

use super::{RefreshWindow, DEFAULT_CACHE_UPDATE_INTERVAL};
use crate::channel::Channel;
use crate::error::StorageError;
use crate::types::{Record, RecordId, Value, Version};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Field linking a node record to its parent
pub const PARENT_FIELD: &str = "parentId";

struct NodeEntry {
    record: Record,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Immutable snapshot of the node hierarchy
#[derive(Default)]
pub struct Hierarchy {
    nodes: Vec<NodeEntry>,
    index: HashMap<RecordId, usize>,
    root: Option<usize>,
}

impl Hierarchy {
    /// Link `records` into a tree rooted at the first null-parent record
    pub fn build(records: Vec<Record>) -> Self {
        let mut root: Option<Record> = None;
        let mut by_parent: HashMap<String, Vec<Record>> = HashMap::new();
        for record in records {
            match record.get(PARENT_FIELD) {
                Some(Value::Null) => {
                    if root.is_none() {
                        root = Some(record);
                    }
                }
                Some(parent) => {
                    if let Some(parent) = parent.key_string() {
                        by_parent.entry(parent).or_default().push(record);
                    }
                }
                None => {}
            }
        }

        let mut hierarchy = Hierarchy::default();
        let Some(root) = root else {
            return hierarchy;
        };
        let root_index = hierarchy.push(root, None);
        hierarchy.root = Some(root_index);

        let mut pending = vec![root_index];
        while let Some(index) = pending.pop() {
            let id = hierarchy.nodes[index].record.id.clone();
            // each parent's children are taken once, so cycles cannot loop
            let Some(children) = by_parent.remove(&id) else {
                continue;
            };
            for child in children {
                let child_index = hierarchy.push(child, Some(index));
                hierarchy.nodes[index].children.push(child_index);
                pending.push(child_index);
            }
        }
        hierarchy
    }

    fn push(&mut self, record: Record, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.index.insert(record.id.clone(), index);
        self.nodes.push(NodeEntry {
            record,
            parent,
            children: Vec::new(),
        });
        index
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(self: &Arc<Self>) -> Option<NodeRef> {
        self.root.map(|index| NodeRef {
            hierarchy: Arc::clone(self),
            index,
        })
    }

    pub fn node(self: &Arc<Self>, id: &str) -> Option<NodeRef> {
        self.index.get(id).map(|&index| NodeRef {
            hierarchy: Arc::clone(self),
            index,
        })
    }
}

/// Handle to one node of a [`Hierarchy`] snapshot
#[derive(Clone)]
pub struct NodeRef {
    hierarchy: Arc<Hierarchy>,
    index: usize,
}

impl NodeRef {
    fn entry(&self) -> &NodeEntry {
        &self.hierarchy.nodes[self.index]
    }

    fn at(&self, index: usize) -> NodeRef {
        NodeRef {
            hierarchy: Arc::clone(&self.hierarchy),
            index,
        }
    }

    pub fn id(&self) -> &str {
        &self.entry().record.id
    }

    pub fn record(&self) -> &Record {
        &self.entry().record
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entry().record.get(field)
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.entry().parent.map(|index| self.at(index))
    }

    /// Children in channel order
    pub fn children(&self) -> Vec<NodeRef> {
        self.entry()
            .children
            .iter()
            .map(|&index| self.at(index))
            .collect()
    }

    pub fn is_root(&self) -> bool {
        self.entry().parent.is_none()
    }

    /// Distance from the root
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.entry().parent;
        while let Some(index) = current {
            depth += 1;
            current = self.hierarchy.nodes[index].parent;
        }
        depth
    }

    /// Chain from the root down to and including this node
    pub fn path_from_root(&self) -> Vec<NodeRef> {
        let mut path = vec![self.clone()];
        let mut current = self.entry().parent;
        while let Some(index) = current {
            path.push(self.at(index));
            current = self.hierarchy.nodes[index].parent;
        }
        path.reverse();
        path
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("parent", &self.parent().map(|p| p.id().to_string()))
            .field("children", &self.entry().children.len())
            .finish()
    }
}

struct TreeState {
    window: RefreshWindow,
    last_version: Option<Version>,
    hierarchy: Arc<Hierarchy>,
}

/// Node hierarchy over a channel, rebuilt whenever the channel changes
pub struct SynchronizedTree {
    channel: Arc<dyn Channel>,
    state: Mutex<TreeState>,
}

impl SynchronizedTree {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            state: Mutex::new(TreeState {
                window: RefreshWindow::new(DEFAULT_CACHE_UPDATE_INTERVAL),
                last_version: None,
                hierarchy: Arc::new(Hierarchy::default()),
            }),
        }
    }

    pub fn with_cache_update_interval(mut self, interval: Duration) -> Self {
        self.state.get_mut().window.set_interval(interval);
        self
    }

    /// Change the staleness window; zero forces a check on every lookup
    pub async fn set_cache_update_interval(&self, interval: Duration) {
        self.state.lock().await.window.set_interval(interval);
    }

    pub async fn get_root_node(&self) -> Result<Option<NodeRef>, StorageError> {
        Ok(self.snapshot().await?.root())
    }

    pub async fn get_node_by_id(&self, id: &str) -> Result<Option<NodeRef>, StorageError> {
        Ok(self.snapshot().await?.node(id))
    }

    /// Current hierarchy, refreshed first if stale
    pub async fn snapshot(&self) -> Result<Arc<Hierarchy>, StorageError> {
        let mut state = self.state.lock().await;
        if !state.window.is_fresh() {
            self.refresh_now(&mut state).await?;
        }
        Ok(Arc::clone(&state.hierarchy))
    }

    /// Refresh regardless of the staleness window
    pub async fn refresh(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        self.refresh_now(&mut state).await
    }

    async fn refresh_now(&self, state: &mut TreeState) -> Result<(), StorageError> {
        let version = match state.last_version {
            None => Some(self.channel.get_version().await?),
            Some(from) => self
                .channel
                .get_updates(Some(from), None, None)
                .await?
                .last()
                .map(|update| update.version),
        };

        if let Some(version) = version {
            let records = self.channel.read_many(None).await?;
            let hierarchy = Hierarchy::build(records);
            debug!(
                nodes = hierarchy.len(),
                version = %version,
                "Rebuilt synchronized tree"
            );
            state.hierarchy = Arc::new(hierarchy);
            state.last_version = Some(version);
        }
        state.window.mark();
        Ok(())
    }
}
