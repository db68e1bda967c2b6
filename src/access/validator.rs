//! Node Access Validator
//!
//! Resolves the rights a user holds at a node. The ACL entries of every node
//! on the path from the root down to the target are overlaid in order, so an
//! entry at a deeper node overrides whatever its ancestors decided for the
//! same right, and within one node the last applicable entry wins.

use super::model::{NodeAccess, UserGroupMembership};
use crate::error::StorageError;
use crate::sync::{SynchronizedDictionary, SynchronizedTree};
use crate::types::RightId;
use futures::try_join;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct NodeAccessValidator {
    tree: Arc<SynchronizedTree>,
    // ACL entries keyed by nodeId
    node_access: Arc<SynchronizedDictionary>,
    // memberships keyed by userId
    user_groups: Arc<SynchronizedDictionary>,
}

impl NodeAccessValidator {
    pub fn new(
        tree: Arc<SynchronizedTree>,
        node_access: Arc<SynchronizedDictionary>,
        user_groups: Arc<SynchronizedDictionary>,
    ) -> Self {
        Self {
            tree,
            node_access,
            user_groups,
        }
    }

    pub fn tree(&self) -> &Arc<SynchronizedTree> {
        &self.tree
    }

    /// Rights allowed for `user` at `node` (the root when `None`), in the
    /// order they were first decided along the path
    pub async fn effective_rights(
        &self,
        user: Option<&str>,
        node: Option<&str>,
    ) -> Result<Vec<RightId>, StorageError> {
        let resolved = self.resolve(user, node).await?;
        Ok(resolved
            .into_iter()
            .filter_map(|(right, allowed)| allowed.then_some(right))
            .collect())
    }

    /// Full `rightId -> allow` mapping, denials included
    pub async fn resolve(
        &self,
        user: Option<&str>,
        node: Option<&str>,
    ) -> Result<IndexMap<RightId, bool>, StorageError> {
        let target = match node {
            Some(id) => self.tree.get_node_by_id(id).await?,
            None => self.tree.get_root_node().await?,
        };
        let Some(target) = target else {
            debug!(node = ?node, "No node to resolve rights against");
            return Ok(IndexMap::new());
        };

        let path = target.path_from_root();
        let ids: Vec<&str> = path.iter().map(|node| node.id()).collect();
        let (groups, entries_per_node) =
            try_join!(self.groups_of(user), self.node_access.get_many(&ids))?;

        let mut rights: IndexMap<RightId, bool> = IndexMap::new();
        for (node, records) in path.iter().zip(entries_per_node) {
            for record in &records {
                let Some(entry) = NodeAccess::from_record(record) else {
                    warn!(node = %node.id(), record = %record.id, "Skipping ACL entry without rightId");
                    continue;
                };
                if entry.applies_to(user, &groups) {
                    rights.insert(entry.right_id, entry.allow);
                }
            }
        }

        debug!(
            user = ?user,
            node = %target.id(),
            depth = path.len(),
            rights = rights.len(),
            "Resolved node access"
        );
        Ok(rights)
    }

    async fn groups_of(&self, user: Option<&str>) -> Result<HashSet<String>, StorageError> {
        let Some(user) = user else {
            return Ok(HashSet::new());
        };
        let records = self.user_groups.get(user).await?;
        let mut groups = HashSet::with_capacity(records.len());
        for record in &records {
            match UserGroupMembership::from_record(record) {
                Some(membership) => {
                    groups.insert(membership.group_id);
                }
                None => warn!(record = %record.id, "Skipping malformed group membership"),
            }
        }
        Ok(groups)
    }
}
