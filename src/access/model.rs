//! ACL entry and group membership records
//!
//! Both live in ordinary channels; these types parse them out of (and build
//! them into) plain records. Empty-string principals count as unset.

use crate::types::{NewRecord, Record, RightId, Value};
use std::collections::HashSet;

pub const NODE_ID_FIELD: &str = "nodeId";
pub const ORDER_FIELD: &str = "order";
pub const USER_ID_FIELD: &str = "userId";
pub const USER_GROUP_ID_FIELD: &str = "userGroupId";
pub const RIGHT_ID_FIELD: &str = "rightId";
pub const ALLOW_FIELD: &str = "allow";
pub const GROUP_ID_FIELD: &str = "groupId";

fn non_empty(record: &Record, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(Value::key_string)
        .filter(|s| !s.is_empty())
}

/// NodeAccess: one grant or denial of a right at a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAccess {
    pub node_id: String,
    /// Carried through but not consulted; entries apply in storage order
    pub order: Option<f64>,
    pub user_id: Option<String>,
    pub user_group_id: Option<String>,
    pub right_id: RightId,
    pub allow: bool,
}

impl NodeAccess {
    /// Entry applying to everyone at `node_id`
    pub fn everyone(node_id: &str, right_id: &str, allow: bool) -> Self {
        Self {
            node_id: node_id.to_string(),
            order: None,
            user_id: None,
            user_group_id: None,
            right_id: right_id.to_string(),
            allow,
        }
    }

    pub fn for_user(node_id: &str, user_id: &str, right_id: &str, allow: bool) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::everyone(node_id, right_id, allow)
        }
    }

    pub fn for_group(node_id: &str, group_id: &str, right_id: &str, allow: bool) -> Self {
        Self {
            user_group_id: Some(group_id.to_string()),
            ..Self::everyone(node_id, right_id, allow)
        }
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    /// Parse an ACL record; records without a right id yield `None`.
    /// A missing `allow` reads as a denial.
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            node_id: non_empty(record, NODE_ID_FIELD).unwrap_or_default(),
            order: record.get(ORDER_FIELD).and_then(Value::as_f64),
            user_id: non_empty(record, USER_ID_FIELD),
            user_group_id: non_empty(record, USER_GROUP_ID_FIELD),
            right_id: non_empty(record, RIGHT_ID_FIELD)?,
            allow: record
                .get(ALLOW_FIELD)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    pub fn to_new_record(&self) -> NewRecord {
        let mut record = NewRecord::new()
            .with(NODE_ID_FIELD, self.node_id.as_str())
            .with(RIGHT_ID_FIELD, self.right_id.as_str())
            .with(ALLOW_FIELD, self.allow);
        if let Some(order) = self.order {
            record = record.with(ORDER_FIELD, order);
        }
        if let Some(user) = &self.user_id {
            record = record.with(USER_ID_FIELD, user.as_str());
        }
        if let Some(group) = &self.user_group_id {
            record = record.with(USER_GROUP_ID_FIELD, group.as_str());
        }
        record
    }

    /// Whether this entry governs `user` (anonymous when `None`) with `groups`
    pub fn applies_to(&self, user: Option<&str>, groups: &HashSet<String>) -> bool {
        if self.user_id.is_none() && self.user_group_id.is_none() {
            return true;
        }
        let user_matches = matches!((&self.user_id, user), (Some(owner), Some(user)) if owner == user);
        let group_matches = self
            .user_group_id
            .as_ref()
            .is_some_and(|group| groups.contains(group));
        user_matches || group_matches
    }
}

/// UserGroupMembership: a user's membership in one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupMembership {
    pub user_id: String,
    pub group_id: String,
}

impl UserGroupMembership {
    pub fn new(user_id: &str, group_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
        }
    }

    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            user_id: non_empty(record, USER_ID_FIELD)?,
            group_id: non_empty(record, GROUP_ID_FIELD)?,
        })
    }

    pub fn to_new_record(&self) -> NewRecord {
        NewRecord::new()
            .with(USER_ID_FIELD, self.user_id.as_str())
            .with(GROUP_ID_FIELD, self.group_id.as_str())
    }
}
