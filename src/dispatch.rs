//! Request dispatch
//!
//! Turns typed requests into channel operations. When a validator is
//! configured, the caller's effective rights at the request's node are mapped
//! through the access table and the command's capability is checked before
//! the channel is touched.

use crate::access::{AccessTable, Capability, Grant, NodeAccessValidator};
use crate::channel::{Channel, ChannelRegistry, Filter, QueryOptions};
use crate::error::ApiError;
use crate::types::{NewRecord, Record, RecordId, Update, Version};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Operation to run against a channel
#[derive(Debug, Clone)]
pub enum Command {
    Ids {
        filter: Option<Filter>,
        options: Option<QueryOptions>,
    },
    Read {
        id: RecordId,
    },
    Create {
        record: NewRecord,
        /// Return the stored record instead of just its id
        echo: bool,
    },
    Update {
        record: Record,
        echo: bool,
    },
    Delete {
        id: RecordId,
    },
    Version,
    Changes {
        since: Option<Version>,
        filter: Option<Filter>,
        options: Option<QueryOptions>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ids { .. } => "ids",
            Command::Read { .. } => "read",
            Command::Create { .. } => "create",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
            Command::Version => "version",
            Command::Changes { .. } => "changes",
        }
    }

    /// Capability the command requires
    pub fn capability(&self) -> Capability {
        match self {
            Command::Create { .. } | Command::Update { .. } | Command::Delete { .. } => {
                Capability::Write
            }
            Command::Ids { .. } | Command::Read { .. } | Command::Version | Command::Changes { .. } => {
                Capability::Read
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub channel: String,
    /// Node whose rights govern the request; the root when `None`
    pub node_id: Option<String>,
    pub command: Command,
}

impl Request {
    pub fn new(channel: impl Into<String>, command: Command) -> Self {
        Self {
            channel: channel.into(),
            node_id: None,
            command,
        }
    }

    pub fn at_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ids(Vec<RecordId>),
    Record(Record),
    Created(RecordId),
    Updated,
    Deleted,
    Version(Version),
    Changes {
        channel: String,
        updates: Vec<Update>,
    },
}

impl Response {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Response::Ids(ids) => json!({ "ids": ids }),
            Response::Record(record) => json!({ "record": record.to_json() }),
            Response::Created(id) => json!({ "record": { "id": id } }),
            Response::Updated => json!({ "record": true }),
            Response::Deleted => json!({}),
            Response::Version(version) => json!({ "version": version.0 }),
            Response::Changes { channel, updates } => json!({
                "channel": channel,
                "changes": updates
                    .iter()
                    .map(|u| json!({ "type": u.kind.to_string(), "id": u.id, "version": u.version.0 }))
                    .collect::<Vec<_>>(),
            }),
        }
    }
}

pub struct RequestHandler {
    registry: Arc<ChannelRegistry>,
    validator: Option<Arc<NodeAccessValidator>>,
    access: AccessTable,
}

impl RequestHandler {
    /// Handler without access control
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            validator: None,
            access: AccessTable::default(),
        }
    }

    /// Check every request against rights resolved by `validator`
    pub fn with_access_control(
        mut self,
        validator: Arc<NodeAccessValidator>,
        access: AccessTable,
    ) -> Self {
        self.validator = Some(validator);
        self.access = access;
        self
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Rights and capabilities of `user` at `node_id`
    pub async fn authorize(
        &self,
        user: Option<&str>,
        node_id: Option<&str>,
    ) -> Result<Grant, ApiError> {
        let Some(validator) = &self.validator else {
            return Ok(Grant::unrestricted());
        };
        let rights = validator.effective_rights(user, node_id).await?;
        Ok(self.access.grant(rights))
    }

    pub async fn process_request(
        &self,
        request: Request,
        user: Option<&str>,
    ) -> Result<Response, ApiError> {
        let grant = self.authorize(user, request.node_id.as_deref()).await?;
        let channel = self
            .registry
            .get(&request.channel)?
            .ok_or_else(|| ApiError::ChannelNotFound(request.channel.clone()))?;
        grant.verify(request.command.capability())?;

        debug!(
            channel = %request.channel,
            command = request.command.name(),
            user = ?user,
            "Processing request"
        );
        execute(channel.as_ref(), &request.channel, request.command).await
    }

    /// Run `requests` in order, stopping at the first failure. Change
    /// queries that found nothing are left out of the result.
    pub async fn process_requests(
        &self,
        requests: Vec<Request>,
        user: Option<&str>,
    ) -> Result<Vec<Response>, ApiError> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            let response = self.process_request(request, user).await?;
            if matches!(&response, Response::Changes { updates, .. } if updates.is_empty()) {
                continue;
            }
            responses.push(response);
        }
        Ok(responses)
    }
}

async fn execute(
    channel: &dyn Channel,
    name: &str,
    command: Command,
) -> Result<Response, ApiError> {
    let response = match command {
        Command::Ids { filter, options } => {
            Response::Ids(channel.get_ids(filter.as_ref(), options.as_ref()).await?)
        }
        Command::Read { id } => Response::Record(channel.read(&id).await?),
        Command::Create { record, echo } => {
            let created = channel.create(record).await?;
            if echo {
                Response::Record(created)
            } else {
                Response::Created(created.id)
            }
        }
        Command::Update { record, echo } => {
            let updated = channel.update(record).await?;
            if echo {
                Response::Record(updated)
            } else {
                Response::Updated
            }
        }
        Command::Delete { id } => {
            channel.remove(&id).await?;
            Response::Deleted
        }
        Command::Version => Response::Version(channel.get_version().await?),
        Command::Changes {
            since,
            filter,
            options,
        } => Response::Changes {
            channel: name.to_string(),
            updates: channel
                .get_updates(since, filter.as_ref(), options.as_ref())
                .await?,
        },
    };
    Ok(response)
}
