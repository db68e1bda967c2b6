//! CLI Tooling
//!
//! Command-line interface over a sync core. Every channel command goes
//! through the request handler, so access control applies exactly as it
//! would for a remote caller.

use crate::access::Capability;
use crate::channel::{Filter, QueryOptions, SortDirection};
use crate::config::{ConfigLoader, ServerConfig};
use crate::dispatch::{Command, Request, Response};
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::server::SyncCore;
use crate::sync::NodeRef;
use crate::types::{NewRecord, Record, Update, Version};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Syncstore CLI - versioned record channels with access control
#[derive(Parser)]
#[command(name = "syncstore")]
#[command(about = "Versioned record channels with synchronized caches and access control")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data root directory (anchors relative storage paths and syncstore.toml)
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// User the request is made as (anonymous when omitted)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Node whose rights govern the request (the root when omitted)
    #[arg(long, global = true)]
    pub node: Option<String>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply the logging flags over the configured section
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if self.verbose {
            config.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List record ids of a channel
    Ids {
        channel: String,
        /// Filter as a JSON object, e.g. '{"name": "^a"}'
        #[arg(long)]
        filter: Option<String>,
        /// Ordering field as FIELD or FIELD:desc (repeatable)
        #[arg(long)]
        order: Vec<String>,
        /// Number of matching records to skip
        #[arg(long)]
        from: Option<usize>,
        /// Maximum number of ids
        #[arg(long)]
        count: Option<usize>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print one record as JSON
    Read { channel: String, id: String },
    /// Create a record from a JSON object
    Create {
        channel: String,
        record: String,
        /// Print the stored record instead of its id
        #[arg(long)]
        echo: bool,
    },
    /// Merge a JSON object (with "id") into an existing record
    Update {
        channel: String,
        record: String,
        /// Print the merged record
        #[arg(long)]
        echo: bool,
    },
    /// Remove a record
    Delete { channel: String, id: String },
    /// Print the channel version
    Version { channel: String },
    /// List changes after a version
    Changes {
        channel: String,
        /// Version to list changes after (all changes when omitted)
        #[arg(long)]
        since: Option<u64>,
        /// Filter as a JSON object
        #[arg(long)]
        filter: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the node hierarchy below --node (or the root)
    Tree,
    /// Show effective rights of --user at --node
    Rights {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration
    Config,
}

/// Load configuration the way the CLI does: an explicit file, or the
/// layered sources anchored at `root`.
pub fn load_config(root: &Path, config_path: Option<&Path>) -> Result<ServerConfig, ApiError> {
    match config_path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(root),
    }
}

/// CLI context holding the loaded configuration and the assembled core
pub struct CliContext {
    root: PathBuf,
    config: ServerConfig,
    core: SyncCore,
}

impl CliContext {
    /// Load configuration and open the store
    pub fn new(root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = load_config(&root, config_path.as_deref())?;
        Self::from_config(root, config)
    }

    pub fn from_config(root: PathBuf, config: ServerConfig) -> Result<Self, ApiError> {
        let core = SyncCore::open(&config, &root)?;
        Ok(Self { root, config, core })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn core(&self) -> &SyncCore {
        &self.core
    }

    /// Execute a command as `user` at `node`
    pub async fn execute(
        &self,
        command: &Commands,
        user: Option<&str>,
        node: Option<&str>,
    ) -> Result<String, ApiError> {
        match command {
            Commands::Ids {
                channel,
                filter,
                order,
                from,
                count,
                format,
            } => {
                let options = query_options(order, *from, *count)?;
                let command = Command::Ids {
                    filter: parse_filter(filter.as_deref())?,
                    options,
                };
                match self.dispatch(channel, command, user, node).await? {
                    Response::Ids(ids) if format == "json" => to_pretty(&json!({ "ids": ids })),
                    Response::Ids(ids) => Ok(format_ids(&ids)),
                    other => to_pretty(&other.to_json()),
                }
            }
            Commands::Read { channel, id } => {
                let response = self
                    .dispatch(channel, Command::Read { id: id.clone() }, user, node)
                    .await?;
                match response {
                    Response::Record(record) => to_pretty(&record.to_json()),
                    other => to_pretty(&other.to_json()),
                }
            }
            Commands::Create {
                channel,
                record,
                echo,
            } => {
                let record = parse_new_record(record)?;
                let response = self
                    .dispatch(channel, Command::Create { record, echo: *echo }, user, node)
                    .await?;
                to_pretty(&response.to_json())
            }
            Commands::Update {
                channel,
                record,
                echo,
            } => {
                let record = parse_patch(record)?;
                let response = self
                    .dispatch(channel, Command::Update { record, echo: *echo }, user, node)
                    .await?;
                to_pretty(&response.to_json())
            }
            Commands::Delete { channel, id } => {
                self.dispatch(channel, Command::Delete { id: id.clone() }, user, node)
                    .await?;
                Ok(format!("Deleted {} from {}", id, channel))
            }
            Commands::Version { channel } => {
                match self.dispatch(channel, Command::Version, user, node).await? {
                    Response::Version(version) => Ok(version.to_string()),
                    other => to_pretty(&other.to_json()),
                }
            }
            Commands::Changes {
                channel,
                since,
                filter,
                format,
            } => {
                let command = Command::Changes {
                    since: since.map(Version),
                    filter: parse_filter(filter.as_deref())?,
                    options: None,
                };
                let response = self.dispatch(channel, command, user, node).await?;
                match &response {
                    Response::Changes { updates, .. } if format != "json" => {
                        Ok(format_changes(updates))
                    }
                    _ => to_pretty(&response.to_json()),
                }
            }
            Commands::Tree => {
                let tree = self.core.tree();
                let start = match node {
                    Some(id) => tree.get_node_by_id(id).await?,
                    None => tree.get_root_node().await?,
                };
                match start {
                    Some(start) => Ok(format_tree(&start)),
                    None => Ok("No nodes".to_string()),
                }
            }
            Commands::Rights { format } => {
                let rights = self.core.validator().effective_rights(user, node).await?;
                let table = &self.config.access;
                if format == "json" {
                    let capabilities = table.capabilities_for(&rights);
                    return to_pretty(&json!({ "rights": rights, "capabilities": capabilities }));
                }
                Ok(format_rights(&rights, |right| {
                    table.capabilities_for(std::slice::from_ref(right))
                        .into_iter()
                        .collect()
                }))
            }
            Commands::Config => self.config.to_toml(),
        }
    }

    async fn dispatch(
        &self,
        channel: &str,
        command: Command,
        user: Option<&str>,
        node: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut request = Request::new(channel, command);
        if let Some(node) = node {
            request = request.at_node(node);
        }
        self.core.handler().process_request(request, user).await
    }
}

fn to_pretty(value: &serde_json::Value) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to render JSON: {}", e)))
}

fn parse_json(text: &str, what: &str) -> Result<serde_json::Value, ApiError> {
    serde_json::from_str(text)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid {} JSON: {}", what, e)))
}

fn parse_filter(text: Option<&str>) -> Result<Option<Filter>, ApiError> {
    let Some(text) = text else {
        return Ok(None);
    };
    Filter::from_json(parse_json(text, "filter")?)
        .map(Some)
        .ok_or_else(|| ApiError::InvalidRequest("Filter must be a JSON object".to_string()))
}

fn parse_new_record(text: &str) -> Result<NewRecord, ApiError> {
    NewRecord::from_json(parse_json(text, "record")?)
        .ok_or_else(|| ApiError::InvalidRequest("Record must be a JSON object".to_string()))
}

fn parse_patch(text: &str) -> Result<Record, ApiError> {
    let patch = parse_new_record(text)?;
    let id = patch
        .id
        .ok_or_else(|| ApiError::InvalidRequest("Update requires an \"id\" member".to_string()))?;
    Ok(Record {
        id,
        fields: patch.fields,
    })
}

/// Parse `FIELD`, `FIELD:asc` or `FIELD:desc`
fn parse_order(raw: &str) -> Result<(String, SortDirection), ApiError> {
    let (field, direction) = match raw.rsplit_once(':') {
        Some((field, "asc")) => (field, SortDirection::Ascending),
        Some((field, "desc")) => (field, SortDirection::Descending),
        Some(_) => {
            return Err(ApiError::InvalidRequest(format!(
                "Invalid order '{}' (expected FIELD, FIELD:asc or FIELD:desc)",
                raw
            )))
        }
        None => (raw, SortDirection::Ascending),
    };
    if field.is_empty() {
        return Err(ApiError::InvalidRequest("Empty order field".to_string()));
    }
    Ok((field.to_string(), direction))
}

fn query_options(
    order: &[String],
    from: Option<usize>,
    count: Option<usize>,
) -> Result<Option<QueryOptions>, ApiError> {
    if order.is_empty() && from.is_none() && count.is_none() {
        return Ok(None);
    }
    let mut options = QueryOptions::new();
    for raw in order {
        let (field, direction) = parse_order(raw)?;
        options = options.order_by(&field, direction);
    }
    options.from = from;
    options.count = count;
    Ok(Some(options))
}

fn format_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        return "No records".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Id"]);
    for (index, id) in ids.iter().enumerate() {
        table.add_row(vec![(index + 1).to_string(), id.clone()]);
    }
    table.to_string()
}

fn format_changes(updates: &[Update]) -> String {
    if updates.is_empty() {
        return "No changes".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Version", "Type", "Id"]);
    for update in updates {
        table.add_row(vec![
            update.version.to_string(),
            update.kind.to_string(),
            update.id.clone(),
        ]);
    }
    table.to_string()
}

fn format_rights<F>(rights: &[String], capabilities: F) -> String
where
    F: Fn(&String) -> Vec<Capability>,
{
    if rights.is_empty() {
        return "No rights".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Right", "Capabilities"]);
    for right in rights {
        let caps: Vec<String> = capabilities(right).iter().map(|c| c.to_string()).collect();
        let caps = if caps.is_empty() {
            "-".to_string()
        } else {
            caps.join(", ")
        };
        table.add_row(vec![right.clone(), caps]);
    }
    table.to_string()
}

/// Indented outline of `start` and its descendants
fn format_tree(start: &NodeRef) -> String {
    let mut output = String::new();
    let mut pending = vec![(start.clone(), 0usize)];
    while let Some((node, depth)) = pending.pop() {
        output.push_str(&"  ".repeat(depth));
        output.push_str(node.id());
        if let Some(name) = node.record().get_str("name") {
            output.push_str(&format!(" ({})", name));
        }
        output.push('\n');
        for child in node.children().into_iter().rev() {
            pending.push((child, depth + 1));
        }
    }
    output.truncate(output.trim_end().len());
    output
}
