//! The tool surface: named handlers binding the campaign engine and the
//! Discord layer into the host protocol.
//!
//! The toolset is a static table built once at startup; every handler
//! receives its dependencies explicitly through a [`Context`] and asserts a
//! live Discord session before doing anything else.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::campaign::{Scheduler, Sender};
use crate::config::Config;
use crate::discord::DiscordApi;
use crate::error::ToolError;
use crate::store::Store;

mod campaigns;
mod core;

/// Shared dependencies threaded through every tool handler: the store, the
/// Discord session, and the configuration snapshot. The only process-wide
/// state is the snapshot itself.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<Store>,
    pub discord: Arc<dyn DiscordApi>,
    pub config: Arc<Config>,
}

/// One named host-protocol tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// MCP tool descriptor: name, description, and JSON input schema.
    fn schema(&self) -> Value;
    /// Execute with parsed JSON arguments. Errors are part of the result
    /// contract and get serialized in-band.
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// The complete toolset, enumerable at startup.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(ctx: Context) -> Self {
        let sender = Sender::new(ctx.store.clone(), ctx.discord.clone());
        let scheduler = Scheduler::new(ctx.store.clone(), ctx.discord.clone());

        let tools: Vec<Arc<dyn Tool>> = vec![
            // Discord wrappers
            Arc::new(core::ListServersTool::new(ctx.clone())),
            Arc::new(core::ListChannelsTool::new(ctx.clone())),
            Arc::new(core::GetChannelInfoTool::new(ctx.clone())),
            Arc::new(core::BotStatusTool::new(ctx.clone())),
            Arc::new(core::GetRecentMessagesTool::new(ctx.clone())),
            Arc::new(core::GetMessageTool::new(ctx.clone())),
            Arc::new(core::SendMessageTool::new(ctx.clone())),
            // Campaign lifecycle and engine
            Arc::new(campaigns::CreateCampaignTool::new(ctx.clone())),
            Arc::new(campaigns::ListCampaignsTool::new(ctx.clone())),
            Arc::new(campaigns::GetCampaignTool::new(ctx.clone())),
            Arc::new(campaigns::UpdateCampaignStatusTool::new(ctx.clone())),
            Arc::new(campaigns::DeleteCampaignTool::new(ctx.clone())),
            Arc::new(campaigns::ListOptInsTool::new(ctx.clone())),
            Arc::new(campaigns::TallyOptInsTool::new(ctx.clone())),
            Arc::new(campaigns::BuildReminderTool::new(ctx.clone())),
            Arc::new(campaigns::SendReminderTool::new(ctx.clone(), sender)),
            Arc::new(campaigns::RunDueRemindersTool::new(ctx, scheduler)),
        ];
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Deserialize a tool's argument record, mapping malformed input onto the
/// error taxonomy instead of a transport fault.
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Parse a timestamp argument. RFC 3339 is the expected form; a bare
/// `YYYY-MM-DDTHH:MM:SS` is accepted and read as UTC, never local time.
pub(crate) fn parse_datetime(field: &str, raw: &str) -> Result<DateTime<Utc>, ToolError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            ToolError::InvalidArguments(format!(
                "invalid {} '{}': use RFC 3339, e.g. 2024-01-15T10:00:00Z",
                field, raw
            ))
        })
}
