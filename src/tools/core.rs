//! Thin wrappers over the Discord layer: server, channel, and message
//! operations.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ToolError;

use super::{parse_args, Context, Tool};

pub struct ListServersTool {
    ctx: Context,
}

impl ListServersTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListServersTool {
    fn name(&self) -> &str {
        "list_servers"
    }

    fn description(&self) -> &str {
        "List the Discord servers (guilds) the bot is a member of"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "list_servers",
            "description": "List the Discord servers (guilds) the bot is a member of, filtered to the configured allowlist.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "required": []
            }
        })
    }

    async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let servers = self.ctx.discord.guild_list().await?;
        let total_count = servers.len();
        Ok(json!({
            "success": true,
            "servers": servers,
            "total_count": total_count,
        }))
    }
}

pub struct ListChannelsTool {
    ctx: Context,
}

impl ListChannelsTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct ListChannelsArgs {
    guild_id: String,
    channel_type: Option<String>,
}

#[async_trait]
impl Tool for ListChannelsTool {
    fn name(&self) -> &str {
        "list_channels"
    }

    fn description(&self) -> &str {
        "List channels in a Discord server with optional type filtering"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "list_channels",
            "description": "List channels in a Discord server. Optionally filter by channel type (text, voice, category, ...).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "guild_id": { "type": "string", "description": "Discord server (guild) ID" },
                    "channel_type": { "type": "string", "description": "Optional channel type filter (text, voice, category, ...)" }
                },
                "required": ["guild_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: ListChannelsArgs = parse_args(arguments)?;
        let channels = self
            .ctx
            .discord
            .channel_list(&args.guild_id, args.channel_type.as_deref())
            .await?;
        let total_count = channels.len();
        Ok(json!({
            "success": true,
            "server_id": args.guild_id,
            "filtered_by_type": args.channel_type,
            "channels": channels,
            "total_count": total_count,
        }))
    }
}

pub struct GetChannelInfoTool {
    ctx: Context,
}

impl GetChannelInfoTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct GetChannelInfoArgs {
    channel_id: String,
}

#[async_trait]
impl Tool for GetChannelInfoTool {
    fn name(&self) -> &str {
        "get_channel_info"
    }

    fn description(&self) -> &str {
        "Get detailed information about a Discord channel"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "get_channel_info",
            "description": "Get detailed information about a Discord channel.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": { "type": "string", "description": "Discord channel ID" }
                },
                "required": ["channel_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: GetChannelInfoArgs = parse_args(arguments)?;
        let channel = self.ctx.discord.channel_get(&args.channel_id).await?;
        Ok(json!({ "success": true, "channel": channel }))
    }
}

pub struct BotStatusTool {
    ctx: Context,
}

impl BotStatusTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for BotStatusTool {
    fn name(&self) -> &str {
        "bot_status"
    }

    fn description(&self) -> &str {
        "Get the Discord bot's connection status and configuration"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "bot_status",
            "description": "Get the Discord bot's connection status, identity, guild count, and active configuration.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "required": []
            }
        })
    }

    async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let status = self.ctx.discord.bot_status().await?;
        Ok(json!({ "success": true, "status": status }))
    }
}

pub struct GetRecentMessagesTool {
    ctx: Context,
}

impl GetRecentMessagesTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

fn default_message_limit() -> u8 {
    50
}

#[derive(Debug, Deserialize)]
struct GetRecentMessagesArgs {
    channel_id: String,
    #[serde(default = "default_message_limit")]
    limit: u8,
}

#[async_trait]
impl Tool for GetRecentMessagesTool {
    fn name(&self) -> &str {
        "get_recent_messages"
    }

    fn description(&self) -> &str {
        "Get recent messages from a Discord channel"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "get_recent_messages",
            "description": "Get recent messages from a Discord channel, newest first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": { "type": "string", "description": "Discord channel ID" },
                    "limit": { "type": "integer", "description": "Number of messages to retrieve (1-100, default 50)" }
                },
                "required": ["channel_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: GetRecentMessagesArgs = parse_args(arguments)?;
        if args.limit == 0 || args.limit > 100 {
            return Err(ToolError::InvalidArguments(
                "limit must be between 1 and 100".into(),
            ));
        }
        let messages = self
            .ctx
            .discord
            .recent_messages(&args.channel_id, args.limit)
            .await?;
        let count = messages.len();
        Ok(json!({
            "success": true,
            "channel_id": args.channel_id,
            "messages": messages,
            "count": count,
        }))
    }
}

pub struct GetMessageTool {
    ctx: Context,
}

impl GetMessageTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct GetMessageArgs {
    channel_id: String,
    message_id: String,
}

#[async_trait]
impl Tool for GetMessageTool {
    fn name(&self) -> &str {
        "get_message"
    }

    fn description(&self) -> &str {
        "Get a specific message by ID, including its reactions"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "get_message",
            "description": "Get a specific message by ID, including its reaction summary. Useful for checking a signup sheet before creating a campaign.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": { "type": "string", "description": "Discord channel ID" },
                    "message_id": { "type": "string", "description": "Discord message ID" }
                },
                "required": ["channel_id", "message_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: GetMessageArgs = parse_args(arguments)?;
        let message = self
            .ctx
            .discord
            .message_get(&args.channel_id, &args.message_id)
            .await?;
        Ok(json!({ "success": true, "message": message }))
    }
}

pub struct SendMessageTool {
    ctx: Context,
}

impl SendMessageTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageArgs {
    channel_id: String,
    content: String,
    reply_to: Option<String>,
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a Discord channel"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "send_message",
            "description": "Send a message to a Discord channel, optionally as a reply. Suppressed when DRY_RUN is set.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": { "type": "string", "description": "Discord channel ID" },
                    "content": { "type": "string", "description": "Message content (up to 2000 characters)" },
                    "reply_to": { "type": "string", "description": "Optional message ID to reply to" }
                },
                "required": ["channel_id", "content"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: SendMessageArgs = parse_args(arguments)?;
        let message_id = self
            .ctx
            .discord
            .message_send(&args.channel_id, &args.content, args.reply_to.as_deref())
            .await?;
        Ok(json!({
            "success": true,
            "message_id": message_id,
            "channel_id": args.channel_id,
            "reply_to": args.reply_to,
            "dry_run": self.ctx.config.dry_run,
        }))
    }
}
