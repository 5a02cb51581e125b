//! Campaign tools: lifecycle, tally, reminder building, sending, and the
//! due-campaign scheduler tick.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::campaign::{self, Scheduler, Sender};
use crate::error::ToolError;
use crate::store::CampaignStatus;

use super::{parse_args, parse_datetime, Context, Tool};

pub struct CreateCampaignTool {
    ctx: Context,
}

impl CreateCampaignTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct CreateCampaignArgs {
    channel_id: String,
    message_id: String,
    emoji: String,
    remind_at: String,
    title: Option<String>,
}

#[async_trait]
impl Tool for CreateCampaignTool {
    fn name(&self) -> &str {
        "create_campaign"
    }

    fn description(&self) -> &str {
        "Create a reaction opt-in reminder campaign for a Discord message"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "create_campaign",
            "description": "Register a Discord message as a signup sheet: users reacting with the given emoji are reminded at remind_at. The (channel, message, emoji) triple must be unique.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": { "type": "string", "description": "Channel containing the tracked message" },
                    "message_id": { "type": "string", "description": "Message to track reactions on" },
                    "emoji": { "type": "string", "description": "Emoji to track: a Unicode emoji, or name:id for custom emoji" },
                    "remind_at": { "type": "string", "description": "When to send the reminder, RFC 3339 UTC (e.g. 2024-01-15T10:00:00Z)" },
                    "title": { "type": "string", "description": "Optional campaign title used in the reminder header" }
                },
                "required": ["channel_id", "message_id", "emoji", "remind_at"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: CreateCampaignArgs = parse_args(arguments)?;
        let remind_at = parse_datetime("remind_at", &args.remind_at)?;
        let campaign = campaign::create_campaign(
            &self.ctx.store,
            self.ctx.discord.as_ref(),
            args.title.as_deref(),
            &args.channel_id,
            &args.message_id,
            &args.emoji,
            remind_at,
        )
        .await?;
        Ok(json!({ "success": true, "campaign": campaign }))
    }
}

pub struct ListCampaignsTool {
    ctx: Context,
}

impl ListCampaignsTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct ListCampaignsArgs {
    status: Option<String>,
}

#[async_trait]
impl Tool for ListCampaignsTool {
    fn name(&self) -> &str {
        "list_campaigns"
    }

    fn description(&self) -> &str {
        "List reminder campaigns, optionally filtered by status"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "list_campaigns",
            "description": "List reminder campaigns ordered by remind time, optionally filtered by status (active, completed, cancelled).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "status": { "type": "string", "enum": ["active", "completed", "cancelled"], "description": "Optional status filter" }
                },
                "required": []
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: ListCampaignsArgs = parse_args(arguments)?;
        let status = match args.status.as_deref() {
            Some(raw) => Some(CampaignStatus::parse(raw).ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "unknown status '{}': expected active, completed, or cancelled",
                    raw
                ))
            })?),
            None => None,
        };
        let campaigns = self.ctx.store.list_campaigns(status).await?;
        let total_count = campaigns.len();
        Ok(json!({
            "success": true,
            "campaigns": campaigns,
            "total_count": total_count,
        }))
    }
}

pub struct GetCampaignTool {
    ctx: Context,
}

impl GetCampaignTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct CampaignIdArgs {
    campaign_id: i64,
}

#[async_trait]
impl Tool for GetCampaignTool {
    fn name(&self) -> &str {
        "get_campaign"
    }

    fn description(&self) -> &str {
        "Get a campaign with its opt-in count and broadcast history"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "get_campaign",
            "description": "Get a campaign's details, current opt-in count, and reminder broadcast history.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "integer", "description": "Campaign ID" }
                },
                "required": ["campaign_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: CampaignIdArgs = parse_args(arguments)?;
        let campaign = self
            .ctx
            .store
            .get_campaign(args.campaign_id)
            .await?
            .ok_or_else(|| {
                ToolError::NotFound(format!("campaign {} not found", args.campaign_id))
            })?;
        let optin_count = self.ctx.store.count_optins(args.campaign_id).await?;
        let reminder_logs = self.ctx.store.reminder_logs(args.campaign_id).await?;
        Ok(json!({
            "success": true,
            "campaign": campaign,
            "optin_count": optin_count,
            "reminder_logs": reminder_logs,
        }))
    }
}

pub struct UpdateCampaignStatusTool {
    ctx: Context,
}

impl UpdateCampaignStatusTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateStatusArgs {
    campaign_id: i64,
    status: String,
}

#[async_trait]
impl Tool for UpdateCampaignStatusTool {
    fn name(&self) -> &str {
        "update_campaign_status"
    }

    fn description(&self) -> &str {
        "Move a campaign to a new status (complete, cancel, or re-arm)"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "update_campaign_status",
            "description": "Move a campaign through its status machine. Legal transitions: active → completed, active → cancelled, cancelled → active.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "integer", "description": "Campaign ID" },
                    "status": { "type": "string", "enum": ["active", "completed", "cancelled"], "description": "Target status" }
                },
                "required": ["campaign_id", "status"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: UpdateStatusArgs = parse_args(arguments)?;
        if args.status == "deleted" {
            return Err(ToolError::InvalidState(
                "deletion goes through delete_campaign".into(),
            ));
        }
        let status = CampaignStatus::parse(&args.status).ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "unknown status '{}': expected active, completed, or cancelled",
                args.status
            ))
        })?;
        let campaign = campaign::update_status(&self.ctx.store, args.campaign_id, status).await?;
        Ok(json!({ "success": true, "campaign": campaign }))
    }
}

pub struct DeleteCampaignTool {
    ctx: Context,
}

impl DeleteCampaignTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for DeleteCampaignTool {
    fn name(&self) -> &str {
        "delete_campaign"
    }

    fn description(&self) -> &str {
        "Delete a campaign together with its opt-ins and reminder logs"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "delete_campaign",
            "description": "Permanently delete a campaign. Its opt-ins and reminder logs are removed with it.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "integer", "description": "Campaign ID" }
                },
                "required": ["campaign_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: CampaignIdArgs = parse_args(arguments)?;
        campaign::delete_campaign(&self.ctx.store, args.campaign_id).await?;
        Ok(json!({
            "success": true,
            "deleted_campaign_id": args.campaign_id,
        }))
    }
}

pub struct ListOptInsTool {
    ctx: Context,
}

impl ListOptInsTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

fn default_optin_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
struct ListOptInsArgs {
    campaign_id: i64,
    #[serde(default = "default_optin_limit")]
    limit: i64,
    after_user_id: Option<String>,
}

#[async_trait]
impl Tool for ListOptInsTool {
    fn name(&self) -> &str {
        "list_optins"
    }

    fn description(&self) -> &str {
        "List a campaign's opt-ins with keyset pagination"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "list_optins",
            "description": "List a campaign's recorded opt-ins, ordered by user ID. Pass after_user_id to page through large campaigns.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "integer", "description": "Campaign ID" },
                    "limit": { "type": "integer", "description": "Page size (1-1000, default 100)" },
                    "after_user_id": { "type": "string", "description": "Resume after this user ID" }
                },
                "required": ["campaign_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: ListOptInsArgs = parse_args(arguments)?;
        if args.limit < 1 || args.limit > 1000 {
            return Err(ToolError::InvalidArguments(
                "limit must be between 1 and 1000".into(),
            ));
        }
        // Verify the campaign exists so an unknown id is NotFound rather
        // than an empty page.
        campaign::require_campaign(&self.ctx.store, args.campaign_id).await?;
        let optins = self
            .ctx
            .store
            .list_optins_page(args.campaign_id, args.limit, args.after_user_id.as_deref())
            .await?;
        let total = self.ctx.store.count_optins(args.campaign_id).await?;
        let has_more = optins.len() as i64 == args.limit;
        Ok(json!({
            "success": true,
            "campaign_id": args.campaign_id,
            "optins": optins,
            "total_count": total,
            "pagination": {
                "limit": args.limit,
                "after_user_id": args.after_user_id,
                "has_more": has_more,
            },
        }))
    }
}

pub struct TallyOptInsTool {
    ctx: Context,
}

impl TallyOptInsTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for TallyOptInsTool {
    fn name(&self) -> &str {
        "tally_optins"
    }

    fn description(&self) -> &str {
        "Fetch current reactions and record new opt-ins (idempotent)"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "tally_optins",
            "description": "Fetch reactions for a campaign's tracked emoji and record each non-bot reactor exactly once. Safe to run repeatedly.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "integer", "description": "Campaign ID" }
                },
                "required": ["campaign_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: CampaignIdArgs = parse_args(arguments)?;
        let tally = campaign::tally(
            &self.ctx.store,
            self.ctx.discord.as_ref(),
            args.campaign_id,
        )
        .await?;
        Ok(json!({ "success": true, "tally": tally }))
    }
}

pub struct BuildReminderTool {
    ctx: Context,
}

impl BuildReminderTool {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct BuildReminderArgs {
    campaign_id: i64,
    template: Option<String>,
}

#[async_trait]
impl Tool for BuildReminderTool {
    fn name(&self) -> &str {
        "build_reminder"
    }

    fn description(&self) -> &str {
        "Preview the reminder broadcast chunks for a campaign"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "build_reminder",
            "description": "Build the reminder message chunks (each under Discord's 2000-character ceiling) without sending anything. Templates may use {title}, {total_optins}, and {mentions}.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "integer", "description": "Campaign ID" },
                    "template": { "type": "string", "description": "Optional header template" }
                },
                "required": ["campaign_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: BuildReminderArgs = parse_args(arguments)?;
        let built = campaign::build_reminder(
            &self.ctx.store,
            args.campaign_id,
            args.template.as_deref(),
        )
        .await?;
        let chunk_count = built.chunks.len();
        Ok(json!({
            "success": true,
            "reminder": {
                "campaign_id": args.campaign_id,
                "total_recipients": built.recipient_count,
                "message_chunks": built.chunks,
                "chunk_count": chunk_count,
            },
        }))
    }
}

pub struct SendReminderTool {
    ctx: Context,
    sender: Sender,
}

impl SendReminderTool {
    pub fn new(ctx: Context, sender: Sender) -> Self {
        Self { ctx, sender }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SendReminderArgs {
    campaign_id: i64,
    #[serde(default = "default_true")]
    dry_run: bool,
}

#[async_trait]
impl Tool for SendReminderTool {
    fn name(&self) -> &str {
        "send_reminder"
    }

    fn description(&self) -> &str {
        "Send a campaign's reminder broadcast (dry-run by default)"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "send_reminder",
            "description": "Send a campaign's reminder broadcast chunk by chunk, with pacing and rate-limit retries. dry_run defaults to true; pass dry_run=false to actually send.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "integer", "description": "Campaign ID" },
                    "dry_run": { "type": "boolean", "description": "Simulate without sending (default: true)" }
                },
                "required": ["campaign_id"]
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: SendReminderArgs = parse_args(arguments)?;
        // The process-wide DRY_RUN flag wins over the per-call argument.
        let dry_run = args.dry_run || self.ctx.config.dry_run;
        let report = self.sender.send(args.campaign_id, dry_run).await?;
        Ok(json!({
            "success": report.success,
            "sending": report,
        }))
    }
}

pub struct RunDueRemindersTool {
    ctx: Context,
    scheduler: Scheduler,
}

impl RunDueRemindersTool {
    pub fn new(ctx: Context, scheduler: Scheduler) -> Self {
        Self { ctx, scheduler }
    }
}

#[derive(Debug, Deserialize)]
struct RunDueArgs {
    now: Option<String>,
}

#[async_trait]
impl Tool for RunDueRemindersTool {
    fn name(&self) -> &str {
        "run_due_reminders"
    }

    fn description(&self) -> &str {
        "Tally and broadcast every active campaign whose remind time has passed"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "run_due_reminders",
            "description": "Process all active campaigns with remind_at in the past: re-tally reactions, then broadcast, one campaign at a time. Intended to be invoked on an external schedule (e.g. cron).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "now": { "type": "string", "description": "Override the current time, RFC 3339 (mainly for testing)" }
                },
                "required": []
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.ctx.discord.ensure_connected().await?;
        let args: RunDueArgs = parse_args(arguments)?;
        let now = match args.now.as_deref() {
            Some(raw) => parse_datetime("now", raw)?,
            None => Utc::now(),
        };
        let outcomes = self.scheduler.run_due(now).await?;
        let successful = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - successful;
        Ok(json!({
            "success": true,
            "processing": {
                "current_time": now.to_rfc3339(),
                "due_campaigns": outcomes.len(),
                "successful": successful,
                "failed": failed,
                "outcomes": outcomes,
            },
        }))
    }
}
