//! Discord access layer: the narrow surface the campaign engine consumes,
//! behind a trait so tests can script Discord behavior.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ToolError;

mod serenity_api;

pub use serenity_api::SerenityApi;

/// Discord's per-message ceiling, counted in Unicode code points.
pub const MAX_MESSAGE_CODEPOINTS: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct GuildInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub guild_id: Option<String>,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub position: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageAuthor {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionInfo {
    /// Emoji exactly as Discord reports it: the Unicode emoji itself, or
    /// `name:id` for custom emoji.
    pub emoji: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageInfo {
    pub id: String,
    pub channel_id: String,
    pub content: String,
    pub author: MessageAuthor,
    pub timestamp: String,
    pub reactions: Vec<ReactionInfo>,
}

/// A user who reacted with the tracked emoji.
#[derive(Debug, Clone, Serialize)]
pub struct ReactionUser {
    pub id: String,
    pub display_name: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub connected: bool,
    pub bot_user: Option<String>,
    pub bot_id: Option<String>,
    pub guild_count: usize,
    pub dry_run: bool,
    pub guild_allowlist: Vec<String>,
}

/// Operations the engine needs from Discord. Implementations enforce the
/// guild allowlist before touching Discord and honor DRY-RUN.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    /// Idempotent; establishes the authenticated session. Every tool
    /// handler calls this before doing anything else.
    async fn ensure_connected(&self) -> Result<(), ToolError>;

    /// Guilds the bot is a member of, filtered to the allowlist.
    async fn guild_list(&self) -> Result<Vec<GuildInfo>, ToolError>;

    /// Channels in a guild, optionally filtered by channel type name.
    async fn channel_list(
        &self,
        guild_id: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<ChannelInfo>, ToolError>;

    async fn channel_get(&self, channel_id: &str) -> Result<ChannelInfo, ToolError>;

    /// Most recent messages in a channel, newest first, up to `limit`.
    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<MessageInfo>, ToolError>;

    async fn message_get(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageInfo, ToolError>;

    /// Every user who reacted with `emoji`, walked to exhaustion through
    /// Discord's pagination. The result is finite and re-traversable.
    async fn reaction_users(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Vec<ReactionUser>, ToolError>;

    /// Send a message, returning its id. In DRY-RUN this is a no-op that
    /// returns a synthetic id.
    async fn message_send(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<String, ToolError>;

    async fn bot_status(&self) -> Result<BotStatus, ToolError>;
}
