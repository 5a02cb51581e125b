//! Serenity-backed Discord session.
//!
//! One lazily-established HTTP session per process. The guild allowlist is
//! enforced here, after resolving which guild an operation targets and
//! before any further Discord call. DRY-RUN short-circuits every write and
//! answers reads with deterministic fixtures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::CreateMessage;
use serenity::http::{GuildPagination, Http, HttpError};
use serenity::model::channel::{Channel, MessageReference, ReactionType};
use serenity::model::id::{ChannelId, EmojiId, GuildId, MessageId, UserId};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ToolError;

use super::{
    BotStatus, ChannelInfo, DiscordApi, GuildInfo, MessageAuthor, MessageInfo, ReactionInfo,
    ReactionUser,
};

/// Discord returns at most this many entries per reaction/guild page.
const PAGE_SIZE: u8 = 100;

#[derive(Clone)]
struct BotIdentity {
    id: String,
    name: String,
}

pub struct SerenityApi {
    config: Arc<Config>,
    http: RwLock<Option<Arc<Http>>>,
    bot: RwLock<Option<BotIdentity>>,
    /// Counter for synthetic DRY-RUN message ids.
    synthetic_ids: AtomicU64,
}

impl SerenityApi {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            http: RwLock::new(None),
            bot: RwLock::new(None),
            synthetic_ids: AtomicU64::new(1),
        }
    }

    async fn http(&self) -> Result<Arc<Http>, ToolError> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| ToolError::NotConnected("session not established".into()))
    }

    fn guild_allowed(&self, guild_id: &str) -> Result<(), ToolError> {
        if self.config.is_guild_allowed(guild_id) {
            Ok(())
        } else {
            Err(ToolError::Forbidden(format!(
                "guild {} is not in the allowlist",
                guild_id
            )))
        }
    }

    /// Fetch a channel and enforce the allowlist against its guild.
    /// Private channels carry no guild and pass through.
    async fn fetch_allowed_channel(&self, channel_id: &str) -> Result<Channel, ToolError> {
        let http = self.http().await?;
        let id = parse_snowflake("channel", channel_id)?;
        let channel = http
            .get_channel(ChannelId::new(id))
            .await
            .map_err(|e| map_discord_error("fetch channel", e))?;
        if let Channel::Guild(gc) = &channel {
            self.guild_allowed(&gc.guild_id.to_string())?;
        }
        Ok(channel)
    }
}

fn parse_snowflake(kind: &str, raw: &str) -> Result<u64, ToolError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| ToolError::InvalidArguments(format!("invalid {} id '{}'", kind, raw)))
}

/// Map a serenity failure onto the engine's error taxonomy.
fn map_discord_error(context: &str, e: serenity::Error) -> ToolError {
    match &e {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
            match resp.status_code.as_u16() {
                401 | 403 => ToolError::Forbidden(format!("{}: {}", context, resp.error.message)),
                404 => ToolError::NotFound(format!("{}: {}", context, resp.error.message)),
                429 => ToolError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => ToolError::Transient(format!("{}: {}", context, resp.error.message)),
                status => {
                    ToolError::Internal(format!("{}: HTTP {}: {}", context, status, resp.error.message))
                }
            }
        }
        serenity::Error::Http(_) => ToolError::Transient(format!("{}: {}", context, e)),
        _ => ToolError::Internal(format!("{}: {}", context, e)),
    }
}

/// Parse the campaign's stored emoji token into a serenity reaction type.
/// Accepts a bare Unicode emoji, `name:id`, or the `<:name:id>` /
/// `<a:name:id>` mention forms.
fn parse_reaction(emoji: &str) -> Result<ReactionType, ToolError> {
    let inner = emoji
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(emoji);
    let inner = inner
        .strip_prefix("a:")
        .or_else(|| inner.strip_prefix(':'))
        .unwrap_or(inner);

    match inner.rsplit_once(':') {
        Some((name, id)) if !name.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
            let id = id.parse::<u64>().map_err(|_| {
                ToolError::InvalidArguments(format!("invalid custom emoji '{}'", emoji))
            })?;
            Ok(ReactionType::Custom {
                animated: false,
                id: EmojiId::new(id),
                name: Some(name.to_string()),
            })
        }
        _ => Ok(ReactionType::Unicode(inner.to_string())),
    }
}

/// Canonical emoji token: the Unicode emoji itself, or `name:id` for custom
/// emoji. Campaigns store and compare this form byte-for-byte.
pub(crate) fn emoji_token(reaction: &ReactionType) -> String {
    match reaction {
        ReactionType::Unicode(s) => s.clone(),
        ReactionType::Custom { name, id, .. } => {
            format!("{}:{}", name.as_deref().unwrap_or(""), id)
        }
        other => other.to_string(),
    }
}

fn author_info(user: &serenity::model::user::User) -> MessageAuthor {
    MessageAuthor {
        id: user.id.to_string(),
        username: user.name.clone(),
        display_name: user
            .global_name
            .clone()
            .unwrap_or_else(|| user.name.clone()),
        is_bot: user.bot,
    }
}

fn message_info(message: &serenity::model::channel::Message) -> MessageInfo {
    MessageInfo {
        id: message.id.to_string(),
        channel_id: message.channel_id.to_string(),
        content: message.content.clone(),
        author: author_info(&message.author),
        timestamp: message.timestamp.to_string(),
        reactions: message
            .reactions
            .iter()
            .map(|r| ReactionInfo {
                emoji: emoji_token(&r.reaction_type),
                count: r.count,
            })
            .collect(),
    }
}

fn channel_info(channel: Channel) -> ChannelInfo {
    match channel {
        Channel::Guild(gc) => ChannelInfo {
            id: gc.id.to_string(),
            name: gc.name.clone(),
            kind: gc.kind.name().to_string(),
            guild_id: Some(gc.guild_id.to_string()),
            topic: gc.topic.clone(),
            nsfw: gc.nsfw,
            position: gc.position,
        },
        Channel::Private(pc) => ChannelInfo {
            id: pc.id.to_string(),
            name: pc.name(),
            kind: "private".to_string(),
            guild_id: None,
            topic: None,
            nsfw: false,
            position: 0,
        },
        other => ChannelInfo {
            id: other.id().to_string(),
            name: String::new(),
            kind: "unknown".to_string(),
            guild_id: None,
            topic: None,
            nsfw: false,
            position: 0,
        },
    }
}

// ---- DRY-RUN fixtures ----

fn fixture_guilds() -> Vec<GuildInfo> {
    vec![GuildInfo {
        id: "900000000000000001".to_string(),
        name: "Fixture Guild".to_string(),
    }]
}

fn fixture_channel(channel_id: &str) -> ChannelInfo {
    ChannelInfo {
        id: channel_id.to_string(),
        name: "fixture-channel".to_string(),
        kind: "text".to_string(),
        guild_id: Some("900000000000000001".to_string()),
        topic: Some("Deterministic dry-run channel".to_string()),
        nsfw: false,
        position: 0,
    }
}

fn fixture_message(channel_id: &str, message_id: &str) -> MessageInfo {
    MessageInfo {
        id: message_id.to_string(),
        channel_id: channel_id.to_string(),
        content: "Fixture message content".to_string(),
        author: MessageAuthor {
            id: "900000000000000100".to_string(),
            username: "fixture-author".to_string(),
            display_name: "Fixture Author".to_string(),
            is_bot: false,
        },
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        reactions: vec![ReactionInfo {
            emoji: "✅".to_string(),
            count: 3,
        }],
    }
}

fn fixture_reactors() -> Vec<ReactionUser> {
    vec![
        ReactionUser {
            id: "900000000000000201".to_string(),
            display_name: "Fixture One".to_string(),
            is_bot: false,
        },
        ReactionUser {
            id: "900000000000000202".to_string(),
            display_name: "Fixture Two".to_string(),
            is_bot: false,
        },
        ReactionUser {
            id: "900000000000000203".to_string(),
            display_name: "Fixture Bot".to_string(),
            is_bot: true,
        },
    ]
}

#[async_trait]
impl DiscordApi for SerenityApi {
    async fn ensure_connected(&self) -> Result<(), ToolError> {
        if self.config.dry_run {
            return Ok(());
        }
        if self.http.read().await.is_some() {
            return Ok(());
        }

        let http = Arc::new(Http::new(&self.config.discord_token));
        let user = http
            .get_current_user()
            .await
            .map_err(|e| ToolError::NotConnected(format!("authentication failed: {}", e)))?;
        info!(bot = %user.name, bot_id = %user.id, "Discord session established");

        *self.bot.write().await = Some(BotIdentity {
            id: user.id.to_string(),
            name: user.name.clone(),
        });
        *self.http.write().await = Some(http);
        Ok(())
    }

    async fn guild_list(&self) -> Result<Vec<GuildInfo>, ToolError> {
        if self.config.dry_run {
            return Ok(fixture_guilds());
        }
        let http = self.http().await?;

        let mut guilds = Vec::new();
        let mut after: Option<GuildId> = None;
        loop {
            let page = http
                .get_guilds(after.map(GuildPagination::After), Some(PAGE_SIZE as u64))
                .await
                .map_err(|e| map_discord_error("list guilds", e))?;
            let page_len = page.len();
            after = page.last().map(|g| g.id);
            for guild in page {
                let id = guild.id.to_string();
                if self.config.is_guild_allowed(&id) {
                    guilds.push(GuildInfo {
                        id,
                        name: guild.name,
                    });
                }
            }
            if page_len < PAGE_SIZE as usize {
                break;
            }
        }
        Ok(guilds)
    }

    async fn channel_list(
        &self,
        guild_id: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<ChannelInfo>, ToolError> {
        self.guild_allowed(guild_id)?;
        if self.config.dry_run {
            let channels = vec![fixture_channel("900000000000000010")];
            return Ok(channels
                .into_iter()
                .filter(|c| type_filter.map_or(true, |t| c.kind == t))
                .collect());
        }
        let http = self.http().await?;
        let id = parse_snowflake("guild", guild_id)?;
        let channels = http
            .get_channels(GuildId::new(id))
            .await
            .map_err(|e| map_discord_error("list channels", e))?;

        Ok(channels
            .into_iter()
            .map(|gc| channel_info(Channel::Guild(gc)))
            .filter(|c| type_filter.map_or(true, |t| c.kind == t))
            .collect())
    }

    async fn channel_get(&self, channel_id: &str) -> Result<ChannelInfo, ToolError> {
        if self.config.dry_run {
            return Ok(fixture_channel(channel_id));
        }
        let channel = self.fetch_allowed_channel(channel_id).await?;
        Ok(channel_info(channel))
    }

    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<MessageInfo>, ToolError> {
        let limit = limit.clamp(1, PAGE_SIZE);
        if self.config.dry_run {
            return Ok(vec![fixture_message(channel_id, "900000000000000300")]);
        }
        let channel = self.fetch_allowed_channel(channel_id).await?;
        let http = self.http().await?;
        let messages = http
            .get_messages(channel.id(), None, Some(limit))
            .await
            .map_err(|e| map_discord_error("fetch messages", e))?;
        Ok(messages.iter().map(message_info).collect())
    }

    async fn message_get(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageInfo, ToolError> {
        if self.config.dry_run {
            return Ok(fixture_message(channel_id, message_id));
        }
        let channel = self.fetch_allowed_channel(channel_id).await?;
        let http = self.http().await?;
        let id = parse_snowflake("message", message_id)?;
        let message = http
            .get_message(channel.id(), MessageId::new(id))
            .await
            .map_err(|e| map_discord_error("fetch message", e))?;
        Ok(message_info(&message))
    }

    async fn reaction_users(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Vec<ReactionUser>, ToolError> {
        if self.config.dry_run {
            return Ok(fixture_reactors());
        }
        let channel = self.fetch_allowed_channel(channel_id).await?;
        let http = self.http().await?;
        let msg_id = parse_snowflake("message", message_id)?;
        let reaction = parse_reaction(emoji)?;

        let mut users = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = http
                .get_reaction_users(
                    channel.id(),
                    MessageId::new(msg_id),
                    &reaction,
                    PAGE_SIZE,
                    after.map(u64::from),
                )
                .await
                .map_err(|e| map_discord_error("fetch reaction users", e))?;
            let page_len = page.len();
            after = page.last().map(|u| u.id);
            users.extend(page.iter().map(|user| ReactionUser {
                id: user.id.to_string(),
                display_name: user
                    .global_name
                    .clone()
                    .unwrap_or_else(|| user.name.clone()),
                is_bot: user.bot,
            }));
            if page_len < PAGE_SIZE as usize {
                break;
            }
        }
        debug!(channel_id, message_id, emoji, count = users.len(), "fetched reactors");
        Ok(users)
    }

    async fn message_send(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<String, ToolError> {
        if content.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "message content cannot be empty".into(),
            ));
        }
        if content.chars().count() > super::MAX_MESSAGE_CODEPOINTS {
            return Err(ToolError::InvalidArguments(
                "message content exceeds 2000 characters".into(),
            ));
        }

        if self.config.dry_run {
            let n = self.synthetic_ids.fetch_add(1, Ordering::Relaxed);
            info!(channel_id, "DRY_RUN: message not sent");
            return Ok(format!("dry-run-{}", n));
        }

        let channel = self.fetch_allowed_channel(channel_id).await?;
        let http = self.http().await?;

        let mut builder = CreateMessage::new().content(content);
        if let Some(reply_id) = reply_to {
            let id = parse_snowflake("message", reply_id)?;
            builder =
                builder.reference_message(MessageReference::from((channel.id(), MessageId::new(id))));
        }

        let sent = channel
            .id()
            .send_message(&http, builder)
            .await
            .map_err(|e| map_discord_error("send message", e))?;
        debug!(channel_id, message_id = %sent.id, "message sent");
        Ok(sent.id.to_string())
    }

    async fn bot_status(&self) -> Result<BotStatus, ToolError> {
        if self.config.dry_run {
            return Ok(BotStatus {
                connected: true,
                bot_user: Some("fixture-bot".to_string()),
                bot_id: Some("900000000000000000".to_string()),
                guild_count: fixture_guilds().len(),
                dry_run: true,
                guild_allowlist: self.config.guild_allowlist.clone(),
            });
        }

        let bot = self.bot.read().await.clone();
        let connected = self.http.read().await.is_some();
        let guild_count = if connected {
            match self.guild_list().await {
                Ok(guilds) => guilds.len(),
                Err(e) => {
                    warn!("guild count unavailable: {}", e);
                    0
                }
            }
        } else {
            0
        };

        Ok(BotStatus {
            connected,
            bot_user: bot.as_ref().map(|b| b.name.clone()),
            bot_id: bot.as_ref().map(|b| b.id.clone()),
            guild_count,
            dry_run: false,
            guild_allowlist: self.config.guild_allowlist.clone(),
        })
    }
}
