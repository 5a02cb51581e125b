//! Shared test fixtures: a temp-file store and a scriptable Discord mock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::discord::{
    BotStatus, ChannelInfo, DiscordApi, GuildInfo, MessageAuthor, MessageInfo, ReactionInfo,
    ReactionUser,
};
use crate::error::ToolError;
use crate::store::Store;

pub async fn temp_store() -> (Store, tempfile::NamedTempFile) {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let store = Store::open(db_file.path().to_str().unwrap()).await.unwrap();
    (store, db_file)
}

#[derive(Default)]
struct MockState {
    emoji: String,
    reactors: Vec<ReactionUser>,
    send_plan: VecDeque<Result<(), ToolError>>,
    sent: Vec<(String, String)>,
    fail_message_get: Option<ToolError>,
    fail_message_get_for: HashMap<String, ToolError>,
}

/// In-memory Discord double. Reaction state and send outcomes are scripted
/// per test; successful sends are recorded in order.
pub struct MockDiscord {
    state: Mutex<MockState>,
    send_counter: AtomicU64,
}

impl MockDiscord {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
            send_counter: AtomicU64::new(1),
        })
    }

    /// A mock whose tracked message carries `emoji` reactions from the given
    /// `(user_id, display_name, is_bot)` triples.
    pub fn with_reactors(emoji: &str, users: &[(&str, &str, bool)]) -> Arc<Self> {
        let mock = Self::new();
        {
            let mut state = mock.state.lock().unwrap();
            state.emoji = emoji.to_string();
            state.reactors = users
                .iter()
                .map(|(id, name, bot)| ReactionUser {
                    id: id.to_string(),
                    display_name: name.to_string(),
                    is_bot: *bot,
                })
                .collect();
        }
        mock
    }

    pub fn add_reactor(&self, id: &str, name: &str, is_bot: bool) {
        self.state.lock().unwrap().reactors.push(ReactionUser {
            id: id.to_string(),
            display_name: name.to_string(),
            is_bot,
        });
    }

    /// Outcomes consumed front-to-back by `message_send`; once drained,
    /// sends succeed.
    pub fn plan_send_results(&self, plan: Vec<Result<(), ToolError>>) {
        self.state.lock().unwrap().send_plan = plan.into();
    }

    pub fn fail_message_get(&self, err: ToolError) {
        self.state.lock().unwrap().fail_message_get = Some(err);
    }

    pub fn fail_message_get_for(&self, message_id: &str, err: ToolError) {
        self.state
            .lock()
            .unwrap()
            .fail_message_get_for
            .insert(message_id.to_string(), err);
    }

    /// Every successful send as (channel_id, content), in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl DiscordApi for MockDiscord {
    async fn ensure_connected(&self) -> Result<(), ToolError> {
        Ok(())
    }

    async fn guild_list(&self) -> Result<Vec<GuildInfo>, ToolError> {
        Ok(vec![GuildInfo {
            id: "g1".to_string(),
            name: "Mock Guild".to_string(),
        }])
    }

    async fn channel_list(
        &self,
        guild_id: &str,
        _type_filter: Option<&str>,
    ) -> Result<Vec<ChannelInfo>, ToolError> {
        Ok(vec![ChannelInfo {
            id: "c1".to_string(),
            name: "general".to_string(),
            kind: "text".to_string(),
            guild_id: Some(guild_id.to_string()),
            topic: None,
            nsfw: false,
            position: 0,
        }])
    }

    async fn channel_get(&self, channel_id: &str) -> Result<ChannelInfo, ToolError> {
        Ok(ChannelInfo {
            id: channel_id.to_string(),
            name: "general".to_string(),
            kind: "text".to_string(),
            guild_id: Some("g1".to_string()),
            topic: None,
            nsfw: false,
            position: 0,
        })
    }

    async fn recent_messages(
        &self,
        channel_id: &str,
        _limit: u8,
    ) -> Result<Vec<MessageInfo>, ToolError> {
        self.message_get(channel_id, "m1").await.map(|m| vec![m])
    }

    async fn message_get(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageInfo, ToolError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.fail_message_get {
            return Err(err.clone());
        }
        if let Some(err) = state.fail_message_get_for.get(message_id) {
            return Err(err.clone());
        }
        let reactions = if state.reactors.is_empty() {
            Vec::new()
        } else {
            vec![ReactionInfo {
                emoji: state.emoji.clone(),
                count: state.reactors.len() as u64,
            }]
        };
        Ok(MessageInfo {
            id: message_id.to_string(),
            channel_id: channel_id.to_string(),
            content: "signup sheet".to_string(),
            author: MessageAuthor {
                id: "author".to_string(),
                username: "author".to_string(),
                display_name: "Author".to_string(),
                is_bot: false,
            },
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            reactions,
        })
    }

    async fn reaction_users(
        &self,
        _channel_id: &str,
        _message_id: &str,
        emoji: &str,
    ) -> Result<Vec<ReactionUser>, ToolError> {
        let state = self.state.lock().unwrap();
        if emoji == state.emoji {
            Ok(state.reactors.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn message_send(
        &self,
        channel_id: &str,
        content: &str,
        _reply_to: Option<&str>,
    ) -> Result<String, ToolError> {
        let mut state = self.state.lock().unwrap();
        if let Some(outcome) = state.send_plan.pop_front() {
            outcome?;
        }
        state
            .sent
            .push((channel_id.to_string(), content.to_string()));
        let n = self.send_counter.fetch_add(1, Ordering::Relaxed);
        Ok(format!("mock-{}", n))
    }

    async fn bot_status(&self) -> Result<BotStatus, ToolError> {
        Ok(BotStatus {
            connected: true,
            bot_user: Some("mock-bot".to_string()),
            bot_id: Some("b1".to_string()),
            guild_count: 1,
            dry_run: false,
            guild_allowlist: Vec::new(),
        })
    }
}
