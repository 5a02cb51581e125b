//! Dispatch a built reminder broadcast with pacing, bounded rate-limit
//! retries, and an audit row per invocation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::discord::DiscordApi;
use crate::error::ToolError;
use crate::store::{CampaignStatus, Store};
use crate::utils::truncate_str;

use super::{builder, require_campaign};

/// Engine-level floor between consecutive chunks of one broadcast. The
/// Discord layer additionally respects per-route rate limits.
const INTER_CHUNK_DELAY: Duration = Duration::from_secs(1);

/// Retries for a rate-limited chunk before the failure surfaces.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Backoff when Discord rate-limits without saying for how long.
const RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(5);

/// Longest error text persisted into the audit log.
const MAX_LOGGED_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub campaign_id: i64,
    pub chunks_sent: usize,
    pub chunk_count: usize,
    pub recipient_count: usize,
    pub success: bool,
    pub dry_run: bool,
    pub error: Option<String>,
}

pub struct Sender {
    store: Arc<Store>,
    discord: Arc<dyn DiscordApi>,
    inter_chunk_delay: Duration,
    rate_limit_fallback: Duration,
}

impl Sender {
    pub fn new(store: Arc<Store>, discord: Arc<dyn DiscordApi>) -> Self {
        Self {
            store,
            discord,
            inter_chunk_delay: INTER_CHUNK_DELAY,
            rate_limit_fallback: RATE_LIMIT_FALLBACK,
        }
    }

    #[cfg(test)]
    pub(crate) fn without_delays(mut self) -> Self {
        self.inter_chunk_delay = Duration::ZERO;
        self.rate_limit_fallback = Duration::ZERO;
        self
    }

    /// Send a campaign's reminder broadcast.
    ///
    /// Chunks go out strictly in order. A failure mid-broadcast stops the
    /// walk, logs how far it got, and leaves the campaign `active`; a later
    /// send restarts from chunk 0, so delivery is at-least-once. Exactly one
    /// audit row is written per invocation. With `dry_run` nothing reaches
    /// Discord, the audit row records the simulated chunk count, and the
    /// campaign status is left alone.
    pub async fn send(&self, campaign_id: i64, dry_run: bool) -> Result<SendReport, ToolError> {
        let campaign = require_campaign(&self.store, campaign_id).await?;
        let built = builder::build_reminder(&self.store, campaign_id, None).await?;
        let recipient_count = built.recipient_count;

        if built.chunks.is_empty() {
            self.store
                .append_reminder_log(campaign_id, Utc::now(), 0, 0, true, None)
                .await?;
            info!(campaign_id, "no opt-ins; nothing to broadcast");
            return Ok(SendReport {
                campaign_id,
                chunks_sent: 0,
                chunk_count: 0,
                recipient_count: 0,
                success: true,
                dry_run,
                error: None,
            });
        }

        let chunk_count = built.chunks.len();
        let mut sent = 0usize;
        for (i, chunk) in built.chunks.iter().enumerate() {
            if i > 0 && !dry_run {
                tokio::time::sleep(self.inter_chunk_delay).await;
            }
            if !dry_run {
                if let Err(e) = self.send_chunk(&campaign.channel_id, chunk).await {
                    let message = truncate_str(&e.to_string(), MAX_LOGGED_ERROR_CHARS);
                    warn!(
                        campaign_id,
                        chunk = i + 1,
                        chunk_count,
                        "broadcast stopped: {}",
                        message
                    );
                    self.store
                        .append_reminder_log(
                            campaign_id,
                            Utc::now(),
                            recipient_count as i64,
                            sent as i64,
                            false,
                            Some(&message),
                        )
                        .await?;
                    return Ok(SendReport {
                        campaign_id,
                        chunks_sent: sent,
                        chunk_count,
                        recipient_count,
                        success: false,
                        dry_run,
                        error: Some(message),
                    });
                }
            }
            sent += 1;
        }

        self.store
            .append_reminder_log(
                campaign_id,
                Utc::now(),
                recipient_count as i64,
                sent as i64,
                true,
                None,
            )
            .await?;
        if !dry_run {
            self.store
                .set_campaign_status(campaign_id, CampaignStatus::Completed)
                .await?;
        }
        info!(
            campaign_id,
            chunks = sent,
            recipients = recipient_count,
            dry_run,
            "reminder broadcast complete"
        );
        Ok(SendReport {
            campaign_id,
            chunks_sent: sent,
            chunk_count,
            recipient_count,
            success: true,
            dry_run,
            error: None,
        })
    }

    /// One chunk, retried through rate limits. Any other failure surfaces
    /// immediately; the caller decides what to do with the broadcast.
    async fn send_chunk(&self, channel_id: &str, content: &str) -> Result<(), ToolError> {
        let mut attempts = 0u32;
        loop {
            match self.discord.message_send(channel_id, content, None).await {
                Ok(_) => return Ok(()),
                Err(ToolError::RateLimited { retry_after_secs })
                    if attempts < MAX_RATE_LIMIT_RETRIES =>
                {
                    attempts += 1;
                    let wait = retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or(self.rate_limit_fallback);
                    warn!(
                        channel_id,
                        attempt = attempts,
                        wait_secs = wait.as_secs(),
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
