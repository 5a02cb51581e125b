//! Run due campaigns on an external tick.
//!
//! The process keeps no wall-clock timer of its own: due-ness is a pure
//! function of persistent state, so a crashed tick is simply retried by the
//! next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::discord::DiscordApi;
use crate::error::ToolError;
use crate::store::{Campaign, Store};

use super::sender::{SendReport, Sender};
use super::tally::{self, TallySummary};

/// Pause between consecutive campaigns within one tick; the system-wide
/// fan-out governor.
const INTER_CAMPAIGN_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct DueOutcome {
    pub campaign_id: i64,
    pub title: Option<String>,
    pub success: bool,
    pub tally: Option<TallySummary>,
    pub send: Option<SendReport>,
    pub error: Option<String>,
}

pub struct Scheduler {
    store: Arc<Store>,
    discord: Arc<dyn DiscordApi>,
    sender: Sender,
    inter_campaign_delay: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, discord: Arc<dyn DiscordApi>) -> Self {
        let sender = Sender::new(store.clone(), discord.clone());
        Self {
            store,
            discord,
            sender,
            inter_campaign_delay: INTER_CAMPAIGN_DELAY,
        }
    }

    #[cfg(test)]
    pub(crate) fn without_delays(mut self) -> Self {
        self.sender = Sender::new(self.store.clone(), self.discord.clone()).without_delays();
        self.inter_campaign_delay = Duration::ZERO;
        self
    }

    /// Process every active campaign whose remind time has passed, in
    /// remind_at order, strictly one at a time. Each campaign gets a fresh
    /// tally so late reactors are included, then a real (non-dry-run) send.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<DueOutcome>, ToolError> {
        let due = self.store.list_due(now).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }

        info!(count = due.len(), now = %now, "processing due campaigns");
        let mut outcomes = Vec::with_capacity(due.len());
        for (i, campaign) in due.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.inter_campaign_delay).await;
            }
            outcomes.push(self.process(campaign).await);
        }

        let failed = outcomes.iter().filter(|o| !o.success).count();
        info!(
            processed = outcomes.len(),
            failed, "due campaign processing complete"
        );
        Ok(outcomes)
    }

    async fn process(&self, campaign: &Campaign) -> DueOutcome {
        // A failed tally skips the send; the opt-ins already persisted wait
        // for the next tick rather than going out against a half-read
        // reaction set.
        let tally = match tally::tally(&self.store, self.discord.as_ref(), campaign.id).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(campaign_id = campaign.id, "tally failed: {}", e);
                return DueOutcome {
                    campaign_id: campaign.id,
                    title: campaign.title.clone(),
                    success: false,
                    tally: None,
                    send: None,
                    error: Some(e.to_string()),
                };
            }
        };

        match self.sender.send(campaign.id, false).await {
            Ok(report) => DueOutcome {
                campaign_id: campaign.id,
                title: campaign.title.clone(),
                success: report.success,
                error: report.error.clone(),
                tally: Some(tally),
                send: Some(report),
            },
            Err(e) => {
                warn!(campaign_id = campaign.id, "send failed: {}", e);
                DueOutcome {
                    campaign_id: campaign.id,
                    title: campaign.title.clone(),
                    success: false,
                    tally: Some(tally),
                    send: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
