//! The campaign engine: durable lifecycle, reaction tally, reminder
//! building, rate-limited broadcast, and the due-campaign scheduler.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::discord::DiscordApi;
use crate::error::ToolError;
use crate::store::{Campaign, CampaignStatus, Store};

mod builder;
mod scheduler;
mod sender;
mod tally;

pub use builder::build_reminder;
pub use scheduler::Scheduler;
pub use sender::Sender;
pub use tally::tally;

/// Load a campaign or fail with `NotFound`.
pub(crate) async fn require_campaign(store: &Store, id: i64) -> Result<Campaign, ToolError> {
    store
        .get_campaign(id)
        .await?
        .ok_or_else(|| ToolError::NotFound(format!("campaign {} not found", id)))
}

/// Register a Discord message as a signup sheet for `emoji`.
///
/// The tracked message is resolved through the Discord layer first, so a
/// typo'd channel or message id fails here instead of at tally time. In
/// DRY-RUN the lookup answers from fixtures, which effectively skips the
/// check.
pub async fn create_campaign(
    store: &Store,
    discord: &dyn DiscordApi,
    title: Option<&str>,
    channel_id: &str,
    message_id: &str,
    emoji: &str,
    remind_at: DateTime<Utc>,
) -> Result<Campaign, ToolError> {
    discord.message_get(channel_id, message_id).await?;
    let campaign = store
        .create_campaign(title, channel_id, message_id, emoji, remind_at)
        .await?;
    info!(
        campaign_id = campaign.id,
        channel_id,
        message_id,
        emoji,
        remind_at = %remind_at,
        "campaign created"
    );
    Ok(campaign)
}

/// Manually move a campaign through the status machine. Only the
/// transitions active → completed/cancelled and cancelled → active are
/// legal; deletion goes through [`delete_campaign`].
pub async fn update_status(
    store: &Store,
    id: i64,
    next: CampaignStatus,
) -> Result<Campaign, ToolError> {
    let campaign = require_campaign(store, id).await?;
    if !campaign.status.can_transition_to(next) {
        return Err(ToolError::InvalidState(format!(
            "campaign {} cannot move from '{}' to '{}'",
            id,
            campaign.status.as_str(),
            next.as_str()
        )));
    }
    store.set_campaign_status(id, next).await?;
    info!(campaign_id = id, status = next.as_str(), "campaign status updated");
    require_campaign(store, id).await
}

/// Remove a campaign with its opt-ins and reminder logs.
pub async fn delete_campaign(store: &Store, id: i64) -> Result<(), ToolError> {
    if !store.delete_campaign(id).await? {
        return Err(ToolError::NotFound(format!("campaign {} not found", id)));
    }
    info!(campaign_id = id, "campaign deleted");
    Ok(())
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use crate::testing::{temp_store, MockDiscord};

    #[tokio::test]
    async fn update_status_rejects_illegal_transitions() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "✅", Utc::now())
            .await
            .unwrap();

        // active → completed, then completed is frozen.
        update_status(&store, campaign.id, CampaignStatus::Completed)
            .await
            .unwrap();
        let err = update_status(&store, campaign.id, CampaignStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cancelled_campaign_can_be_rearmed() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "✅", Utc::now())
            .await
            .unwrap();

        update_status(&store, campaign.id, CampaignStatus::Cancelled)
            .await
            .unwrap();
        let rearmed = update_status(&store, campaign.id, CampaignStatus::Active)
            .await
            .unwrap();
        assert_eq!(rearmed.status, CampaignStatus::Active);
    }

    #[tokio::test]
    async fn create_validates_message_through_discord() {
        let (store, _db) = temp_store().await;
        let mock = MockDiscord::new();
        mock.fail_message_get(ToolError::NotFound("message 2 not found".into()));

        let err = create_campaign(&store, mock.as_ref(), None, "1", "2", "✅", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert!(store.list_campaigns(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_campaign_is_not_found() {
        let (store, _db) = temp_store().await;
        let err = delete_campaign(&store, 999).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
