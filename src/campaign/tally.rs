//! Reconcile current Discord reactions into the opt-in set.

use serde::Serialize;
use tracing::info;

use crate::discord::DiscordApi;
use crate::error::ToolError;
use crate::store::{Store, UpsertOutcome};

use super::require_campaign;

#[derive(Debug, Clone, Serialize)]
pub struct TallySummary {
    pub campaign_id: i64,
    pub total: u64,
    pub new_optins: u64,
    pub existing_optins: u64,
}

/// Fetch everyone who reacted with the campaign's tracked emoji and record
/// each non-bot user exactly once.
///
/// Idempotent: the (campaign, user) unique constraint absorbs repeats, so a
/// second run with unchanged reactions reports `new_optins = 0`. Usernames
/// captured on first sight are never refreshed.
pub async fn tally(
    store: &Store,
    discord: &dyn DiscordApi,
    campaign_id: i64,
) -> Result<TallySummary, ToolError> {
    let campaign = require_campaign(store, campaign_id).await?;

    let message = discord
        .message_get(&campaign.channel_id, &campaign.message_id)
        .await?;

    // Emoji tokens compare byte-for-byte: Unicode emoji as Discord reports
    // them, custom emoji as name:id. No reaction with the tracked token
    // means nobody to iterate.
    if !message.reactions.iter().any(|r| r.emoji == campaign.emoji) {
        info!(campaign_id, emoji = %campaign.emoji, "no reactions with tracked emoji");
        return Ok(TallySummary {
            campaign_id,
            total: 0,
            new_optins: 0,
            existing_optins: 0,
        });
    }

    let reactors = discord
        .reaction_users(&campaign.channel_id, &campaign.message_id, &campaign.emoji)
        .await?;

    let mut new_optins = 0u64;
    let mut existing_optins = 0u64;
    for user in reactors.iter().filter(|u| !u.is_bot) {
        match store
            .upsert_optin(campaign_id, &user.id, Some(&user.display_name))
            .await?
        {
            UpsertOutcome::Inserted => new_optins += 1,
            UpsertOutcome::Existing => existing_optins += 1,
        }
    }

    info!(
        campaign_id,
        new_optins, existing_optins, "tally complete"
    );
    Ok(TallySummary {
        campaign_id,
        total: new_optins + existing_optins,
        new_optins,
        existing_optins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{temp_store, MockDiscord};
    use chrono::Utc;

    #[tokio::test]
    async fn tally_records_non_bot_reactors_once() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "✅", Utc::now())
            .await
            .unwrap();
        let mock = MockDiscord::with_reactors(
            "✅",
            &[
                ("u1", "Alice", false),
                ("u2", "Bob", false),
                ("u3", "Beep", true),
            ],
        );

        let first = tally(&store, mock.as_ref(), campaign.id).await.unwrap();
        assert_eq!(first.new_optins, 2);
        assert_eq!(first.existing_optins, 0);
        assert_eq!(first.total, 2);
        // The bot never lands in the store.
        assert_eq!(store.count_optins(campaign.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn tally_is_idempotent() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "✅", Utc::now())
            .await
            .unwrap();
        let mock = MockDiscord::with_reactors("✅", &[("u1", "Alice", false), ("u2", "Bob", false)]);

        tally(&store, mock.as_ref(), campaign.id).await.unwrap();
        let second = tally(&store, mock.as_ref(), campaign.id).await.unwrap();

        assert_eq!(second.new_optins, 0);
        assert_eq!(second.existing_optins, 2);
        assert_eq!(second.total, 2);
        assert_eq!(store.count_optins(campaign.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn late_reactors_are_picked_up_by_a_second_tally() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "✅", Utc::now())
            .await
            .unwrap();
        let mock = MockDiscord::with_reactors("✅", &[("u1", "Alice", false)]);

        tally(&store, mock.as_ref(), campaign.id).await.unwrap();
        mock.add_reactor("u2", "Bob", false);
        let second = tally(&store, mock.as_ref(), campaign.id).await.unwrap();

        assert_eq!(second.new_optins, 1);
        assert_eq!(second.existing_optins, 1);
    }

    #[tokio::test]
    async fn absent_emoji_tallies_to_zero() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "🎉", Utc::now())
            .await
            .unwrap();
        // Reactions exist, but only for a different emoji.
        let mock = MockDiscord::with_reactors("✅", &[("u1", "Alice", false)]);

        let summary = tally(&store, mock.as_ref(), campaign.id).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(store.count_optins(campaign.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_campaign_is_not_found() {
        let (store, _db) = temp_store().await;
        let mock = MockDiscord::new();
        let err = tally(&store, mock.as_ref(), 42).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
