use super::*;
use chrono::Duration;

async fn setup_test_store() -> (Store, tempfile::NamedTempFile) {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let store = Store::open(db_file.path().to_str().unwrap()).await.unwrap();
    (store, db_file)
}

async fn make_campaign(store: &Store, message_id: &str, remind_at: DateTime<Utc>) -> Campaign {
    store
        .create_campaign(Some("Game night"), "100", message_id, "✅", remind_at)
        .await
        .unwrap()
}

#[tokio::test]
async fn create_and_get_campaign_roundtrip() {
    let (store, _db) = setup_test_store().await;
    let remind_at = Utc::now() + Duration::hours(2);

    let created = make_campaign(&store, "200", remind_at).await;
    assert_eq!(created.title.as_deref(), Some("Game night"));
    assert_eq!(created.status, CampaignStatus::Active);
    assert_eq!(created.emoji, "✅");

    let fetched = store.get_campaign(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.channel_id, "100");
    assert_eq!(fetched.message_id, "200");
    assert_eq!(fetched.remind_at.timestamp(), remind_at.timestamp());
}

#[tokio::test]
async fn duplicate_triple_returns_existing_id() {
    let (store, _db) = setup_test_store().await;
    let remind_at = Utc::now() + Duration::hours(1);

    let first = make_campaign(&store, "200", remind_at).await;
    let err = store
        .create_campaign(None, "100", "200", "✅", remind_at)
        .await
        .unwrap_err();
    assert_eq!(err, ToolError::Duplicate { existing_id: first.id });

    // Only one row exists for the triple.
    let all = store.list_campaigns(None).await.unwrap();
    assert_eq!(all.len(), 1);

    // A different emoji on the same message is a different campaign.
    store
        .create_campaign(None, "100", "200", "🎉", remind_at)
        .await
        .unwrap();
}

#[tokio::test]
async fn optin_upsert_is_idempotent() {
    let (store, _db) = setup_test_store().await;
    let campaign = make_campaign(&store, "200", Utc::now()).await;

    let first = store
        .upsert_optin(campaign.id, "u1", Some("Alice"))
        .await
        .unwrap();
    assert_eq!(first, UpsertOutcome::Inserted);

    // Re-upserting with a different username neither duplicates nor
    // refreshes the stored name.
    let second = store
        .upsert_optin(campaign.id, "u1", Some("Alice Renamed"))
        .await
        .unwrap();
    assert_eq!(second, UpsertOutcome::Existing);

    assert_eq!(store.count_optins(campaign.id).await.unwrap(), 1);
    let optins = store.list_optins(campaign.id).await.unwrap();
    assert_eq!(optins[0].username.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn list_optins_preserves_insertion_order() {
    let (store, _db) = setup_test_store().await;
    let campaign = make_campaign(&store, "200", Utc::now()).await;

    // Insert out of user-id order on purpose.
    for user in ["30", "10", "20"] {
        store.upsert_optin(campaign.id, user, None).await.unwrap();
    }

    let in_order: Vec<_> = store
        .list_optins(campaign.id)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.user_id)
        .collect();
    assert_eq!(in_order, vec!["30", "10", "20"]);
}

#[tokio::test]
async fn optin_pagination_by_user_id() {
    let (store, _db) = setup_test_store().await;
    let campaign = make_campaign(&store, "200", Utc::now()).await;
    for user in ["a", "b", "c", "d"] {
        store.upsert_optin(campaign.id, user, None).await.unwrap();
    }

    let page1 = store.list_optins_page(campaign.id, 2, None).await.unwrap();
    assert_eq!(page1.len(), 2);
    assert_eq!(page1[0].user_id, "a");

    let page2 = store
        .list_optins_page(campaign.id, 2, Some(&page1[1].user_id))
        .await
        .unwrap();
    let users: Vec<_> = page2.iter().map(|o| o.user_id.as_str()).collect();
    assert_eq!(users, vec!["c", "d"]);
}

#[tokio::test]
async fn delete_cascades_to_optins_and_logs() {
    let (store, _db) = setup_test_store().await;
    let campaign = make_campaign(&store, "200", Utc::now()).await;
    store.upsert_optin(campaign.id, "u1", None).await.unwrap();
    store
        .append_reminder_log(campaign.id, Utc::now(), 1, 1, true, None)
        .await
        .unwrap();

    assert!(store.delete_campaign(campaign.id).await.unwrap());

    assert!(store.get_campaign(campaign.id).await.unwrap().is_none());
    assert_eq!(store.count_optins(campaign.id).await.unwrap(), 0);
    assert!(store.reminder_logs(campaign.id).await.unwrap().is_empty());

    // The triple is free again after deletion.
    make_campaign(&store, "200", Utc::now()).await;
}

#[tokio::test]
async fn list_due_filters_on_status_and_time() {
    let (store, _db) = setup_test_store().await;
    let now = Utc::now();

    let past_b = make_campaign(&store, "b", now - Duration::minutes(5)).await;
    let past_a = make_campaign(&store, "a", now - Duration::hours(1)).await;
    let future = make_campaign(&store, "c", now + Duration::hours(1)).await;
    let done = make_campaign(&store, "d", now - Duration::hours(2)).await;
    store
        .set_campaign_status(done.id, CampaignStatus::Completed)
        .await
        .unwrap();

    let due = store.list_due(now).await.unwrap();
    let ids: Vec<_> = due.iter().map(|c| c.id).collect();
    // Oldest remind_at first; future and completed campaigns excluded.
    assert_eq!(ids, vec![past_a.id, past_b.id]);
    assert!(!ids.contains(&future.id));
}

#[tokio::test]
async fn list_campaigns_filters_by_status() {
    let (store, _db) = setup_test_store().await;
    let a = make_campaign(&store, "a", Utc::now()).await;
    let b = make_campaign(&store, "b", Utc::now()).await;
    store
        .set_campaign_status(b.id, CampaignStatus::Cancelled)
        .await
        .unwrap();

    let active = store
        .list_campaigns(Some(CampaignStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, a.id);

    let all = store.list_campaigns(None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn reminder_log_records_failures_verbatim() {
    let (store, _db) = setup_test_store().await;
    let campaign = make_campaign(&store, "200", Utc::now()).await;

    store
        .append_reminder_log(campaign.id, Utc::now(), 5, 2, false, Some("boom"))
        .await
        .unwrap();
    store
        .append_reminder_log(campaign.id, Utc::now(), 5, 3, true, None)
        .await
        .unwrap();

    let logs = store.reminder_logs(campaign.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    // Newest first.
    assert!(logs[0].success);
    assert_eq!(logs[0].message_chunks, 3);
    assert!(!logs[1].success);
    assert_eq!(logs[1].error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn status_transition_table() {
    use CampaignStatus::*;
    assert!(Active.can_transition_to(Completed));
    assert!(Active.can_transition_to(Cancelled));
    assert!(Cancelled.can_transition_to(Active));
    assert!(!Completed.can_transition_to(Active));
    assert!(!Completed.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Completed));
    assert!(!Active.can_transition_to(Active));
}
