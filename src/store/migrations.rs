use sqlx::SqlitePool;
use tracing::info;

/// Schema migrations for the campaign store, applied on every open.
///
/// Each statement is idempotent (`IF NOT EXISTS`) so re-running against an
/// existing database is safe.
pub(crate) async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            channel_id TEXT NOT NULL,
            message_id TEXT NOT NULL,
            emoji TEXT NOT NULL,
            remind_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            UNIQUE(channel_id, message_id, emoji)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS opt_ins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            campaign_id INTEGER NOT NULL
                REFERENCES campaigns(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            username TEXT,
            tallied_at TEXT NOT NULL,
            UNIQUE(campaign_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reminder_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            campaign_id INTEGER NOT NULL
                REFERENCES campaigns(id) ON DELETE CASCADE,
            sent_at TEXT NOT NULL,
            recipient_count INTEGER NOT NULL,
            message_chunks INTEGER NOT NULL,
            success INTEGER NOT NULL,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Status and due-time lookups drive the scheduler; the opt-in indexes
    // drive chunk building and keyset pagination.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_campaigns_remind_at ON campaigns(remind_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_opt_ins_campaign ON opt_ins(campaign_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_opt_ins_user ON opt_ins(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reminder_logs_campaign ON reminder_logs(campaign_id)")
        .execute(pool)
        .await?;

    info!("campaign store migrations complete");
    Ok(())
}
