//! Durable state for the campaign engine: campaigns, opt-ins, and the
//! reminder audit log, backed by a single SQLite file.
//!
//! The store is the only owner of rows. Every tally and every reminder build
//! re-queries it; no in-memory cache of opt-ins is authoritative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::ToolError;

mod migrations;

#[cfg(test)]
mod tests;

/// Campaign lifecycle states. `deleted` is modeled as a hard row-delete (the
/// cascade removes opt-ins and logs), so it never appears as a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CampaignStatus::Active),
            "completed" => Some(CampaignStatus::Completed),
            "cancelled" => Some(CampaignStatus::Cancelled),
            _ => None,
        }
    }

    /// Legal manual transitions: active → completed/cancelled, and
    /// cancelled → active (re-arm). Everything else is rejected; rows leave
    /// `completed` only through deletion.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        matches!(
            (self, next),
            (CampaignStatus::Active, CampaignStatus::Completed)
                | (CampaignStatus::Active, CampaignStatus::Cancelled)
                | (CampaignStatus::Cancelled, CampaignStatus::Active)
        )
    }
}

/// A reminder campaign keyed by a Discord message and an emoji.
#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: i64,
    pub title: Option<String>,
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
    pub remind_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: CampaignStatus,
}

/// One user's recorded participation in one campaign. Inserted by the tally
/// engine, never updated, removed only by campaign-delete cascade.
#[derive(Debug, Clone, Serialize)]
pub struct OptIn {
    pub id: i64,
    pub campaign_id: i64,
    pub user_id: String,
    pub username: Option<String>,
    pub tallied_at: DateTime<Utc>,
}

/// Audit entry for one broadcast attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderLog {
    pub id: i64,
    pub campaign_id: i64,
    pub sent_at: DateTime<Utc>,
    pub recipient_count: i64,
    pub message_chunks: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Outcome of an opt-in upsert under the (campaign, user) unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Existing,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ToolError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ToolError::Internal(format!("corrupt timestamp '{}': {}", raw, e)))
}

fn campaign_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Campaign, ToolError> {
    let status_raw: String = row.get("status");
    let status = CampaignStatus::parse(&status_raw)
        .ok_or_else(|| ToolError::Internal(format!("corrupt campaign status '{}'", status_raw)))?;
    Ok(Campaign {
        id: row.get("id"),
        title: row.get("title"),
        channel_id: row.get("channel_id"),
        message_id: row.get("message_id"),
        emoji: row.get("emoji"),
        remind_at: parse_timestamp(&row.get::<String, _>("remind_at"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        status,
    })
}

fn optin_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OptIn, ToolError> {
    Ok(OptIn {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        tallied_at: parse_timestamp(&row.get::<String, _>("tallied_at"))?,
    })
}

impl Store {
    /// Open (creating if missing) the database at `path` and apply
    /// migrations. WAL mode for concurrent readers, foreign keys on so
    /// campaign deletion cascades.
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        migrations::migrate(&pool).await?;
        info!(path, "campaign store open");
        Ok(Self { pool })
    }

    // ---- campaigns ----

    /// Insert a new campaign in `active` status. A collision on the
    /// (channel, message, emoji) unique constraint is reported as
    /// `Duplicate` carrying the existing campaign's id.
    pub async fn create_campaign(
        &self,
        title: Option<&str>,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
        remind_at: DateTime<Utc>,
    ) -> Result<Campaign, ToolError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO campaigns (title, channel_id, message_id, emoji, remind_at, created_at, status)
             VALUES (?, ?, ?, ?, ?, ?, 'active')",
        )
        .bind(title)
        .bind(channel_id)
        .bind(message_id)
        .bind(emoji)
        .bind(remind_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                debug!(campaign_id = id, channel_id, message_id, emoji, "campaign created");
                self.get_campaign(id)
                    .await?
                    .ok_or_else(|| ToolError::Internal("campaign vanished after insert".into()))
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing_id: i64 = sqlx::query_scalar(
                    "SELECT id FROM campaigns WHERE channel_id = ? AND message_id = ? AND emoji = ?",
                )
                .bind(channel_id)
                .bind(message_id)
                .bind(emoji)
                .fetch_one(&self.pool)
                .await?;
                Err(ToolError::Duplicate { existing_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>, ToolError> {
        let row = sqlx::query(
            "SELECT id, title, channel_id, message_id, emoji, remind_at, created_at, status
             FROM campaigns WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(campaign_from_row).transpose()
    }

    pub async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, ToolError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT id, title, channel_id, message_id, emoji, remind_at, created_at, status
                     FROM campaigns WHERE status = ? ORDER BY remind_at ASC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, title, channel_id, message_id, emoji, remind_at, created_at, status
                     FROM campaigns ORDER BY remind_at ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(campaign_from_row).collect()
    }

    /// Unconditionally set a campaign's status. Transition legality is the
    /// lifecycle layer's concern; the store just records.
    pub async fn set_campaign_status(
        &self,
        id: i64,
        status: CampaignStatus,
    ) -> Result<bool, ToolError> {
        let done = sqlx::query("UPDATE campaigns SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Hard-delete a campaign. Opt-ins and reminder logs go with it via
    /// `ON DELETE CASCADE`.
    pub async fn delete_campaign(&self, id: i64) -> Result<bool, ToolError> {
        let done = sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Active campaigns whose remind time has passed, oldest first.
    ///
    /// RFC 3339 strings with a fixed +00:00 offset compare correctly as
    /// text, so the filter runs in SQL against the remind_at index.
    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, ToolError> {
        let rows = sqlx::query(
            "SELECT id, title, channel_id, message_id, emoji, remind_at, created_at, status
             FROM campaigns
             WHERE status = 'active' AND remind_at <= ?
             ORDER BY remind_at ASC",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(campaign_from_row).collect()
    }

    // ---- opt-ins ----

    /// Record a participant. Idempotent under the (campaign, user) unique
    /// constraint; an existing row is left untouched, stale username and
    /// all.
    pub async fn upsert_optin(
        &self,
        campaign_id: i64,
        user_id: &str,
        username: Option<&str>,
    ) -> Result<UpsertOutcome, ToolError> {
        let done = sqlx::query(
            "INSERT INTO opt_ins (campaign_id, user_id, username, tallied_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(campaign_id, user_id) DO NOTHING",
        )
        .bind(campaign_id)
        .bind(user_id)
        .bind(username)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if done.rows_affected() > 0 {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Existing)
        }
    }

    /// All opt-ins for a campaign in insertion order. The reminder builder
    /// depends on this ordering to keep mention order stable across builds.
    pub async fn list_optins(&self, campaign_id: i64) -> Result<Vec<OptIn>, ToolError> {
        let rows = sqlx::query(
            "SELECT id, campaign_id, user_id, username, tallied_at
             FROM opt_ins WHERE campaign_id = ? ORDER BY id ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(optin_from_row).collect()
    }

    /// Keyset-paginated opt-in listing ordered by user id, for the listing
    /// tool. `after_user_id` resumes past the given user.
    pub async fn list_optins_page(
        &self,
        campaign_id: i64,
        limit: i64,
        after_user_id: Option<&str>,
    ) -> Result<Vec<OptIn>, ToolError> {
        let rows = match after_user_id {
            Some(after) => {
                sqlx::query(
                    "SELECT id, campaign_id, user_id, username, tallied_at
                     FROM opt_ins WHERE campaign_id = ? AND user_id > ?
                     ORDER BY user_id ASC LIMIT ?",
                )
                .bind(campaign_id)
                .bind(after)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, campaign_id, user_id, username, tallied_at
                     FROM opt_ins WHERE campaign_id = ?
                     ORDER BY user_id ASC LIMIT ?",
                )
                .bind(campaign_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(optin_from_row).collect()
    }

    pub async fn count_optins(&self, campaign_id: i64) -> Result<i64, ToolError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM opt_ins WHERE campaign_id = ?")
            .bind(campaign_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ---- reminder logs ----

    pub async fn append_reminder_log(
        &self,
        campaign_id: i64,
        sent_at: DateTime<Utc>,
        recipient_count: i64,
        message_chunks: i64,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<i64, ToolError> {
        let done = sqlx::query(
            "INSERT INTO reminder_logs
                 (campaign_id, sent_at, recipient_count, message_chunks, success, error_message)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(campaign_id)
        .bind(sent_at.to_rfc3339())
        .bind(recipient_count)
        .bind(message_chunks)
        .bind(success as i32)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(done.last_insert_rowid())
    }

    /// Broadcast history for a campaign, newest first.
    pub async fn reminder_logs(&self, campaign_id: i64) -> Result<Vec<ReminderLog>, ToolError> {
        let rows = sqlx::query(
            "SELECT id, campaign_id, sent_at, recipient_count, message_chunks, success, error_message
             FROM reminder_logs WHERE campaign_id = ? ORDER BY sent_at DESC, id DESC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ReminderLog {
                    id: row.get("id"),
                    campaign_id: row.get("campaign_id"),
                    sent_at: parse_timestamp(&row.get::<String, _>("sent_at"))?,
                    recipient_count: row.get("recipient_count"),
                    message_chunks: row.get("message_chunks"),
                    success: row.get::<i32, _>("success") != 0,
                    error_message: row.get("error_message"),
                })
            })
            .collect()
    }
}
