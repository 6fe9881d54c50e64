use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::alerts::{
    DatasetSnapshot, SnapshotStore, SubscriptionKind, SubscriptionSource, ThemeSnapshot,
};

/// A bot user
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub language_code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A user following a theme, dataset or keyword
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub kind: SubscriptionKind,
    /// Theme name, dataset id or keyword
    pub target: String,
    /// Human-readable label shown in listings
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A dataset saved by a user
#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub id: i64,
    pub user_id: i64,
    pub dataset_id: String,
    pub dataset_title: String,
    pub created_at: DateTime<Utc>,
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT UNIQUE NOT NULL,
            username VARCHAR(255),
            language_code VARCHAR(10) NOT NULL DEFAULT 'es',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            subscription_type VARCHAR(20) NOT NULL,
            subscription_id VARCHAR(255) NOT NULL,
            subscription_name VARCHAR(500) NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT unique_user_subscription UNIQUE (user_id, subscription_type, subscription_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create subscriptions table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS subscriptions_target_idx
         ON subscriptions (subscription_type, subscription_id) WHERE is_active",
    )
    .execute(pool)
    .await
    .context("Failed to create subscriptions index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bookmarks (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            dataset_id VARCHAR(255) NOT NULL,
            dataset_title VARCHAR(500) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT unique_user_bookmark UNIQUE (user_id, dataset_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create bookmarks table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS dataset_snapshots (
            id BIGSERIAL PRIMARY KEY,
            dataset_id VARCHAR(255) NOT NULL,
            modified VARCHAR(50) NOT NULL,
            data_processed VARCHAR(50) NOT NULL,
            metadata_processed VARCHAR(50) NOT NULL,
            records_count BIGINT NOT NULL DEFAULT 0,
            themes TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create dataset_snapshots table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS dataset_snapshots_latest_idx
         ON dataset_snapshots (dataset_id, created_at DESC, id DESC)",
    )
    .execute(pool)
    .await
    .context("Failed to create dataset_snapshots index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS theme_snapshots (
            id BIGSERIAL PRIMARY KEY,
            theme_name VARCHAR(255) NOT NULL,
            dataset_ids TEXT NOT NULL,
            dataset_count BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create theme_snapshots table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS theme_snapshots_latest_idx
         ON theme_snapshots (theme_name, created_at DESC, id DESC)",
    )
    .execute(pool)
    .await
    .context("Failed to create theme_snapshots index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        telegram_id: row.try_get("telegram_id")?,
        username: row.try_get("username")?,
        language_code: row.try_get("language_code")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Get a user by Telegram id, creating it on first contact
///
/// A known user keeps their stored username unless a new one is given.
pub async fn get_or_create_user(pool: &PgPool, telegram_id: i64, username: Option<&str>) -> Result<User> {
    debug!(telegram_id, "Getting or creating user");

    let row = sqlx::query(
        "INSERT INTO users (telegram_id, username) VALUES ($1, $2)
         ON CONFLICT (telegram_id) DO UPDATE
         SET username = COALESCE(EXCLUDED.username, users.username), updated_at = NOW()
         RETURNING id, telegram_id, username, language_code, is_active, created_at",
    )
    .bind(telegram_id)
    .bind(username)
    .fetch_one(pool)
    .await
    .context("Failed to get or create user")?;

    user_from_row(&row)
}

pub async fn get_user_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, telegram_id, username, language_code, is_active, created_at
         FROM users WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read user by telegram id")?;

    row.as_ref().map(user_from_row).transpose()
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    let kind: String = row.try_get("subscription_type")?;
    Ok(Subscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: kind.parse()?,
        target: row.try_get("subscription_id")?,
        name: row.try_get("subscription_name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Subscribe a user to a target
///
/// Returns `true` when a new subscription was created. An existing one is
/// reactivated if it had been removed, and `false` is returned.
pub async fn add_subscription(
    pool: &PgPool,
    user_id: i64,
    kind: SubscriptionKind,
    target: &str,
    name: Option<&str>,
) -> Result<bool> {
    info!(user_id, kind = %kind, target = %target, "Adding subscription");

    let existing = sqlx::query(
        "SELECT id, is_active FROM subscriptions
         WHERE user_id = $1 AND subscription_type = $2 AND subscription_id = $3",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(target)
    .fetch_optional(pool)
    .await
    .context("Failed to look up subscription")?;

    if let Some(row) = existing {
        let is_active: bool = row.try_get("is_active")?;
        if !is_active {
            let id: i64 = row.try_get("id")?;
            sqlx::query("UPDATE subscriptions SET is_active = TRUE WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to reactivate subscription")?;
            info!(subscription_id = id, "Subscription reactivated");
        }
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO subscriptions (user_id, subscription_type, subscription_id, subscription_name)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT ON CONSTRAINT unique_user_subscription DO NOTHING",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(target)
    .bind(name.unwrap_or(target))
    .execute(pool)
    .await
    .context("Failed to insert subscription")
    .map(|result| result.rows_affected() > 0)
}

/// Deactivate one of a user's subscriptions
pub async fn remove_subscription(pool: &PgPool, user_id: i64, subscription_id: i64) -> Result<bool> {
    info!(user_id, subscription_id, "Removing subscription");

    let result = sqlx::query(
        "UPDATE subscriptions SET is_active = FALSE
         WHERE id = $1 AND user_id = $2 AND is_active",
    )
    .bind(subscription_id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to remove subscription")?;

    Ok(result.rows_affected() > 0)
}

/// Active subscriptions of a user, oldest first
pub async fn get_user_subscriptions(pool: &PgPool, user_id: i64) -> Result<Vec<Subscription>> {
    let rows = sqlx::query(
        "SELECT id, user_id, subscription_type, subscription_id, subscription_name, is_active, created_at
         FROM subscriptions WHERE user_id = $1 AND is_active
         ORDER BY created_at, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list user subscriptions")?;

    rows.iter().map(subscription_from_row).collect()
}

/// Distinct targets of one kind with at least one active subscription
pub async fn get_active_targets(pool: &PgPool, kind: SubscriptionKind) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT DISTINCT subscription_id FROM subscriptions
         WHERE subscription_type = $1 AND is_active
         ORDER BY subscription_id",
    )
    .bind(kind.as_str())
    .fetch_all(pool)
    .await
    .context("Failed to list subscription targets")?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("subscription_id").map_err(anyhow::Error::from))
        .collect()
}

/// Chat ids of active users actively subscribed to a target
pub async fn get_subscriber_chat_ids(pool: &PgPool, kind: SubscriptionKind, target: &str) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT DISTINCT u.telegram_id FROM subscriptions s
         JOIN users u ON u.id = s.user_id
         WHERE s.subscription_type = $1 AND s.subscription_id = $2
           AND s.is_active AND u.is_active
         ORDER BY u.telegram_id",
    )
    .bind(kind.as_str())
    .bind(target)
    .fetch_all(pool)
    .await
    .context("Failed to list subscribers")?;

    rows.iter()
        .map(|row| row.try_get::<i64, _>("telegram_id").map_err(anyhow::Error::from))
        .collect()
}

/// Bookmark a dataset; `false` when it was already bookmarked
pub async fn add_bookmark(pool: &PgPool, user_id: i64, dataset_id: &str, dataset_title: &str) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO bookmarks (user_id, dataset_id, dataset_title) VALUES ($1, $2, $3)
         ON CONFLICT ON CONSTRAINT unique_user_bookmark DO NOTHING",
    )
    .bind(user_id)
    .bind(dataset_id)
    .bind(dataset_title)
    .execute(pool)
    .await
    .context("Failed to add bookmark")?;

    Ok(result.rows_affected() > 0)
}

pub async fn remove_bookmark(pool: &PgPool, user_id: i64, dataset_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND dataset_id = $2")
        .bind(user_id)
        .bind(dataset_id)
        .execute(pool)
        .await
        .context("Failed to remove bookmark")?;

    Ok(result.rows_affected() > 0)
}

/// Bookmarks of a user, newest first
pub async fn get_user_bookmarks(pool: &PgPool, user_id: i64) -> Result<Vec<Bookmark>> {
    let rows = sqlx::query(
        "SELECT id, user_id, dataset_id, dataset_title, created_at FROM bookmarks
         WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list bookmarks")?;

    rows.iter()
        .map(|row| {
            Ok(Bookmark {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                dataset_id: row.try_get("dataset_id")?,
                dataset_title: row.try_get("dataset_title")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn is_bookmarked(pool: &PgPool, user_id: i64, dataset_id: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS found FROM bookmarks WHERE user_id = $1 AND dataset_id = $2")
        .bind(user_id)
        .bind(dataset_id)
        .fetch_optional(pool)
        .await
        .context("Failed to check bookmark")?;

    Ok(row.is_some())
}

pub async fn save_dataset_snapshot(pool: &PgPool, snapshot: &DatasetSnapshot) -> Result<()> {
    let records_count =
        i64::try_from(snapshot.records_count).context("records_count does not fit in BIGINT")?;
    let themes = serde_json::to_string(&snapshot.themes).context("Failed to serialize themes")?;

    sqlx::query(
        "INSERT INTO dataset_snapshots
         (dataset_id, modified, data_processed, metadata_processed, records_count, themes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&snapshot.dataset_id)
    .bind(&snapshot.modified)
    .bind(&snapshot.data_processed)
    .bind(&snapshot.metadata_processed)
    .bind(records_count)
    .bind(themes)
    .bind(snapshot.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save snapshot of dataset {}", snapshot.dataset_id))?;

    Ok(())
}

pub async fn get_latest_dataset_snapshot(pool: &PgPool, dataset_id: &str) -> Result<Option<DatasetSnapshot>> {
    let row = sqlx::query(
        "SELECT dataset_id, modified, data_processed, metadata_processed, records_count, themes, created_at
         FROM dataset_snapshots WHERE dataset_id = $1
         ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(dataset_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read latest dataset snapshot")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let records_count: i64 = row.try_get("records_count")?;
    let themes: String = row.try_get("themes")?;
    Ok(Some(DatasetSnapshot {
        dataset_id: row.try_get("dataset_id")?,
        modified: row.try_get("modified")?,
        data_processed: row.try_get("data_processed")?,
        metadata_processed: row.try_get("metadata_processed")?,
        records_count: u64::try_from(records_count).context("Negative records_count in snapshot")?,
        themes: serde_json::from_str(&themes).context("Corrupt themes in dataset snapshot")?,
        created_at: row.try_get("created_at")?,
    }))
}

pub async fn save_theme_snapshot(pool: &PgPool, snapshot: &ThemeSnapshot) -> Result<()> {
    let dataset_ids =
        serde_json::to_string(&snapshot.dataset_ids).context("Failed to serialize dataset ids")?;

    sqlx::query(
        "INSERT INTO theme_snapshots (theme_name, dataset_ids, dataset_count, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&snapshot.theme_name)
    .bind(dataset_ids)
    .bind(snapshot.dataset_ids.len() as i64)
    .bind(snapshot.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save snapshot of theme {}", snapshot.theme_name))?;

    Ok(())
}

pub async fn get_latest_theme_snapshot(pool: &PgPool, theme_name: &str) -> Result<Option<ThemeSnapshot>> {
    let row = sqlx::query(
        "SELECT theme_name, dataset_ids, created_at FROM theme_snapshots
         WHERE theme_name = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(theme_name)
    .fetch_optional(pool)
    .await
    .context("Failed to read latest theme snapshot")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let dataset_ids: String = row.try_get("dataset_ids")?;
    let dataset_ids: BTreeSet<String> =
        serde_json::from_str(&dataset_ids).context("Corrupt dataset ids in theme snapshot")?;
    Ok(Some(ThemeSnapshot {
        theme_name: row.try_get("theme_name")?,
        dataset_ids,
        created_at: row.try_get("created_at")?,
    }))
}

/// Postgres-backed snapshot log and subscription source
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn save_dataset_snapshot(&self, snapshot: &DatasetSnapshot) -> Result<()> {
        save_dataset_snapshot(&self.pool, snapshot).await
    }

    async fn latest_dataset_snapshot(&self, dataset_id: &str) -> Result<Option<DatasetSnapshot>> {
        get_latest_dataset_snapshot(&self.pool, dataset_id).await
    }

    async fn save_theme_snapshot(&self, snapshot: &ThemeSnapshot) -> Result<()> {
        save_theme_snapshot(&self.pool, snapshot).await
    }

    async fn latest_theme_snapshot(&self, theme_name: &str) -> Result<Option<ThemeSnapshot>> {
        get_latest_theme_snapshot(&self.pool, theme_name).await
    }
}

#[async_trait]
impl SubscriptionSource for PgStore {
    async fn active_targets(&self, kind: SubscriptionKind) -> Result<Vec<String>> {
        get_active_targets(&self.pool, kind).await
    }

    async fn subscriber_chat_ids(&self, kind: SubscriptionKind, target: &str) -> Result<Vec<i64>> {
        get_subscriber_chat_ids(&self.pool, kind, target).await
    }
}
