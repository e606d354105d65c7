//! Storage contract consumed by the answer pipeline, plus its PostgreSQL implementation.
//!
//! The pipeline only talks to [`AssistantStore`]; tests substitute an in-memory
//! implementation, production wires [`PgStore`] over a `sqlx` pool.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::models::{CachedCountryInfo, HistoryMessage, Mode, Role, UserProfile};
use crate::Result;

/// Persisted messages kept per user; older rows are trimmed on write.
const MAX_MESSAGES_PER_USER: i64 = 200;

/// Record-store contract for user profiles, messages, quotas and the country cache.
#[async_trait]
pub trait AssistantStore: Send + Sync {
    /// Upsert the user row from transport-level identity data.
    async fn ensure_user(&self, user_id: i64, username: Option<&str>) -> Result<()>;

    async fn get_user_profile(&self, user_id: i64) -> Result<Option<UserProfile>>;

    async fn update_user_profile(&self, user_id: i64, profile: &UserProfile) -> Result<()>;

    /// Persist one message and trim the user's history to the retention window.
    async fn save_message(&self, user_id: i64, role: Role, text: &str, mode: Mode) -> Result<()>;

    /// Most recent messages, ordered oldest to newest.
    async fn recent_messages(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryMessage>>;

    /// Count of user-authored messages for the mode on the current UTC calendar day.
    async fn daily_message_count(&self, user_id: i64, mode: Mode) -> Result<i64>;

    async fn boost_until(&self, user_id: i64) -> Result<Option<DateTime<Utc>>>;

    /// Extend the boost window by `days`, stacking forward from `max(now, current)`.
    async fn extend_boost(&self, user_id: i64, days: i64) -> Result<DateTime<Utc>>;

    async fn cached_country_info(&self, key: &str) -> Result<Option<CachedCountryInfo>>;

    /// Upsert a country brief; resets `created_at` to now.
    async fn put_country_info(&self, key: &str, query: &str, answer: &str) -> Result<()>;

    async fn delete_country_info(&self, key: &str) -> Result<()>;

    /// Delete cache entries older than `ttl_days`; returns the number removed.
    async fn sweep_country_cache(&self, ttl_days: i64) -> Result<u64>;
}

/// New boost deadline: extensions stack forward from whichever of `now` and the
/// current deadline is later, never from the past.
pub fn stack_boost(
    now: DateTime<Utc>,
    current: Option<DateTime<Utc>>,
    days: i64,
) -> DateTime<Utc> {
    let base = match current {
        Some(until) if until > now => until,
        _ => now,
    };
    base + Duration::days(days)
}

/// Normalized cache key for a country query.
pub fn normalize_country_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema idempotently. Called once at process start.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id SERIAL PRIMARY KEY,
                tg_user_id BIGINT UNIQUE NOT NULL,
                username TEXT,
                home_country TEXT,
                target_country TEXT,
                migration_goal TEXT,
                budget TEXT,
                profession TEXT,
                notes TEXT,
                boost_until TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id SERIAL PRIMARY KEY,
                tg_user_id BIGINT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                mode TEXT NOT NULL DEFAULT 'chat',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_user_mode_role_created
            ON messages (tg_user_id, mode, role, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS country_info_cache (
                id SERIAL PRIMARY KEY,
                country_key TEXT UNIQUE NOT NULL,
                country_query TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AssistantStore for PgStore {
    async fn ensure_user(&self, user_id: i64, username: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (tg_user_id, username)
            VALUES ($1, $2)
            ON CONFLICT (tg_user_id) DO UPDATE
            SET username = EXCLUDED.username,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let profile: Option<UserProfile> = sqlx::query_as(
            r#"
            SELECT home_country, target_country, migration_goal, budget, profession, notes
            FROM users
            WHERE tg_user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn update_user_profile(&self, user_id: i64, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET home_country = $1,
                target_country = $2,
                migration_goal = $3,
                budget = $4,
                profession = $5,
                notes = $6,
                updated_at = NOW()
            WHERE tg_user_id = $7
            "#,
        )
        .bind(&profile.home_country)
        .bind(&profile.target_country)
        .bind(&profile.migration_goal)
        .bind(&profile.budget)
        .bind(&profile.profession)
        .bind(&profile.notes)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_message(&self, user_id: i64, role: Role, text: &str, mode: Mode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (tg_user_id, role, text, mode)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(text)
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;

        // Trim history to the retention window, oldest rows first.
        sqlx::query(
            r#"
            DELETE FROM messages
            WHERE id IN (
                SELECT id
                FROM messages
                WHERE tg_user_id = $1
                ORDER BY id DESC
                OFFSET $2
            )
            "#,
        )
        .bind(user_id)
        .bind(MAX_MESSAGES_PER_USER)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_messages(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryMessage>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT role, text
            FROM messages
            WHERE tg_user_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<HistoryMessage> = rows
            .into_iter()
            .map(|(role, text)| HistoryMessage {
                role: if role == "assistant" {
                    Role::Assistant
                } else {
                    Role::User
                },
                text,
            })
            .collect();
        messages.reverse();

        Ok(messages)
    }

    async fn daily_message_count(&self, user_id: i64, mode: Mode) -> Result<i64> {
        // Quota days are UTC calendar days regardless of server timezone.
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE tg_user_id = $1
              AND role = 'user'
              AND mode = $2
              AND (created_at AT TIME ZONE 'utc')::date = (NOW() AT TIME ZONE 'utc')::date
            "#,
        )
        .bind(user_id)
        .bind(mode.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn boost_until(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        let until: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            r#"
            SELECT boost_until FROM users WHERE tg_user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(until.flatten())
    }

    async fn extend_boost(&self, user_id: i64, days: i64) -> Result<DateTime<Utc>> {
        let current = self.boost_until(user_id).await?;
        let until = stack_boost(Utc::now(), current, days);

        sqlx::query(
            r#"
            UPDATE users SET boost_until = $1, updated_at = NOW() WHERE tg_user_id = $2
            "#,
        )
        .bind(until)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(until)
    }

    async fn cached_country_info(&self, key: &str) -> Result<Option<CachedCountryInfo>> {
        let entry: Option<CachedCountryInfo> = sqlx::query_as(
            r#"
            SELECT country_key, country_query, answer, created_at
            FROM country_info_cache
            WHERE country_key = $1
            "#,
        )
        .bind(normalize_country_key(key))
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn put_country_info(&self, key: &str, query: &str, answer: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO country_info_cache (country_key, country_query, answer)
            VALUES ($1, $2, $3)
            ON CONFLICT (country_key) DO UPDATE
            SET country_query = EXCLUDED.country_query,
                answer = EXCLUDED.answer,
                created_at = NOW()
            "#,
        )
        .bind(normalize_country_key(key))
        .bind(query)
        .bind(answer)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_country_info(&self, key: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM country_info_cache WHERE country_key = $1
            "#,
        )
        .bind(normalize_country_key(key))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sweep_country_cache(&self, ttl_days: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM country_info_cache
            WHERE created_at < NOW() - make_interval(days => $1)
            "#,
        )
        .bind(ttl_days as i32)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::debug!(removed, ttl_days, "Swept expired country cache entries");
        }

        Ok(removed)
    }
}
