/// Collaborator contracts for the persistent stores this service reads.
///
/// The notification core never owns domain entities; it looks users and
/// devices up at dispatch time. The single write path back into the device
/// table is retiring tokens the push provider reports as gone.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Device, DevicePlatform};

/// Recipient resolution; distinguishes "unknown user" from expected absence
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Active, token-bearing devices for a user. Empty is a normal outcome;
    /// many users never register a device.
    async fn active_devices(&self, user_id: Uuid) -> AppResult<Vec<Device>>;

    /// Narrow write path: terminal provider errors retire the token
    async fn mark_token_invalid(&self, user_id: Uuid, token: &str) -> AppResult<()>;
}

/// Presence side effect: timestamped "last seen" on offline transition
#[async_trait]
pub trait LastSeenStore: Send + Sync {
    async fn record_last_seen(&self, user_id: Uuid, seen_at: DateTime<Utc>) -> AppResult<()>;
}

/// Postgres-backed directory over the intranet's `users` and `device_tokens`
/// tables, which are owned and migrated by the REST collaborator.
pub struct PgDirectory {
    db: PgPool,
}

impl PgDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1) AS present")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;

        Ok(row.get("present"))
    }
}

#[async_trait]
impl DeviceDirectory for PgDirectory {
    async fn active_devices(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, token, platform, is_active
            FROM device_tokens
            WHERE user_id = $1 AND is_active = true
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let devices = rows
            .iter()
            .map(|row| {
                let platform: String = row.get("platform");
                Device {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    token: row.get("token"),
                    platform: DevicePlatform::from_str(&platform),
                    is_active: row.get("is_active"),
                }
            })
            .collect();

        Ok(devices)
    }

    async fn mark_token_invalid(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE device_tokens
            SET is_active = false
            WHERE user_id = $1 AND token = $2
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.db)
        .await?;

        tracing::debug!(%user_id, "retired invalid push token");
        Ok(())
    }
}

#[async_trait]
impl LastSeenStore for PgDirectory {
    async fn record_last_seen(&self, user_id: Uuid, seen_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_seen_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(seen_at)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
