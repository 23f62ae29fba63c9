//! Persisted key-value settings (session user, active school, auto-backup).

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

use super::MirrorError;

pub const SESSION_USER_KEY: &str = "edusync_user";
pub const ACTIVE_SCHOOL_KEY: &str = "edusync_active_school";
pub const AUTO_BACKUP_ENABLED_KEY: &str = "edusync_auto_backup_enabled";
pub const AUTO_BACKUP_FREQUENCY_KEY: &str = "edusync_auto_backup_frequency";
pub const LAST_BACKUP_KEY: &str = "edusync_last_backup";

#[derive(Debug, Clone)]
pub struct Settings {
    pool: SqlitePool,
}

impl Settings {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), MirrorError> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reads a JSON-encoded value. A value that no longer parses is treated
    /// as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MirrorError> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable setting {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), MirrorError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| MirrorError::Setting(key.to_string(), e.to_string()))?;
        self.set(key, &raw).await
    }
}
