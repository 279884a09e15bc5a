//! Runtime state tracking: shutdown detection and persistent sync flags.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous session did not call set_clean_shutdown(),
    /// indicating a crash or forced termination.
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value = self.get_state("clean_shutdown").await?;

        // If the value is missing or "false", it was an unclean shutdown
        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Mark that the application has started cleanly
    ///
    /// This is called during PodcastDownloader::new() to indicate that the
    /// application is running. If shutdown() is not called before the next
    /// startup, was_unclean_shutdown() will return true.
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_state("clean_shutdown", "false").await
    }

    /// Mark that the application is shutting down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_state("clean_shutdown", "true").await
    }

    /// Whether sync was persistently disabled after an authentication
    /// failure. Overrides the configured `sync.enabled` until cleared.
    pub async fn is_sync_disabled(&self) -> Result<bool> {
        let value = self.get_state("sync_disabled").await?;
        Ok(value.is_some_and(|v| v == "true"))
    }

    /// Persistently disable or re-enable sync
    pub async fn set_sync_disabled(&self, disabled: bool) -> Result<()> {
        self.set_state("sync_disabled", if disabled { "true" } else { "false" })
            .await
    }

    /// Whether a device-settings update is waiting to be uploaded.
    /// The device must exist on the server before other actions reference
    /// it, so the flush worker processes this first.
    pub async fn is_device_update_pending(&self) -> Result<bool> {
        let value = self.get_state("device_update_pending").await?;
        Ok(value.is_some_and(|v| v == "true"))
    }

    /// Flag or clear the pending device-settings update
    pub async fn set_device_update_pending(&self, pending: bool) -> Result<()> {
        self.set_state("device_update_pending", if pending { "true" } else { "false" })
            .await
    }

    /// Read a runtime state value
    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to read runtime state '{}': {}",
                        key, e
                    )))
                })?;

        Ok(value)
    }

    /// Write a runtime state value
    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write runtime state '{}': {}",
                key, e
            )))
        })?;

        Ok(())
    }
}
