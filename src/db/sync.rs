//! Web-sync persistence: offline action queues, received actions, and
//! server watermarks.
//!
//! The queues are durable so locally recorded actions survive restarts;
//! rows are only deleted once the server acknowledged the upload (or the
//! consumer explicitly discarded a received action).

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{
    Database, EpisodeActionRow, NewEpisodeAction, ReceivedEpisodeActionRow, ReceivedSubscribeRow,
    RewrittenUrlRow, SubscribeActionRow,
};

impl Database {
    /// Queue a subscription mutation for upload.
    ///
    /// A queued action for the same URL (in either direction) is superseded:
    /// subscribing then unsubscribing before a flush leaves only the
    /// unsubscribe in the queue.
    pub async fn enqueue_subscribe_action(&self, url: &str, kind: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("DELETE FROM sync_subscribe_actions WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to supersede subscribe action: {}",
                    e
                )))
            })?;

        sqlx::query("INSERT INTO sync_subscribe_actions (url, kind, created_at) VALUES (?, ?, ?)")
            .bind(url)
            .bind(kind)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to queue subscribe action: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// List queued subscription mutations in queue order
    pub async fn list_subscribe_actions(&self) -> Result<Vec<SubscribeActionRow>> {
        let rows = sqlx::query_as::<_, SubscribeActionRow>(
            "SELECT id, url, kind, created_at FROM sync_subscribe_actions ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list subscribe actions: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Delete queued subscription mutations after a successful upload
    pub async fn delete_subscribe_actions(&self, ids: &[i64]) -> Result<()> {
        for id in ids {
            sqlx::query("DELETE FROM sync_subscribe_actions WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to delete subscribe action: {}",
                        e
                    )))
                })?;
        }

        Ok(())
    }

    /// Queue an episode action for upload
    pub async fn enqueue_episode_action(&self, action: &NewEpisodeAction<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_episode_actions (
                podcast_url, episode_url, kind, started, position, total, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(action.podcast_url)
        .bind(action.episode_url)
        .bind(action.kind)
        .bind(action.started)
        .bind(action.position)
        .bind(action.total)
        .bind(action.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to queue episode action: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List up to `limit` queued episode actions in queue order.
    ///
    /// The flush worker uploads in bounded batches and deletes each batch
    /// only after its upload succeeded, so partial progress survives a crash.
    pub async fn list_episode_actions(&self, limit: usize) -> Result<Vec<EpisodeActionRow>> {
        let rows = sqlx::query_as::<_, EpisodeActionRow>(
            "SELECT id, podcast_url, episode_url, kind, started, position, total, timestamp \
             FROM sync_episode_actions ORDER BY id ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list episode actions: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Number of episode actions waiting for upload
    pub async fn count_episode_actions(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_episode_actions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count episode actions: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    /// Delete queued episode actions after a successful batch upload
    pub async fn delete_episode_actions(&self, ids: &[i64]) -> Result<()> {
        for id in ids {
            sqlx::query("DELETE FROM sync_episode_actions WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to delete episode action: {}",
                        e
                    )))
                })?;
        }

        Ok(())
    }

    /// Record a server-side subscription change for the consumer to
    /// confirm or reject, superseding any stale row for the same URL
    pub async fn record_received_subscribe(&self, url: &str, kind: i32, timestamp: i64) -> Result<()> {
        sqlx::query("DELETE FROM received_subscribe_actions WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to supersede received subscribe action: {}",
                    e
                )))
            })?;

        sqlx::query(
            "INSERT INTO received_subscribe_actions (url, kind, timestamp) VALUES (?, ?, ?)",
        )
        .bind(url)
        .bind(kind)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record received subscribe action: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List server-side subscription changes awaiting confirmation
    pub async fn list_received_subscribes(&self) -> Result<Vec<ReceivedSubscribeRow>> {
        let rows = sqlx::query_as::<_, ReceivedSubscribeRow>(
            "SELECT id, url, kind, timestamp FROM received_subscribe_actions ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list received subscribe actions: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Remove a received subscription change once confirmed or rejected
    pub async fn delete_received_subscribe(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM received_subscribe_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete received subscribe action: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Record an episode action downloaded from the server
    pub async fn record_received_episode_action(
        &self,
        action: &NewEpisodeAction<'_>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO received_episode_actions (
                podcast_url, episode_url, kind, started, position, total, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(action.podcast_url)
        .bind(action.episode_url)
        .bind(action.kind)
        .bind(action.started)
        .bind(action.position)
        .bind(action.total)
        .bind(action.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record received episode action: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List received episode actions awaiting merge, oldest remote
    /// timestamp first
    pub async fn list_received_episode_actions(&self) -> Result<Vec<ReceivedEpisodeActionRow>> {
        let rows = sqlx::query_as::<_, ReceivedEpisodeActionRow>(
            "SELECT id, podcast_url, episode_url, kind, started, position, total, timestamp \
             FROM received_episode_actions ORDER BY timestamp ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list received episode actions: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Delete received episode actions after they were merged
    pub async fn delete_received_episode_actions(&self, ids: &[i64]) -> Result<()> {
        for id in ids {
            sqlx::query("DELETE FROM received_episode_actions WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to delete received episode action: {}",
                        e
                    )))
                })?;
        }

        Ok(())
    }

    /// Get the stored "since" watermark for a (host, device, category) key
    pub async fn get_since(&self, key: &str) -> Result<Option<i64>> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM sync_since WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get since value: {}",
                    e
                )))
            })?;

        Ok(value)
    }

    /// Store the "since" watermark for a (host, device, category) key
    pub async fn set_since(&self, key: &str, value: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO sync_since (key, value, updated_at)
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
                "Failed to set since value: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record a URL-rewrite hint from the server
    pub async fn record_rewritten_url(&self, old_url: &str, new_url: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO rewritten_urls (old_url, new_url, created_at) VALUES (?, ?, ?)")
            .bind(old_url)
            .bind(new_url)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to record rewritten URL: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// List recorded URL-rewrite hints
    pub async fn list_rewritten_urls(&self) -> Result<Vec<RewrittenUrlRow>> {
        let rows = sqlx::query_as::<_, RewrittenUrlRow>(
            "SELECT id, old_url, new_url, created_at FROM rewritten_urls ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list rewritten URLs: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Remove a URL-rewrite hint once applied
    pub async fn delete_rewritten_url(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM rewritten_urls WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete rewritten URL: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
