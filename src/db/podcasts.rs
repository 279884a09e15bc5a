//! Podcast subscription CRUD operations.

use crate::error::DatabaseError;
use crate::types::PodcastId;
use crate::{Error, Result};

use super::{Database, NewPodcast, Podcast};

const PODCAST_COLUMNS: &str = "id, title, url, link, description, cover_url, \
     download_strategy, enabled, last_check, last_error, created_at";

impl Database {
    /// Insert a new podcast subscription
    pub async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<PodcastId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO podcasts (
                title, url, link, description, cover_url,
                download_strategy, enabled, created_at
            ) VALUES (?, ?, ?, ?, ?, 0, 1, ?)
            "#,
        )
        .bind(&podcast.title)
        .bind(&podcast.url)
        .bind(&podcast.link)
        .bind(&podcast.description)
        .bind(&podcast.cover_url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint failed") {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "Podcast with URL {} already subscribed",
                    podcast.url
                )))
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert podcast: {}",
                    e
                )))
            }
        })?;

        Ok(PodcastId(result.last_insert_rowid()))
    }

    /// Get a podcast by ID
    pub async fn get_podcast(&self, id: PodcastId) -> Result<Option<Podcast>> {
        let row = sqlx::query_as::<_, Podcast>(&format!(
            "SELECT {PODCAST_COLUMNS} FROM podcasts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get podcast: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a podcast by its feed URL
    pub async fn get_podcast_by_url(&self, url: &str) -> Result<Option<Podcast>> {
        let row = sqlx::query_as::<_, Podcast>(&format!(
            "SELECT {PODCAST_COLUMNS} FROM podcasts WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get podcast by URL: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all podcast subscriptions
    pub async fn list_podcasts(&self) -> Result<Vec<Podcast>> {
        let rows = sqlx::query_as::<_, Podcast>(&format!(
            "SELECT {PODCAST_COLUMNS} FROM podcasts ORDER BY title ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list podcasts: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List podcasts the feed scheduler should refresh
    pub async fn list_enabled_podcasts(&self) -> Result<Vec<Podcast>> {
        let rows = sqlx::query_as::<_, Podcast>(&format!(
            "SELECT {PODCAST_COLUMNS} FROM podcasts WHERE enabled = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list enabled podcasts: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Delete a podcast (cascades to its episodes)
    pub async fn delete_podcast(&self, id: PodcastId) -> Result<()> {
        sqlx::query("DELETE FROM podcasts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete podcast: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Update podcast metadata from a freshly parsed feed
    pub async fn update_podcast_meta(
        &self,
        id: PodcastId,
        title: &str,
        link: Option<&str>,
        description: Option<&str>,
        cover_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE podcasts SET title = ?, link = ?, description = ?, cover_url = ? WHERE id = ?",
        )
        .bind(title)
        .bind(link)
        .bind(description)
        .bind(cover_url)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update podcast metadata: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record the outcome of a feed check
    pub async fn set_podcast_checked(&self, id: PodcastId, error: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE podcasts SET last_check = ?, last_error = ? WHERE id = ?")
            .bind(now)
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to record feed check: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Set a podcast's new-episode flagging strategy
    pub async fn set_download_strategy(&self, id: PodcastId, strategy: i32) -> Result<()> {
        sqlx::query("UPDATE podcasts SET download_strategy = ? WHERE id = ?")
            .bind(strategy)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set download strategy: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Enable or disable scheduler refreshes for a podcast
    pub async fn set_podcast_enabled(&self, id: PodcastId, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE podcasts SET enabled = ? WHERE id = ?")
            .bind(if enabled { 1 } else { 0 })
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set podcast enabled: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Replace a podcast's feed URL (server-side canonicalization)
    pub async fn update_podcast_url(&self, id: PodcastId, new_url: &str) -> Result<()> {
        sqlx::query("UPDATE podcasts SET url = ? WHERE id = ?")
            .bind(new_url)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update podcast URL: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
