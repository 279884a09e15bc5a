//! Episode CRUD, download state, and retention.

use crate::error::DatabaseError;
use crate::types::{EpisodeId, EpisodeState, PodcastId, Status};
use crate::{Error, Result};

use super::{Database, Episode, NewEpisode};

const EPISODE_COLUMNS: &str = "id, podcast_id, title, description, url, guid, link, published, \
     duration_secs, file_size, mime_type, state, is_new, download_filename, \
     download_status, error_message, current_position, current_position_updated, created_at";

impl Database {
    /// Insert a new episode record
    pub async fn insert_episode(&self, episode: &NewEpisode) -> Result<EpisodeId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO episodes (
                podcast_id, title, description, url, guid, link, published,
                duration_secs, file_size, mime_type, state, is_new,
                download_filename, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(episode.podcast_id)
        .bind(&episode.title)
        .bind(&episode.description)
        .bind(&episode.url)
        .bind(&episode.guid)
        .bind(&episode.link)
        .bind(episode.published)
        .bind(episode.duration_secs)
        .bind(episode.file_size)
        .bind(&episode.mime_type)
        .bind(EpisodeState::Normal.to_i32())
        .bind(if episode.is_new { 1 } else { 0 })
        .bind(&episode.download_filename)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert episode: {}",
                e
            )))
        })?;

        Ok(EpisodeId(result.last_insert_rowid()))
    }

    /// Get an episode by ID
    pub async fn get_episode(&self, id: EpisodeId) -> Result<Option<Episode>> {
        let row = sqlx::query_as::<_, Episode>(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get episode: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get an episode by its GUID within a podcast
    pub async fn get_episode_by_guid(
        &self,
        podcast_id: PodcastId,
        guid: &str,
    ) -> Result<Option<Episode>> {
        let row = sqlx::query_as::<_, Episode>(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE podcast_id = ? AND guid = ?"
        ))
        .bind(podcast_id)
        .bind(guid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get episode by GUID: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Find an episode by its podcast feed URL and enclosure URL.
    ///
    /// This is the lookup the sync merge uses, since the web service
    /// identifies episodes by (podcast URL, episode URL) pairs.
    pub async fn get_episode_by_urls(
        &self,
        podcast_url: &str,
        episode_url: &str,
    ) -> Result<Option<Episode>> {
        let row = sqlx::query_as::<_, Episode>(&format!(
            "SELECT e.id as id, e.podcast_id as podcast_id, e.title as title, \
             e.description as description, e.url as url, e.guid as guid, e.link as link, \
             e.published as published, e.duration_secs as duration_secs, \
             e.file_size as file_size, e.mime_type as mime_type, e.state as state, \
             e.is_new as is_new, e.download_filename as download_filename, \
             e.download_status as download_status, e.error_message as error_message, \
             e.current_position as current_position, \
             e.current_position_updated as current_position_updated, e.created_at as created_at \
             FROM episodes e JOIN podcasts p ON e.podcast_id = p.id \
             WHERE p.url = ? AND e.url = ?",
        ))
        .bind(podcast_url)
        .bind(episode_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get episode by URLs: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List a podcast's episodes, newest first
    pub async fn list_episodes(&self, podcast_id: PodcastId) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE podcast_id = ? ORDER BY published DESC"
        ))
        .bind(podcast_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list episodes: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// The publish timestamp of a podcast's newest known episode
    pub async fn newest_published(&self, podcast_id: PodcastId) -> Result<Option<i64>> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT MAX(published) FROM episodes WHERE podcast_id = ?")
                .bind(podcast_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query newest published: {}",
                        e
                    )))
                })?
                .flatten();

        Ok(value)
    }

    /// Update an episode's mutable metadata in place from a freshly parsed
    /// feed entry. The new flag is deliberately untouched.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_episode_from_feed(
        &self,
        id: EpisodeId,
        title: &str,
        description: Option<&str>,
        url: &str,
        link: Option<&str>,
        published: i64,
        duration_secs: Option<i64>,
        file_size: i64,
        mime_type: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE episodes SET
                title = ?, description = ?, url = ?, link = ?, published = ?,
                duration_secs = ?, file_size = ?, mime_type = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(url)
        .bind(link)
        .bind(published)
        .bind(duration_secs)
        .bind(file_size)
        .bind(mime_type)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update episode from feed: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Mark an episode downloaded: state, new flag, final size, filename,
    /// and mimetype in one statement
    pub async fn set_episode_downloaded(
        &self,
        id: EpisodeId,
        filename: &str,
        file_size: i64,
        mime_type: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE episodes SET
                state = ?, is_new = 1, download_filename = ?, file_size = ?,
                mime_type = COALESCE(?, mime_type),
                download_status = ?, error_message = NULL
            WHERE id = ?
            "#,
        )
        .bind(EpisodeState::Downloaded.to_i32())
        .bind(filename)
        .bind(file_size)
        .bind(mime_type)
        .bind(Status::Done.to_i32())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark episode downloaded: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Update an episode's download task status
    pub async fn set_download_status(&self, id: EpisodeId, status: i32) -> Result<()> {
        sqlx::query("UPDATE episodes SET download_status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update download status: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Set an episode's download error message
    pub async fn set_download_error(&self, id: EpisodeId, error: &str) -> Result<()> {
        sqlx::query("UPDATE episodes SET error_message = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set download error: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Set an episode's lifecycle state
    pub async fn set_episode_state(&self, id: EpisodeId, state: i32) -> Result<()> {
        sqlx::query("UPDATE episodes SET state = ? WHERE id = ?")
            .bind(state)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set episode state: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Set or clear an episode's new flag
    pub async fn set_is_new(&self, id: EpisodeId, is_new: bool) -> Result<()> {
        sqlx::query("UPDATE episodes SET is_new = ? WHERE id = ?")
            .bind(if is_new { 1 } else { 0 })
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set new flag: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Correct an episode's known file size (server reported a different total)
    pub async fn set_file_size(&self, id: EpisodeId, file_size: i64) -> Result<()> {
        sqlx::query("UPDATE episodes SET file_size = ? WHERE id = ?")
            .bind(file_size)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set file size: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Rename an episode's stored filename (redirect/mimetype correction)
    pub async fn set_download_filename(&self, id: EpisodeId, filename: &str) -> Result<()> {
        sqlx::query("UPDATE episodes SET download_filename = ? WHERE id = ?")
            .bind(filename)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set download filename: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Update an episode's playback position and its change timestamp
    pub async fn update_position(
        &self,
        id: EpisodeId,
        position: i64,
        total: Option<i64>,
        updated_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE episodes SET
                current_position = ?,
                duration_secs = COALESCE(?, duration_secs),
                current_position_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(position)
        .bind(total)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update playback position: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Delete an episode record
    pub async fn delete_episode(&self, id: EpisodeId) -> Result<()> {
        sqlx::query("DELETE FROM episodes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete episode: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Episodes whose downloads were interrupted by the last shutdown
    /// (still marked Queued or Downloading) and should be re-queued
    pub async fn resumable_episodes(&self) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes \
             WHERE download_status IN (?, ?) ORDER BY id ASC"
        ))
        .bind(Status::Queued.to_i32())
        .bind(Status::Downloading.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query resumable episodes: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Episodes with a specific download status
    pub async fn episodes_with_status(&self, status: i32) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Episode>(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE download_status = ? ORDER BY id ASC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query episodes by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Enforce the per-podcast retention limit: delete the oldest
    /// non-downloaded episodes beyond `max_episodes`, keeping the newest
    /// `max_episodes` rows regardless of state.
    ///
    /// Returns the number of episodes deleted.
    pub async fn enforce_max_episodes(
        &self,
        podcast_id: PodcastId,
        max_episodes: usize,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM episodes
            WHERE podcast_id = ?
              AND state = ?
              AND id NOT IN (
                  SELECT id FROM episodes
                  WHERE podcast_id = ?
                  ORDER BY published DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(podcast_id)
        .bind(EpisodeState::Normal.to_i32())
        .bind(podcast_id)
        .bind(max_episodes as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to enforce episode retention: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
