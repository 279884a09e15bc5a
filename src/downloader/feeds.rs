//! Subscription management and feed updates.

use std::collections::HashSet;

use crate::db::NewPodcast;
use crate::error::{Error, Result};
use crate::feed;
use crate::types::{Event, FeedUpdateResult, PodcastId, SubscribeKind};

use super::PodcastDownloader;

impl PodcastDownloader {
    /// Subscribe to a podcast feed.
    ///
    /// Fetches and parses the feed, stores the subscription, and merges
    /// the feed's episodes. When sync is enabled, a subscribe action is
    /// queued for the web service.
    pub async fn subscribe(&self, feed_url: &str) -> Result<PodcastId> {
        let content =
            feed::fetch_feed(&self.http, feed_url, self.config.feeds.fetch_timeout).await?;
        let parsed = feed::parse_feed(&content)?;

        let id = self
            .db
            .insert_podcast(&NewPodcast {
                title: parsed.title.clone(),
                url: feed_url.to_string(),
                link: parsed.link.clone(),
                description: parsed.description.clone(),
                cover_url: parsed.cover_url.clone(),
            })
            .await?;

        let podcast = self
            .db
            .get_podcast(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Podcast {id} not found after insert")))?;

        let result = feed::consume_updated_feed(
            &self.db,
            &self.event_tx,
            &podcast,
            &parsed,
            &self.active_episode_ids().await,
            &self.config.feeds,
        )
        .await?;

        self.emit_event(Event::FeedUpdated {
            id,
            new_episodes: result.new_episodes,
            removed_episodes: result.removed_episodes,
        });

        if self.config.sync.enabled {
            self.db
                .enqueue_subscribe_action(feed_url, SubscribeKind::Add.to_i32())
                .await?;
            if let Some(sync) = &self.sync {
                sync.flush(false);
            }
        }

        tracing::info!(podcast_id = id.0, url = feed_url, "Subscribed to podcast");
        Ok(id)
    }

    /// Unsubscribe from a podcast.
    ///
    /// Deletes the subscription and its episodes (downloaded files are
    /// left on disk). When sync is enabled, an unsubscribe action is
    /// queued for the web service.
    pub async fn unsubscribe(&self, id: PodcastId) -> Result<()> {
        let podcast = self
            .db
            .get_podcast(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Podcast {id} not found")))?;

        // Cancel any live tasks belonging to this podcast first
        let episode_ids: Vec<_> = self
            .db
            .list_episodes(id)
            .await?
            .into_iter()
            .map(|e| crate::types::EpisodeId(e.id))
            .collect();
        for episode_id in episode_ids {
            let has_task = self
                .queue_state
                .tasks
                .lock()
                .await
                .contains_key(&episode_id);
            if has_task && let Err(e) = self.cancel(episode_id).await {
                tracing::warn!(episode_id = episode_id.0, error = %e, "Failed to cancel task during unsubscribe");
            }
        }

        self.db.delete_podcast(id).await?;

        if self.config.sync.enabled {
            self.db
                .enqueue_subscribe_action(&podcast.url, SubscribeKind::Remove.to_i32())
                .await?;
            if let Some(sync) = &self.sync {
                sync.flush(false);
            }
        }

        tracing::info!(podcast_id = id.0, url = %podcast.url, "Unsubscribed from podcast");
        Ok(())
    }

    /// Refresh one podcast: fetch its feed and reconcile the episode set.
    ///
    /// A fetch or parse failure is recorded on the podcast row (last
    /// error) and announced via [`Event::FeedUpdateFailed`].
    pub async fn update_podcast(&self, id: PodcastId) -> Result<FeedUpdateResult> {
        let podcast = self
            .db
            .get_podcast(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Podcast {id} not found")))?;

        let fetched =
            feed::fetch_feed(&self.http, &podcast.url, self.config.feeds.fetch_timeout).await;
        let parsed = match fetched {
            Ok(content) => match feed::parse_feed(&content) {
                Ok(parsed) => parsed,
                Err(e) => return self.feed_update_failed(id, e.into()).await,
            },
            Err(e) => return self.feed_update_failed(id, e.into()).await,
        };

        let result = feed::consume_updated_feed(
            &self.db,
            &self.event_tx,
            &podcast,
            &parsed,
            &self.active_episode_ids().await,
            &self.config.feeds,
        )
        .await?;

        self.emit_event(Event::FeedUpdated {
            id,
            new_episodes: result.new_episodes,
            removed_episodes: result.removed_episodes,
        });

        Ok(result)
    }

    /// Refresh every enabled podcast, continuing past individual failures
    pub async fn update_all_podcasts(&self) -> Result<()> {
        let podcasts = self.db.list_enabled_podcasts().await?;
        for podcast in podcasts {
            if let Err(e) = self.update_podcast(PodcastId(podcast.id)).await {
                tracing::warn!(
                    podcast_id = podcast.id,
                    error = %e,
                    "Feed update failed, continuing with remaining podcasts"
                );
            }
        }
        Ok(())
    }

    /// Record and announce a feed update failure
    async fn feed_update_failed(
        &self,
        id: PodcastId,
        error: Error,
    ) -> Result<FeedUpdateResult> {
        let message = error.to_string();
        self.db.set_podcast_checked(id, Some(&message)).await?;
        self.emit_event(Event::FeedUpdateFailed {
            id,
            error: message,
        });
        Err(error)
    }

    /// Episode IDs with a live download task (queued, downloading, or
    /// paused). Reconciliation never purges these.
    pub(crate) async fn active_episode_ids(&self) -> HashSet<i64> {
        let tasks = self.queue_state.tasks.lock().await;
        tasks.keys().map(|id| id.get()).collect()
    }
}
