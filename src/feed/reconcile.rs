//! Episode reconciliation: merge a freshly parsed feed into the locally
//! persisted episode set.
//!
//! Matching is by GUID. Existing episodes are updated in place, genuinely
//! new entries are inserted (with a backdating heuristic deciding the new
//! flag), and episodes that vanished from the feed are purged unless they
//! are downloaded or currently downloading. Re-running with an unchanged
//! feed is a no-op: zero inserts, zero deletions.

use std::collections::{HashMap, HashSet};

use crate::config::FeedConfig;
use crate::db::{Database, NewEpisode, Podcast};
use crate::error::Result;
use crate::types::{
    DownloadStrategy, EpisodeId, EpisodeState, Event, FeedUpdateResult, PodcastId,
};

use super::parse::ParsedFeed;

/// Merge a parsed feed into the stored episode set of `podcast`.
///
/// `active_ids` is the set of episode IDs with a live download task;
/// those episodes are never purged even when the feed no longer lists
/// them. Events are emitted for each purged episode before its row is
/// deleted.
pub async fn consume_updated_feed(
    db: &Database,
    event_tx: &tokio::sync::broadcast::Sender<Event>,
    podcast: &Podcast,
    feed: &ParsedFeed,
    active_ids: &HashSet<i64>,
    config: &FeedConfig,
) -> Result<FeedUpdateResult> {
    let podcast_id = PodcastId(podcast.id);
    let mut result = FeedUpdateResult::default();

    // Channel metadata follows the feed
    db.update_podcast_meta(
        podcast_id,
        &feed.title,
        feed.link.as_deref(),
        feed.description.as_deref(),
        feed.cover_url.as_deref(),
    )
    .await?;

    // Sort incoming entries newest-first. Feeds with no explicit order (or
    // reversed order) would otherwise flag the wrong episodes as new.
    // Entries without a parseable date sort first and are stamped with the
    // fetch time when inserted.
    let now = chrono::Utc::now().timestamp();
    let mut candidates: Vec<&super::FeedEpisode> = feed.episodes.iter().collect();
    candidates.sort_by_key(|e| std::cmp::Reverse(e.published.map(|d| d.timestamp()).unwrap_or(now)));

    if let Some(max) = config.max_episodes {
        candidates.truncate(max);
    }

    let existing = db.list_episodes(podcast_id).await?;
    let by_guid: HashMap<&str, &crate::db::Episode> =
        existing.iter().map(|e| (e.guid.as_str(), e)).collect();
    let newest_known = existing.iter().map(|e| e.published).max();

    let strategy = DownloadStrategy::from_i32(podcast.download_strategy);
    let backdate_cutoff = newest_known.map(|n| n - config.backdate_grace_days * 86_400);

    let mut seen_guids: HashSet<&str> = HashSet::new();
    let mut new_marked = 0usize;

    for candidate in candidates {
        seen_guids.insert(candidate.guid.as_str());
        let published = candidate.published.map(|d| d.timestamp()).unwrap_or(now);

        if let Some(episode) = by_guid.get(candidate.guid.as_str()) {
            // Known episode: refresh mutable metadata, leave the new flag
            // and download state alone
            db.update_episode_from_feed(
                EpisodeId(episode.id),
                &candidate.title,
                candidate.description.as_deref(),
                &candidate.url,
                candidate.link.as_deref(),
                published,
                candidate.duration_secs,
                if candidate.file_size > 0 {
                    candidate.file_size
                } else {
                    episode.file_size
                },
                candidate.mime_type.as_deref(),
            )
            .await?;
            result.updated_episodes += 1;
            continue;
        }

        // Genuinely new entry. Backdated entries (older than the newest
        // known episode by more than the grace period) are inserted
        // without the new flag so bulk-imported feed tails don't flood
        // the new-episodes list.
        let mut is_new = match backdate_cutoff {
            Some(cutoff) => published >= cutoff,
            None => true,
        };

        // Only-keep-latest podcasts flag at most one new episode per pass
        if is_new && strategy == DownloadStrategy::OnlyLatest && new_marked > 0 {
            is_new = false;
        }

        if is_new {
            new_marked += 1;
        }

        db.insert_episode(&NewEpisode {
            podcast_id,
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            url: candidate.url.clone(),
            guid: candidate.guid.clone(),
            link: candidate.link.clone(),
            published,
            duration_secs: candidate.duration_secs,
            file_size: candidate.file_size,
            mime_type: candidate.mime_type.clone(),
            is_new,
            download_filename: candidate.default_filename(),
        })
        .await?;
        result.new_episodes += 1;
    }

    // Purge episodes that vanished from the feed, unless they are
    // downloaded or a download task is running for them right now
    for episode in &existing {
        if seen_guids.contains(episode.guid.as_str()) {
            continue;
        }
        if episode.state == EpisodeState::Downloaded.to_i32() {
            continue;
        }
        if active_ids.contains(&episode.id) {
            continue;
        }

        event_tx
            .send(Event::EpisodeRemoved {
                id: EpisodeId(episode.id),
                guid: episode.guid.clone(),
            })
            .ok();
        db.delete_episode(EpisodeId(episode.id)).await?;
        result.removed_episodes += 1;
    }

    // Retention limit applies at the database level after the merge
    if let Some(max) = config.max_episodes {
        let trimmed = db.enforce_max_episodes(podcast_id, max).await?;
        result.removed_episodes += trimmed as usize;
    }

    db.set_podcast_checked(podcast_id, None).await?;
    result.checked_at = Some(chrono::Utc::now());

    tracing::info!(
        podcast_id = podcast.id,
        new = result.new_episodes,
        updated = result.updated_episodes,
        removed = result.removed_episodes,
        "Feed update merged"
    );

    Ok(result)
}
