//! Feed document parsing: RSS 2.0 with Atom fallback.

use chrono::{DateTime, Utc};

use crate::error::FeedError;
use crate::utils::sanitize_media_filename;

/// Metadata and episode candidates parsed from one feed document
#[derive(Clone, Debug)]
pub struct ParsedFeed {
    /// Channel title
    pub title: String,
    /// Channel website link
    pub link: Option<String>,
    /// Channel description
    pub description: Option<String>,
    /// Cover art URL
    pub cover_url: Option<String>,
    /// Episode candidates, in document order
    pub episodes: Vec<FeedEpisode>,
}

/// One feed entry that resolved to a usable media enclosure
#[derive(Clone, Debug)]
pub struct FeedEpisode {
    /// Episode title; falls back to the enclosure URL's basename
    pub title: String,
    /// Show notes from description/summary/content
    pub description: Option<String>,
    /// Media enclosure URL
    pub url: String,
    /// GUID; falls back to the enclosure URL
    pub guid: String,
    /// Episode web page link
    pub link: Option<String>,
    /// Publish date, when the feed declared a parseable one
    pub published: Option<DateTime<Utc>>,
    /// Duration in seconds from itunes extensions
    pub duration_secs: Option<i64>,
    /// Enclosure length in bytes (0 when not declared)
    pub file_size: i64,
    /// Enclosure mimetype
    pub mime_type: Option<String>,
}

impl FeedEpisode {
    /// Filename this episode's download will be stored under
    pub fn default_filename(&self) -> String {
        let base = sanitize_media_filename(&self.title);
        // Derive the extension from the enclosure URL; the download task
        // corrects it later if the server reports a better mimetype
        let ext = std::path::Path::new(&self.url)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !crate::utils::is_junk_extension(e));
        match ext {
            Some(ext) => format!("{base}.{ext}"),
            None => base,
        }
    }
}

/// Parse a feed document, trying RSS 2.0 first and falling back to Atom.
///
/// Entries without a usable media enclosure are silently skipped — they
/// cannot be represented as episodes.
pub fn parse_feed(content: &str) -> Result<ParsedFeed, FeedError> {
    match parse_as_rss(content) {
        Ok(feed) => {
            tracing::debug!(episodes = feed.episodes.len(), "Parsed feed as RSS");
            Ok(feed)
        }
        Err(rss_err) => {
            tracing::debug!(error = %rss_err, "Failed to parse as RSS, trying Atom");
            match parse_as_atom(content) {
                Ok(feed) => {
                    tracing::debug!(episodes = feed.episodes.len(), "Parsed feed as Atom");
                    Ok(feed)
                }
                Err(atom_err) => Err(FeedError::ParseFailed(format!(
                    "not RSS ({rss_err}) and not Atom ({atom_err})"
                ))),
            }
        }
    }
}

/// Ranking for enclosure candidates. Audio beats video beats anything
/// unknown; images never win over real media.
fn enclosure_score(mime_type: Option<&str>) -> i32 {
    match mime_type {
        Some(m) if m.starts_with("audio/") => 3,
        Some(m) if m.starts_with("video/") => 2,
        Some(m) if m.starts_with("image/") => -1,
        Some(_) => 1,
        None => 0,
    }
}

/// Whether a bare link plausibly points at a media file (used when an item
/// has no enclosure element at all)
fn link_looks_like_media(link: &str) -> bool {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(crate::utils::is_media_extension)
        .unwrap_or(false)
}

/// Title fallback: the basename of the enclosure URL
fn title_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| crate::utils::filename_from_url(&u))
        .unwrap_or_else(|| url.to_string())
}

/// Parse an itunes duration value: plain seconds, "MM:SS", or "HH:MM:SS"
fn parse_duration(value: &str) -> Option<i64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    let nums: Option<Vec<i64>> = parts.iter().map(|p| p.parse::<i64>().ok()).collect();
    let nums = nums?;
    match nums.as_slice() {
        [secs] => Some(*secs),
        [mins, secs] => Some(mins * 60 + secs),
        [hours, mins, secs] => Some(hours * 3600 + mins * 60 + secs),
        _ => None,
    }
}

/// Relaxed publish date parsing: RFC 2822 first, then a few common
/// non-conforming formats feeds use in the wild
fn parse_pub_date(date_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S %z", "%a, %d %b %Y %H:%M:%S"] {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    None
}

/// Parse feed content as RSS 2.0
fn parse_as_rss(content: &str) -> Result<ParsedFeed, FeedError> {
    let channel = content
        .parse::<rss::Channel>()
        .map_err(|e| FeedError::ParseFailed(format!("RSS parse error: {e}")))?;

    let cover_url = channel
        .image()
        .map(|img| img.url().to_string())
        .or_else(|| {
            channel
                .itunes_ext()
                .and_then(|ext| ext.image())
                .map(String::from)
        });

    let episodes = channel
        .items()
        .iter()
        .filter_map(|item| {
            // Prefer the enclosure; fall back to the item link when it
            // points at a media file. Image enclosures are rejected so a
            // cover-art enclosure doesn't shadow a media link.
            let (url, length, mime) = match item.enclosure() {
                Some(enc) if enclosure_score(Some(enc.mime_type())) > 0 => (
                    enc.url().to_string(),
                    enc.length().parse::<i64>().unwrap_or(0),
                    Some(enc.mime_type().to_string()).filter(|m| !m.is_empty()),
                ),
                _ => {
                    let link = item.link()?;
                    if !link_looks_like_media(link) {
                        return None;
                    }
                    (link.to_string(), 0, None)
                }
            };

            let title = item
                .title()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .unwrap_or_else(|| title_from_url(&url));

            let guid = item
                .guid()
                .map(|g| g.value().to_string())
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| url.clone());

            let itunes = item.itunes_ext();

            Some(FeedEpisode {
                title,
                description: item.description().map(String::from),
                guid,
                link: item.link().map(String::from),
                published: item.pub_date().and_then(parse_pub_date),
                duration_secs: itunes
                    .and_then(|ext| ext.duration())
                    .and_then(parse_duration),
                file_size: length,
                mime_type: mime,
                url,
            })
        })
        .collect();

    Ok(ParsedFeed {
        title: channel.title().to_string(),
        link: Some(channel.link().to_string()).filter(|l| !l.is_empty()),
        description: Some(channel.description().to_string()).filter(|d| !d.is_empty()),
        cover_url,
        episodes,
    })
}

/// Parse feed content as Atom
fn parse_as_atom(content: &str) -> Result<ParsedFeed, FeedError> {
    let feed = atom_syndication::Feed::read_from(content.as_bytes())
        .map_err(|e| FeedError::ParseFailed(format!("Atom parse error: {e}")))?;

    let episodes = feed
        .entries()
        .iter()
        .filter_map(|entry| {
            // Pick the best enclosure link; audio/video beat images and
            // untyped links
            let enclosure = entry
                .links()
                .iter()
                .filter(|link| link.rel() == "enclosure")
                .max_by_key(|link| enclosure_score(link.mime_type()))
                .filter(|link| enclosure_score(link.mime_type()) > 0)?;

            let url = enclosure.href().to_string();
            let title = {
                let t = entry.title().as_str().trim();
                if t.is_empty() {
                    title_from_url(&url)
                } else {
                    t.to_string()
                }
            };

            let guid = if entry.id().is_empty() {
                url.clone()
            } else {
                entry.id().to_string()
            };

            let description = entry.summary().map(|s| s.as_str().to_string()).or_else(|| {
                entry
                    .content()
                    .and_then(|c| c.value().map(|v| v.to_string()))
            });

            let page_link = entry
                .links()
                .iter()
                .find(|link| link.rel() == "alternate")
                .map(|link| link.href().to_string());

            Some(FeedEpisode {
                title,
                description,
                guid,
                link: page_link,
                published: entry
                    .published()
                    .or_else(|| Some(entry.updated()))
                    .map(|dt| dt.with_timezone(&Utc)),
                duration_secs: None,
                file_size: enclosure
                    .length()
                    .and_then(|l| l.parse::<i64>().ok())
                    .unwrap_or(0),
                mime_type: enclosure.mime_type().map(String::from),
                url,
            })
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title().as_str().to_string(),
        link: feed
            .links()
            .iter()
            .find(|link| link.rel() == "alternate")
            .map(|link| link.href().to_string()),
        description: feed.subtitle().map(|s| s.as_str().to_string()),
        cover_url: feed.logo().map(String::from),
        episodes,
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 1</title>
      <description>First episode</description>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <guid>ep1-guid</guid>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
      <itunes:duration>30:00</itunes:duration>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn rss_feed_extracts_channel_metadata() {
        let feed = parse_feed(SAMPLE_RSS).unwrap();

        assert_eq!(feed.title, "Test Podcast");
        assert_eq!(feed.description.as_deref(), Some("A test podcast"));
        assert_eq!(feed.link.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn rss_feed_extracts_episodes_with_fields() {
        let feed = parse_feed(SAMPLE_RSS).unwrap();
        assert_eq!(feed.episodes.len(), 2);

        let ep1 = &feed.episodes[0];
        assert_eq!(ep1.title, "Episode 1");
        assert_eq!(ep1.guid, "ep1-guid");
        assert_eq!(ep1.url, "https://example.com/ep1.mp3");
        assert_eq!(ep1.file_size, 1_234_567);
        assert_eq!(ep1.duration_secs, Some(1800));
        assert!(ep1.published.is_some());

        let ep2 = &feed.episodes[1];
        assert!(ep2.published.is_none());
        assert_eq!(ep2.file_size, 0);
    }

    #[test]
    fn missing_guid_falls_back_to_enclosure_url() {
        let feed_xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><description>D</description>
  <item>
    <title>No Guid</title>
    <enclosure url="https://example.com/nog.mp3" type="audio/mpeg"/>
  </item>
</channel></rss>"#;

        let feed = parse_feed(feed_xml).unwrap();
        assert_eq!(feed.episodes[0].guid, "https://example.com/nog.mp3");
    }

    #[test]
    fn missing_title_falls_back_to_url_basename() {
        let feed_xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><description>D</description>
  <item>
    <enclosure url="https://example.com/shows/great-episode.mp3" type="audio/mpeg"/>
  </item>
</channel></rss>"#;

        let feed = parse_feed(feed_xml).unwrap();
        assert_eq!(feed.episodes[0].title, "great-episode.mp3");
    }

    #[test]
    fn items_without_enclosure_or_media_link_are_skipped() {
        let feed_xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><description>D</description>
  <item><title>Text only</title><link>https://example.com/blog-post</link></item>
  <item><title>Real</title><enclosure url="https://example.com/e.mp3" type="audio/mpeg"/></item>
</channel></rss>"#;

        let feed = parse_feed(feed_xml).unwrap();
        assert_eq!(feed.episodes.len(), 1);
        assert_eq!(feed.episodes[0].title, "Real");
    }

    #[test]
    fn media_link_substitutes_for_missing_enclosure() {
        let feed_xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><description>D</description>
  <item><title>Linked</title><link>https://example.com/show.mp3</link></item>
</channel></rss>"#;

        let feed = parse_feed(feed_xml).unwrap();
        assert_eq!(feed.episodes.len(), 1);
        assert_eq!(feed.episodes[0].url, "https://example.com/show.mp3");
    }

    #[test]
    fn image_enclosure_does_not_become_an_episode() {
        let feed_xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><description>D</description>
  <item><title>Cover only</title>
    <enclosure url="https://example.com/cover.jpg" type="image/jpeg"/>
  </item>
</channel></rss>"#;

        let feed = parse_feed(feed_xml).unwrap();
        assert!(
            feed.episodes.is_empty(),
            "an image enclosure alone is not a usable episode"
        );
    }

    #[test]
    fn atom_feed_parses_as_fallback() {
        let atom_xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <id>urn:feed:1</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Atom Episode</title>
    <id>urn:entry:1</id>
    <updated>2024-01-02T00:00:00Z</updated>
    <published>2024-01-01T10:00:00Z</published>
    <link rel="enclosure" href="https://example.com/atom-ep.mp3"
          type="audio/mpeg" length="999"/>
    <link rel="alternate" href="https://example.com/atom-ep"/>
  </entry>
</feed>"#;

        let feed = parse_feed(atom_xml).unwrap();
        assert_eq!(feed.title, "Atom Cast");
        assert_eq!(feed.episodes.len(), 1);

        let ep = &feed.episodes[0];
        assert_eq!(ep.title, "Atom Episode");
        assert_eq!(ep.guid, "urn:entry:1");
        assert_eq!(ep.url, "https://example.com/atom-ep.mp3");
        assert_eq!(ep.file_size, 999);
        assert_eq!(ep.link.as_deref(), Some("https://example.com/atom-ep"));
    }

    #[test]
    fn atom_prefers_audio_enclosure_over_image() {
        let atom_xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <id>urn:feed:1</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Two enclosures</title>
    <id>urn:entry:2</id>
    <updated>2024-01-02T00:00:00Z</updated>
    <link rel="enclosure" href="https://example.com/cover.png" type="image/png"/>
    <link rel="enclosure" href="https://example.com/show.m4a" type="audio/mp4"/>
  </entry>
</feed>"#;

        let feed = parse_feed(atom_xml).unwrap();
        assert_eq!(feed.episodes[0].url, "https://example.com/show.m4a");
    }

    #[test]
    fn garbage_input_fails_with_parse_error() {
        let err = parse_feed("this is not xml at all").unwrap_err();
        assert!(matches!(err, FeedError::ParseFailed(_)));
    }

    // --- helpers ---

    #[test]
    fn duration_parses_all_forms() {
        assert_eq!(parse_duration("90"), Some(90));
        assert_eq!(parse_duration("30:00"), Some(1800));
        assert_eq!(parse_duration("1:02:03"), Some(3723));
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
    }

    #[test]
    fn pub_date_accepts_rfc2822_and_rfc3339() {
        assert!(parse_pub_date("Mon, 01 Jan 2024 12:00:00 +0000").is_some());
        assert!(parse_pub_date("2024-01-01T12:00:00+00:00").is_some());
        assert!(parse_pub_date("not a date").is_none());
    }

    #[test]
    fn default_filename_keeps_usable_extension() {
        let ep = FeedEpisode {
            title: "My Show".into(),
            description: None,
            url: "https://example.com/audio/ep.mp3".into(),
            guid: "g".into(),
            link: None,
            published: None,
            duration_secs: None,
            file_size: 0,
            mime_type: None,
        };
        assert_eq!(ep.default_filename(), "My Show.mp3");
    }

    #[test]
    fn default_filename_drops_junk_extension() {
        let ep = FeedEpisode {
            title: "Weird".into(),
            description: None,
            url: "https://example.com/watch?v=abc".into(),
            guid: "g".into(),
            link: None,
            published: None,
            duration_secs: None,
            file_size: 0,
            mime_type: None,
        };
        assert_eq!(ep.default_filename(), "Weird");
    }
}
