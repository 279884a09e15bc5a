//! Feed fetching, parsing, and episode reconciliation.
//!
//! This module turns remote RSS/Atom documents into [`ParsedFeed`] values
//! and merges them into the locally persisted episode set. It supports both
//! RSS 2.0 and Atom feed formats; parsing tries RSS first and falls back to
//! Atom.

mod parse;
mod reconcile;

pub use parse::{FeedEpisode, ParsedFeed, parse_feed};
pub use reconcile::consume_updated_feed;

use crate::error::FeedError;

/// Fetch a feed document over HTTP.
///
/// The shared HTTP client carries no global timeout (episode downloads
/// legitimately run long), so feed fetches set one per request. Returns
/// the raw document body for [`parse_feed`].
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: std::time::Duration,
) -> Result<String, FeedError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|e| FeedError::FetchFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
