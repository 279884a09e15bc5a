//! Pluggable media URL resolution
//!
//! Some feeds publish indirect media URLs (video platforms, redirectors)
//! whose real download location must be looked up before each fetch.
//! Resolution is modeled as a trait object so consumers can plug in their
//! own lookup logic; the default implementation passes URLs through
//! unchanged.

use crate::error::Result;

/// Resolves an episode's published URL to the real download URL.
///
/// Called before every HTTP fetch attempt, so resolvers backed by
/// short-lived signed URLs get a fresh location on each retry.
#[async_trait::async_trait]
pub trait UrlResolver: Send + Sync {
    /// Resolve `url` to the URL that should actually be fetched.
    ///
    /// Returning the input unchanged is the common case.
    async fn resolve(&self, url: &str) -> Result<String>;

    /// Name of this resolver implementation (for logging)
    fn name(&self) -> &str;
}

/// Default resolver that returns every URL unchanged.
pub struct PassthroughResolver;

#[async_trait::async_trait]
impl UrlResolver for PassthroughResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_input_unchanged() {
        let resolver = PassthroughResolver;
        let url = "https://example.com/feed/episode.mp3";
        let resolved = tokio_test::block_on(resolver.resolve(url)).unwrap();
        assert_eq!(resolved, url);
    }

    #[test]
    fn passthrough_has_a_name() {
        assert_eq!(PassthroughResolver.name(), "passthrough");
    }
}
