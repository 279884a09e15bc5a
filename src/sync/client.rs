//! gpodder.net web service client.
//!
//! The [`GpodderClient`] trait abstracts the five API calls the sync
//! cycle needs, enabling mock implementations in tests. The production
//! [`HttpGpodderClient`] speaks the gpodder.net API 2 JSON dialect with
//! HTTP basic authentication.

use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::{Error, SyncError};

/// Result alias for sync client operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Server-side subscription changes since a watermark
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubscriptionChanges {
    /// Feed URLs subscribed on other devices
    pub add: Vec<String>,
    /// Feed URLs unsubscribed on other devices
    pub remove: Vec<String>,
    /// New watermark to store for the next pull
    pub timestamp: i64,
}

/// Server response to a subscription upload
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubscriptionUpdateResult {
    /// New watermark to store for the next pull
    pub timestamp: i64,
    /// Pairs of (submitted URL, canonical URL) for feeds the server
    /// rewrote
    #[serde(default)]
    pub update_urls: Vec<(String, String)>,
}

/// One episode action in the gpodder.net wire format.
///
/// Timestamps travel as ISO 8601 strings without timezone (the API treats
/// them as UTC); [`epoch_to_wire_time`]/[`wire_time_to_epoch`] convert.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireEpisodeAction {
    /// Feed URL of the episode's podcast
    pub podcast: String,
    /// Enclosure URL identifying the episode
    pub episode: String,
    /// Originating device (only meaningful on upload)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Action name: "play", "download", "delete", "new"
    pub action: String,
    /// When the action happened, ISO 8601
    pub timestamp: String,
    /// Playback start position in seconds (play actions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<i64>,
    /// Playback position in seconds (play actions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// Total episode duration in seconds (play actions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

/// Episode actions downloaded from the server
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EpisodeActionChanges {
    /// Actions recorded by other devices since the watermark
    pub actions: Vec<WireEpisodeAction>,
    /// New watermark to store for the next download
    pub timestamp: i64,
}

/// Render a Unix timestamp in the wire's ISO 8601 form
pub fn epoch_to_wire_time(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// Parse a wire ISO 8601 timestamp back to Unix seconds.
///
/// Unparseable values map to 0, which loses the last-writer-wins race by
/// design rather than corrupting local state.
pub fn wire_time_to_epoch(wire: &str) -> i64 {
    chrono::NaiveDateTime::parse_from_str(wire, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// The API surface the sync cycle consumes
#[async_trait::async_trait]
pub trait GpodderClient: Send + Sync {
    /// Register or update this device's caption and type. Must succeed
    /// before other calls reference the device.
    async fn update_device_settings(
        &self,
        device_id: &str,
        caption: &str,
        device_type: &str,
    ) -> SyncResult<()>;

    /// Subscription changes from other devices since `since`
    async fn pull_subscriptions(
        &self,
        device_id: &str,
        since: Option<i64>,
    ) -> SyncResult<SubscriptionChanges>;

    /// Upload local subscribe/unsubscribe changes in one batch
    async fn update_subscriptions(
        &self,
        device_id: &str,
        add: &[String],
        remove: &[String],
    ) -> SyncResult<SubscriptionUpdateResult>;

    /// Episode actions from all devices since `since`
    async fn download_episode_actions(&self, since: Option<i64>) -> SyncResult<EpisodeActionChanges>;

    /// Upload a batch of local episode actions; returns the server's new
    /// watermark
    async fn upload_episode_actions(&self, actions: &[WireEpisodeAction]) -> SyncResult<i64>;
}

/// Production client for the gpodder.net API 2
pub struct HttpGpodderClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    server: String,
}

impl HttpGpodderClient {
    /// Build a client from the sync configuration.
    ///
    /// The configured server is normally a bare hostname ("gpodder.net");
    /// a full `http(s)://` URL is accepted for self-hosted instances and
    /// tests.
    pub fn new(config: &SyncConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("podcast-dl/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(Error::Network)?;

        let base_url = if config.server.contains("://") {
            config.server.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", config.server)
        };

        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            server: config.server.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Map an HTTP status to the sync error taxonomy. Authentication
    /// rejections get their own variant so the caller can disable sync
    /// instead of retrying.
    fn check_status(&self, status: reqwest::StatusCode, endpoint: &str) -> SyncResult<()> {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SyncError::Unauthorized {
                server: self.server.clone(),
            });
        }
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let response = self
            .http
            .get(self.url(endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::RequestFailed(e.to_string()))?;

        self.check_status(response.status(), endpoint)?;

        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::UnexpectedResponse(e.to_string()))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> SyncResult<T> {
        let response = self
            .http
            .post(self.url(endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::RequestFailed(e.to_string()))?;

        self.check_status(response.status(), endpoint)?;

        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::UnexpectedResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl GpodderClient for HttpGpodderClient {
    async fn update_device_settings(
        &self,
        device_id: &str,
        caption: &str,
        device_type: &str,
    ) -> SyncResult<()> {
        let endpoint = format!("/api/2/devices/{}/{}.json", self.username, device_id);
        let body = serde_json::json!({
            "caption": caption,
            "type": device_type,
        });

        let response = self
            .http
            .post(self.url(&endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::RequestFailed(e.to_string()))?;

        self.check_status(response.status(), &endpoint)
    }

    async fn pull_subscriptions(
        &self,
        device_id: &str,
        since: Option<i64>,
    ) -> SyncResult<SubscriptionChanges> {
        let endpoint = format!("/api/2/subscriptions/{}/{}.json", self.username, device_id);
        let query = vec![("since", since.unwrap_or(0).to_string())];
        self.get_json(&endpoint, &query).await
    }

    async fn update_subscriptions(
        &self,
        device_id: &str,
        add: &[String],
        remove: &[String],
    ) -> SyncResult<SubscriptionUpdateResult> {
        let endpoint = format!("/api/2/subscriptions/{}/{}.json", self.username, device_id);
        let body = serde_json::json!({
            "add": add,
            "remove": remove,
        });
        self.post_json(&endpoint, &body).await
    }

    async fn download_episode_actions(&self, since: Option<i64>) -> SyncResult<EpisodeActionChanges> {
        let endpoint = format!("/api/2/episodes/{}.json", self.username);
        let query = vec![
            ("since", since.unwrap_or(0).to_string()),
            ("aggregated", "true".to_string()),
        ];
        self.get_json(&endpoint, &query).await
    }

    async fn upload_episode_actions(&self, actions: &[WireEpisodeAction]) -> SyncResult<i64> {
        #[derive(Deserialize)]
        struct UploadResponse {
            timestamp: i64,
        }

        let endpoint = format!("/api/2/episodes/{}.json", self.username);
        let response: UploadResponse = self.post_json(&endpoint, &actions).await?;
        Ok(response.timestamp)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server_uri: &str) -> HttpGpodderClient {
        let config = SyncConfig {
            enabled: true,
            server: server_uri.to_string(),
            username: "alice".into(),
            password: "secret".into(),
            device_id: "laptop".into(),
            ..SyncConfig::default()
        };
        HttpGpodderClient::new(&config).unwrap()
    }

    #[test]
    fn wire_time_round_trips() {
        let epoch = 1_700_000_000;
        let wire = epoch_to_wire_time(epoch);
        assert_eq!(wire_time_to_epoch(&wire), epoch);
    }

    #[test]
    fn invalid_wire_time_maps_to_zero() {
        assert_eq!(
            wire_time_to_epoch("not a time"),
            0,
            "unparseable timestamps lose the LWW race instead of failing"
        );
    }

    #[test]
    fn bare_hostname_gets_https_scheme() {
        let client = test_client("gpodder.net");
        assert_eq!(client.base_url, "https://gpodder.net");
    }

    #[tokio::test]
    async fn pull_subscriptions_parses_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2/subscriptions/alice/laptop.json"))
            .and(query_param("since", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "add": ["https://example.com/new.xml"],
                "remove": ["https://example.com/old.xml"],
                "timestamp": 1234
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let changes = client
            .pull_subscriptions("laptop", Some(100))
            .await
            .unwrap();

        assert_eq!(changes.add, vec!["https://example.com/new.xml"]);
        assert_eq!(changes.remove, vec!["https://example.com/old.xml"]);
        assert_eq!(changes.timestamp, 1234);
    }

    #[tokio::test]
    async fn update_subscriptions_sends_batch_and_parses_rewrites() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2/subscriptions/alice/laptop.json"))
            .and(body_partial_json(serde_json::json!({
                "add": ["https://example.com/a.xml"],
                "remove": []
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "timestamp": 99,
                "update_urls": [["https://example.com/a.xml", "https://example.com/a-canonical.xml"]]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client
            .update_subscriptions("laptop", &["https://example.com/a.xml".to_string()], &[])
            .await
            .unwrap();

        assert_eq!(result.timestamp, 99);
        assert_eq!(result.update_urls.len(), 1);
        assert_eq!(result.update_urls[0].1, "https://example.com/a-canonical.xml");
    }

    #[tokio::test]
    async fn download_episode_actions_parses_wire_timestamps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2/episodes/alice.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "actions": [{
                    "podcast": "https://example.com/feed.xml",
                    "episode": "https://example.com/ep1.mp3",
                    "action": "play",
                    "timestamp": "2023-11-14T22:13:20",
                    "position": 120
                }],
                "timestamp": 555
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let changes = client.download_episode_actions(None).await.unwrap();

        assert_eq!(changes.actions.len(), 1);
        assert_eq!(changes.actions[0].action, "play");
        assert_eq!(changes.actions[0].position, Some(120));
        assert_eq!(changes.timestamp, 555);
        assert_eq!(
            wire_time_to_epoch(&changes.actions[0].timestamp),
            1_700_000_000
        );
    }

    #[tokio::test]
    async fn upload_episode_actions_returns_server_watermark() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2/episodes/alice.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "timestamp": 777,
                "update_urls": []
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let actions = vec![WireEpisodeAction {
            podcast: "https://example.com/feed.xml".into(),
            episode: "https://example.com/ep1.mp3".into(),
            device: Some("laptop".into()),
            action: "download".into(),
            timestamp: epoch_to_wire_time(1_700_000_000),
            started: None,
            position: None,
            total: None,
        }];

        let timestamp = client.upload_episode_actions(&actions).await.unwrap();
        assert_eq!(timestamp, 777);
    }

    #[tokio::test]
    async fn unauthorized_status_maps_to_unauthorized_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2/subscriptions/alice/laptop.json"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.pull_subscriptions("laptop", None).await.unwrap_err();
        assert!(
            matches!(err, SyncError::Unauthorized { .. }),
            "401 must map to Unauthorized, got: {err:?}"
        );
    }

    #[tokio::test]
    async fn server_error_maps_to_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2/devices/alice/laptop.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .update_device_settings("laptop", "My Laptop", "laptop")
            .await
            .unwrap_err();
        match err {
            SyncError::HttpStatus { status, .. } => assert_eq!(status, 503),
            other => panic!("expected HttpStatus, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_maps_to_unexpected_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2/episodes/alice.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.download_episode_actions(None).await.unwrap_err();
        assert!(matches!(err, SyncError::UnexpectedResponse(_)));
    }
}
