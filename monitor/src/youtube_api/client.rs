//! Core YouTube API client functionality.

use crate::ChannelStats;
use crate::error::{FetchError, TransportError};
use crate::youtube_api::StatsSource;
use crate::youtube_api::channels::{ChannelListResponse, parse_count};
use http::Method;
use jiff::Timestamp;
use std::sync::Arc;
use tracing::instrument;

/// Where the public YouTube Data API lives.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Client for the public, read-only parts of the YouTube Data API v3.
///
/// Unlike the authenticated endpoints, channel statistics only need an API key, which is sent as
/// the `key` query parameter on every request. The client is cheap to clone; clones share the
/// underlying connection pool.
#[derive(Clone)]
pub struct YouTubeClient {
    api_key: Arc<str>,
    base_url: Arc<str>,
    client: reqwest::Client,
}

impl std::fmt::Debug for YouTubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the key
        f.debug_struct("YouTubeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl YouTubeClient {
    /// Creates a client that talks to [`DEFAULT_BASE_URL`] with the given API key.
    ///
    /// # Arguments
    ///
    /// * `api_key` - A YouTube Data API key
    /// * `client` - Shared HTTP client for making API requests
    pub fn new(api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_key: Arc::from(api_key.into()),
            base_url: Arc::from(DEFAULT_BASE_URL),
            client,
        }
    }

    /// Points the client at a different API host, such as a caching proxy or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = Arc::from(base_url.trim_end_matches('/'));
        self
    }

    /// Makes an HTTP request to the YouTube API with common error handling.
    ///
    /// Adds the API key to the query parameters and turns any non-success status into a
    /// [`TransportError::Status`] carrying the response body, which is where YouTube explains
    /// quota and key problems.
    #[instrument(skip(self, query_params), level = tracing::Level::TRACE)]
    async fn make_request(
        &self,
        method: Method,
        path: &str,
        query_params: &[(&str, &str)],
    ) -> Result<reqwest::Response, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .request(method, &url)
            .query(query_params)
            .query(&[("key", &*self.api_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TransportError::Status { status, body });
        }

        Ok(response)
    }

    /// Gets the current statistics and title of a single channel.
    ///
    /// Uses the `channels.list` API with `part=statistics,snippet`. Missing or malformed counters
    /// are reported as zero, and a missing title as `Unknown Channel`, but a response that lacks
    /// the statistics or snippet section altogether is an error.
    ///
    /// # API Cost
    ///
    /// This operation costs 1 quota unit per call.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self), err(Display))]
    pub async fn get_channel_stats(&self, channel_id: &str) -> Result<ChannelStats, FetchError> {
        let query_params = [("part", "statistics,snippet"), ("id", channel_id)];

        let response = self
            .make_request(Method::GET, "/youtube/v3/channels", &query_params)
            .await?;
        let body = response.bytes().await.map_err(TransportError::Request)?;
        let channels: ChannelListResponse =
            serde_json::from_slice(&body).map_err(TransportError::Decode)?;

        tracing::debug!(
            channel_id,
            total_results = channels.page_info.total_results,
            returned_items = channels.items.len(),
            "fetched channel statistics"
        );

        let Some(channel) = channels.items.into_iter().next() else {
            return Err(FetchError::NotFound {
                channel_id: channel_id.to_string(),
            });
        };
        let Some(statistics) = channel.statistics else {
            return Err(FetchError::DataMissing {
                channel_id: channel_id.to_string(),
                part: "statistics",
            });
        };
        let Some(snippet) = channel.snippet else {
            return Err(FetchError::DataMissing {
                channel_id: channel_id.to_string(),
                part: "snippet",
            });
        };

        if statistics.hidden_subscriber_count {
            tracing::warn!(channel_id, "channel hides its subscriber count");
        }

        Ok(ChannelStats {
            channel_id: channel.id.unwrap_or_else(|| channel_id.to_string()),
            channel_title: snippet
                .title
                .unwrap_or_else(|| "Unknown Channel".to_string()),
            subscriber_count: parse_count(statistics.subscriber_count.as_deref()),
            view_count: parse_count(statistics.view_count.as_deref()),
            video_count: parse_count(statistics.video_count.as_deref()),
            observed_at: Timestamp::now(),
        })
    }
}

impl StatsSource for YouTubeClient {
    async fn fetch(&self, channel_id: &str) -> Result<ChannelStats, FetchError> {
        self.get_channel_stats(channel_id).await
    }
}
