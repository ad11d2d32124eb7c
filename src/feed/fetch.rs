// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use url::Url;

use crate::error::{FeedError, FetchError};
use crate::http::{HttpClient, HttpError, ReqwestClient};

use super::model::{Episode, Feed};
use super::parse::parse_feed;

/// Per-URL outcome of a fetch attempt
pub type FetchResult = Result<(Feed, Vec<Episode>), FeedError>;

/// Options for feed retrieval
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Overall timeout per request
    pub timeout: Duration,
    /// Concurrency ceiling for `fetch_many`
    pub max_concurrent: usize,
    /// Maximum episodes retained per feed (None = all)
    pub max_episodes: Option<usize>,
    /// User-Agent header for requests
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_concurrent: 8,
            max_episodes: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Default User-Agent sent with feed and download requests
pub fn default_user_agent() -> String {
    concat!("feedpull/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Retrieves and parses RSS/Atom feeds.
///
/// Generic over [`HttpClient`] so tests can run against in-memory mocks.
pub struct FeedFetcher<C: HttpClient = ReqwestClient> {
    client: C,
    options: FetchOptions,
}

impl FeedFetcher<ReqwestClient> {
    /// Create a fetcher backed by a reqwest client configured from the options
    pub fn new(options: FetchOptions) -> Self {
        let client = ReqwestClient::new(&options.user_agent, options.timeout);
        Self { client, options }
    }
}

impl Default for FeedFetcher<ReqwestClient> {
    fn default() -> Self {
        Self::new(FetchOptions::default())
    }
}

impl<C: HttpClient> FeedFetcher<C> {
    /// Create a fetcher with a custom HTTP client
    pub fn with_client(client: C, options: FetchOptions) -> Self {
        Self { client, options }
    }

    /// Fetch and parse a single feed.
    ///
    /// Network failures are classified as [`FetchError`], document
    /// failures as [`crate::ParseError`]; both carry the offending URL.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let feed_url = Url::parse(url).map_err(|e| {
            FeedError::Fetch(FetchError::InvalidUrl {
                url: url.to_string(),
                source: e,
            })
        })?;

        let response = self.client.get_bytes(url).await.map_err(|e| match e {
            HttpError::TimedOut => FetchError::TimedOut {
                url: url.to_string(),
            },
            HttpError::Transport(source) => FetchError::RequestFailed {
                url: url.to_string(),
                source,
            },
        })?;

        if !(200..300).contains(&response.status) {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            }
            .into());
        }

        let (feed, mut episodes) = parse_feed(&response.body, &feed_url)?;

        if let Some(limit) = self.options.max_episodes {
            episodes.truncate(limit);
        }

        Ok((feed, episodes))
    }

    /// Fetch several feeds concurrently.
    ///
    /// Requests run in parallel up to the configured concurrency
    /// ceiling; the result sequence matches the input sequence in
    /// length and order regardless of completion order. One URL's
    /// failure never aborts the others.
    pub async fn fetch_many<I, S>(&self, urls: I) -> Vec<FetchResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let concurrency = self.options.max_concurrent.max(1);

        stream::iter(urls)
            .map(|url| async move { self.fetch(url.as_ref()).await })
            .buffered(concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::http::{BufferedResponse, ByteStream, StreamingResponse};
    use async_trait::async_trait;
    use bytes::Bytes;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Mock Podcast</title>
    <description>Served from a mock</description>
    <item>
      <title>Episode 1</title>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    /// Routes responses by URL substring: "timeout" simulates a network
    /// failure, "missing" a 404, "broken" a malformed document.
    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<BufferedResponse, HttpError> {
            if url.contains("timeout") {
                return Err(HttpError::TimedOut);
            }
            if url.contains("missing") {
                return Ok(BufferedResponse {
                    status: 404,
                    body: Bytes::from_static(b"Not Found"),
                });
            }
            if url.contains("broken") {
                return Ok(BufferedResponse {
                    status: 200,
                    body: Bytes::from_static(b"<rss><channel><title>Trunc"),
                });
            }
            Ok(BufferedResponse {
                status: 200,
                body: Bytes::from(SAMPLE_RSS),
            })
        }

        async fn get_stream(&self, _url: &str) -> Result<StreamingResponse, HttpError> {
            let stream: ByteStream = Box::pin(futures::stream::empty());
            Ok(StreamingResponse {
                status: 200,
                content_length: None,
                body: stream,
            })
        }
    }

    fn fetcher() -> FeedFetcher<MockHttpClient> {
        FeedFetcher::with_client(MockHttpClient, FetchOptions::default())
    }

    #[tokio::test]
    async fn fetch_returns_feed_keyed_by_requested_url() {
        let (feed, episodes) = fetcher()
            .fetch("https://example.com/feed.xml")
            .await
            .unwrap();

        assert_eq!(feed.key.as_str(), "https://example.com/feed.xml");
        assert_eq!(feed.title, "Mock Podcast");
        assert_eq!(episodes.len(), 2);
        assert!(episodes.iter().all(|e| e.feed_key == feed.key));
    }

    #[tokio::test]
    async fn fetch_classifies_timeouts_as_fetch_errors() {
        let result = fetcher().fetch("https://timeout.example.com/feed").await;

        match result {
            Err(FeedError::Fetch(FetchError::TimedOut { url })) => {
                assert_eq!(url, "https://timeout.example.com/feed");
            }
            other => panic!("Expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_classifies_http_status_as_fetch_error() {
        let result = fetcher().fetch("https://example.com/missing.xml").await;

        match result {
            Err(FeedError::Fetch(FetchError::HttpStatus { status, .. })) => {
                assert_eq!(status, 404);
            }
            other => panic!("Expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_classifies_malformed_documents_as_parse_errors() {
        let result = fetcher().fetch("https://example.com/broken.xml").await;

        match result {
            Err(FeedError::Parse(ParseError::InvalidXml { url, .. })) => {
                assert_eq!(url, "https://example.com/broken.xml");
            }
            other => panic!("Expected InvalidXml, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_rejects_invalid_urls() {
        let result = fetcher().fetch("not a url").await;

        assert!(matches!(
            result,
            Err(FeedError::Fetch(FetchError::InvalidUrl { .. }))
        ));
    }

    #[tokio::test]
    async fn fetch_respects_episode_limit() {
        let options = FetchOptions {
            max_episodes: Some(1),
            ..FetchOptions::default()
        };
        let fetcher = FeedFetcher::with_client(MockHttpClient, options);

        let (_, episodes) = fetcher.fetch("https://example.com/feed.xml").await.unwrap();

        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "Episode 1");
    }

    #[tokio::test]
    async fn fetch_many_preserves_input_order_across_failures() {
        let urls = [
            "https://example.com/a.xml",
            "https://timeout.example.com/b.xml",
            "https://example.com/broken.xml",
            "https://example.com/c.xml",
        ];

        let results = fetcher().fetch_many(urls).await;

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(FeedError::Fetch(FetchError::TimedOut { .. }))
        ));
        assert!(matches!(results[2], Err(FeedError::Parse(_))));
        assert!(results[3].is_ok());

        // Errors keep the offending URL addressable for the caller
        assert_eq!(
            results[1].as_ref().unwrap_err().url(),
            "https://timeout.example.com/b.xml"
        );
    }

    #[tokio::test]
    async fn fetch_many_with_empty_input_returns_empty() {
        let results = fetcher().fetch_many(Vec::<String>::new()).await;
        assert!(results.is_empty());
    }
}
