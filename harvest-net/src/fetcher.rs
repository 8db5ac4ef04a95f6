//! Concurrent source fetching
//!
//! Retrieves raw text from HTTP endpoints and channel preview pages through a
//! bounded pool. A failing source never fails the batch: it simply
//! contributes nothing.

use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::fmt;
use tracing::{debug, info, warn};

use harvest_core::ProgressSink;

use crate::channel::{extract_messages, preview_url};
use crate::{create_client, FetchConfig, NetError};

/// A place candidates are published
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Plain HTTP endpoint; the whole body is one fragment
    Http(String),
    /// Channel name or URL; every message is one fragment
    Channel(String),
}

impl Source {
    /// URL actually requested for this source
    pub fn url(&self) -> String {
        match self {
            Source::Http(url) => url.clone(),
            Source::Channel(channel) => preview_url(channel),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Http(url) => write!(f, "http:{}", url),
            Source::Channel(channel) => write!(f, "channel:{}", channel),
        }
    }
}

/// Text fragments fetched from one source
#[derive(Debug, Clone)]
pub struct RawBlob {
    pub source: Source,
    pub fragments: Vec<String>,
}

/// Fetches every source through one shared client
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
    config: FetchConfig,
}

impl SourceFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, NetError> {
        let client = create_client(&config)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch all sources concurrently.
    ///
    /// At most `max_concurrent` requests are in flight. Results arrive in
    /// completion order, and `progress` fires exactly once per source.
    pub async fn fetch_all(
        &self,
        channels: &[String],
        http_sources: &[String],
        progress: &dyn ProgressSink,
    ) -> Vec<RawBlob> {
        let sources: Vec<Source> = http_sources
            .iter()
            .cloned()
            .map(Source::Http)
            .chain(channels.iter().cloned().map(Source::Channel))
            .collect();

        let total = sources.len();
        if total == 0 {
            return Vec::new();
        }

        info!(
            "Fetching {} sources ({} http, {} channels) with {} workers",
            total,
            http_sources.len(),
            channels.len(),
            self.config.max_concurrent
        );

        let mut pending = stream::iter(sources)
            .map(|source| async move {
                let fragments = self.fetch_source(&source).await;
                (source, fragments)
            })
            .buffer_unordered(self.config.max_concurrent.max(1));

        let mut blobs = Vec::new();
        let mut completed = 0;

        while let Some((source, fragments)) = pending.next().await {
            completed += 1;
            progress.advance(completed, total);

            if fragments.is_empty() {
                debug!("Source {} produced no content", source);
                continue;
            }
            blobs.push(RawBlob { source, fragments });
        }

        info!("Fetched content from {}/{} sources", blobs.len(), total);
        blobs
    }

    /// Fetch one source into its fragments
    pub async fn fetch_source(&self, source: &Source) -> Vec<String> {
        match source {
            Source::Http(url) => fetch_with_retry(&self.client, url, &self.config)
                .await
                .filter(|body| !body.is_empty())
                .into_iter()
                .collect(),
            Source::Channel(channel) => self.fetch_channel(channel).await,
        }
    }

    /// Fetch a channel preview page and split it into messages
    pub async fn fetch_channel(&self, channel: &str) -> Vec<String> {
        let url = preview_url(channel);

        match fetch_with_retry(&self.client, &url, &self.config).await {
            Some(html) => {
                let messages = extract_messages(&html);
                debug!("Channel {} returned {} messages", channel, messages.len());
                messages
            }
            None => Vec::new(),
        }
    }
}

/// Fetch a URL, retrying failed attempts after a fixed backoff.
///
/// Returns `None` once every attempt has failed.
pub async fn fetch_with_retry(client: &Client, url: &str, config: &FetchConfig) -> Option<String> {
    let attempts = config.max_retries.max(1);

    for attempt in 1..=attempts {
        match fetch_once(client, url).await {
            Ok(body) => return Some(body),
            Err(e) => {
                debug!("Attempt {} failed for {}: {}", attempt, url, e);
                if attempt < attempts {
                    tokio::time::sleep(config.retry_backoff).await;
                }
            }
        }
    }

    warn!("Failed to fetch {} after {} attempts", url, attempts);
    None
}

async fn fetch_once(client: &Client, url: &str) -> Result<String, NetError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(NetError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> FetchConfig {
        FetchConfig::default()
            .with_retries(3)
            .with_backoff(Duration::from_millis(10))
            .with_concurrency(4)
    }

    #[tokio::test]
    async fn test_fetch_http_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("vmess://abc\ntrojan://x@1.1.1.1:443"))
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(test_config()).unwrap();
        let http = vec![format!("{}/list", server.uri())];
        let blobs = fetcher.fetch_all(&[], &http, &harvest_core::NoProgress).await;

        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].fragments.len(), 1);
        assert!(blobs[0].fragments[0].contains("trojan://"));
        assert_eq!(blobs[0].source, Source::Http(http[0].clone()));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = create_client(&test_config()).unwrap();
        let body = fetch_with_retry(&client, &format!("{}/flaky", server.uri()), &test_config()).await;
        assert_eq!(body.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(test_config()).unwrap();
        let http = vec![format!("{}/gone", server.uri())];
        let blobs = fetcher.fetch_all(&[], &http, &harvest_core::NoProgress).await;
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let config = FetchConfig {
            timeout_secs: 1,
            ..test_config().with_retries(1)
        };
        let fetcher = SourceFetcher::new(config).unwrap();
        let fragments = fetcher
            .fetch_source(&Source::Http(format!("{}/slow", server.uri())))
            .await;
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_channel_messages() {
        let server = MockServer::start().await;
        let html = r#"<html><body>
            <div class="tgme_widget_message_text">one ss://YWVzOnB3@1.2.3.4:8388</div>
            <div class="tgme_widget_message_text">two</div>
        </body></html>"#;
        Mock::given(method("GET"))
            .and(path("/s/configs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(test_config()).unwrap();
        let channels = vec![format!("{}/s/configs", server.uri())];
        let blobs = fetcher.fetch_all(&channels, &[], &harvest_core::NoProgress).await;

        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].fragments.len(), 2);
        assert!(matches!(blobs[0].source, Source::Channel(_)));
    }

    #[tokio::test]
    async fn test_progress_fires_once_per_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("text"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(test_config()).unwrap();
        let http = vec![
            format!("{}/ok", server.uri()),
            format!("{}/broken", server.uri()),
            format!("{}/ok", server.uri()),
        ];
        let channels = vec![format!("{}/s/missing", server.uri())];

        let calls = AtomicUsize::new(0);
        let last = AtomicUsize::new(0);
        let sink = |completed: usize, total: usize| {
            assert_eq!(total, 4);
            calls.fetch_add(1, Ordering::SeqCst);
            last.store(completed, Ordering::SeqCst);
        };

        let blobs = fetcher.fetch_all(&channels, &http, &sink).await;

        assert_eq!(blobs.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(last.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_slow_source_does_not_block_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fast"))
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(test_config()).unwrap();
        let http = vec![
            format!("{}/slow", server.uri()),
            format!("{}/fast", server.uri()),
            format!("{}/fast", server.uri()),
            format!("{}/fast", server.uri()),
        ];

        let calls = AtomicUsize::new(0);
        let blobs = fetcher
            .fetch_all(&[], &http, &|_completed: usize, _total: usize| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(blobs.len(), 4);
        assert!(blobs[..3].iter().all(|b| b.fragments[0] == "fast"));
        assert_eq!(blobs[3].fragments[0], "slow");
    }

    #[tokio::test]
    async fn test_requests_in_flight_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("body")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let fetcher = SourceFetcher::new(test_config().with_concurrency(2)).unwrap();
        let http: Vec<String> = (0..4).map(|i| format!("{}/list/{}", server.uri(), i)).collect();

        let started = std::time::Instant::now();
        let blobs = fetcher.fetch_all(&[], &http, &harvest_core::NoProgress).await;

        assert_eq!(blobs.len(), 4);
        // Two workers over four delayed sources need at least two rounds
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_no_sources() {
        let fetcher = SourceFetcher::new(test_config()).unwrap();
        let blobs = fetcher.fetch_all(&[], &[], &harvest_core::NoProgress).await;
        assert!(blobs.is_empty());
    }
}
