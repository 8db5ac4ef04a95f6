//! HTTP client construction for source fetching
//!
//! Builds the shared reqwest client, optionally routed through an upstream
//! proxy, with a per-request timeout and a browser user agent.

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

use harvest_core::FetcherSettings;

/// Fetch configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per source (at least one is always made)
    pub max_retries: u32,
    /// Maximum requests in flight
    pub max_concurrent: usize,
    /// Fixed user agent; rotated from a built-in list when `None`
    pub user_agent: Option<String>,
    /// Optional upstream proxy URL
    pub proxy: Option<String>,
    /// Pause between failed attempts
    pub retry_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_retries: 3,
            max_concurrent: 20,
            user_agent: None,
            proxy: None,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl From<&FetcherSettings> for FetchConfig {
    fn from(settings: &FetcherSettings) -> Self {
        Self {
            timeout_secs: settings.timeout,
            max_retries: settings.max_retries,
            max_concurrent: settings.max_workers.max(1),
            user_agent: settings.user_agent.clone(),
            proxy: settings.proxy.clone(),
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

impl FetchConfig {
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// The configured agent, or one drawn from the rotation list
    pub fn resolve_user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or_else(|| random_user_agent())
    }
}

/// Errors from source networking
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Browser agents used when no fixed agent is configured
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:129.0) Gecko/20100101 Firefox/129.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Mobile Safari/537.36",
];

pub fn random_user_agent() -> &'static str {
    use rand::seq::SliceRandom;
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Create the HTTP client used for every source
pub fn create_client(config: &FetchConfig) -> Result<Client, NetError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.resolve_user_agent());

    if let Some(proxy_url) = &config.proxy {
        let proxy = Proxy::all(proxy_url).map_err(|e| NetError::ClientBuild(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}
