use crate::config::FetchConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use rand::Rng;
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Retrieves raw page content for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP page fetcher with a per-call timeout and a shared per-origin rate limit.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        let per_second = NonZeroU32::new(config.requests_per_second)
            .ok_or_else(|| anyhow!("requests_per_second must be > 0"))?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::keyed(Quota::per_second(per_second))),
        })
    }

    fn random_user_agent() -> &'static str {
        let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
        USER_AGENTS[index]
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, backoff::Error<anyhow::Error>> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", Self::random_user_agent())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| backoff::Error::transient(anyhow!("Failed to fetch URL: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let err = anyhow!("scraping error (status {})", status.as_u16());
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(backoff::Error::transient(err));
            }
            return Err(backoff::Error::permanent(err));
        }

        response
            .text()
            .await
            .map_err(|e| backoff::Error::transient(anyhow!("Failed to read response body: {}", e)))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| anyhow!("Invalid URL '{}': {}", url, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(anyhow!("URL must use HTTP or HTTPS protocol"));
        }
        let origin = parsed.origin().ascii_serialization();

        let html = retry(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(500))
                .with_max_interval(Duration::from_secs(2))
                .with_max_elapsed_time(Some(Duration::from_secs(6)))
                .build(),
            || async {
                self.limiter.until_key_ready(&origin).await;
                debug!("Fetching {}", url);
                self.fetch_once(url).await
            },
        )
        .await?;

        if html.trim().is_empty() {
            return Err(anyhow!("no content extracted from {}", url));
        }
        info!("Fetched {} ({} bytes)", url, html.len());
        Ok(html)
    }
}
