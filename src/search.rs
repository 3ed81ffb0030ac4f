use crate::config::SearchConfig;
use crate::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Results per upstream call; the Custom Search API caps `num` at 10.
pub const SEARCH_PAGE_SIZE: usize = 10;

/// One raw result from a keyword search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// Paginated keyword search. `start` is the 1-based index of the first result.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search_page(&self, query: &str, start: usize, num: usize) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

/// Google Custom Search JSON API client.
#[derive(Clone)]
pub struct GoogleSearch {
    http_client: reqwest::Client,
    api_key: String,
    engine_id: String,
    base_url: String,
    // key: query|start|num
    cache: moka::future::Cache<String, Vec<SearchHit>>,
}

impl GoogleSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(config, http_client))
    }

    pub fn with_client(config: &SearchConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            api_key: config.api_key.clone(),
            engine_id: config.engine_id.clone(),
            base_url: config.base_url.clone(),
            cache: moka::future::Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(60 * 10))
                .build(),
        }
    }
}

#[async_trait]
impl WebSearch for GoogleSearch {
    async fn search_page(&self, query: &str, start: usize, num: usize) -> Result<Vec<SearchHit>> {
        let cache_key = format!("{}|{}|{}", query, start, num);
        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!("search cache hit for query");
            return Ok(cached);
        }

        let params = [
            ("key", self.api_key.clone()),
            ("cx", self.engine_id.clone()),
            ("q", query.to_string()),
            ("num", num.to_string()),
            ("start", start.to_string()),
        ];

        let response: GoogleResponse = retry(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(200))
                .with_max_interval(Duration::from_secs(2))
                .with_max_elapsed_time(Some(Duration::from_secs(4)))
                .build(),
            || async {
                let resp = self
                    .http_client
                    .get(&self.base_url)
                    .query(&params)
                    .header("Accept", "application/json")
                    .send()
                    .await
                    .map_err(|e| backoff::Error::transient(anyhow!("Failed to send search request: {}", e)))?;
                let status = resp.status();
                if !status.is_success() {
                    let err = anyhow!("search API returned status {}", status.as_u16());
                    // 5xx and rate limiting are worth another try, other statuses are not
                    if status.is_server_error() || status.as_u16() == 429 {
                        return Err(backoff::Error::transient(err));
                    }
                    return Err(backoff::Error::permanent(err));
                }
                resp.json::<GoogleResponse>()
                    .await
                    .map_err(|e| backoff::Error::permanent(anyhow!("decoding search response: {}", e)))
            },
        )
        .await?;

        debug!("Search page start={} returned {} items", start, response.items.len());
        self.cache.insert(cache_key, response.items.clone()).await;
        Ok(response.items)
    }
}

/// Builds the recipe candidate list from a broad and a site-restricted query.
#[derive(Clone)]
pub struct CandidateSearch {
    engine: Arc<dyn WebSearch>,
}

impl CandidateSearch {
    pub fn new(engine: Arc<dyn WebSearch>) -> Self {
        Self { engine }
    }

    /// Runs both queries for `limit / 2` results each and merges them,
    /// primary results first. A failing secondary query is logged and skipped.
    pub async fn search(&self, dish_name: &str, limit: usize) -> Result<Vec<RecipeCandidate>> {
        let per_query = limit / 2;
        let main_query = format!("{} recipe", dish_name);

        let primary = self
            .search_with_pagination(&main_query, per_query)
            .await
            .map_err(|e| e.context("primary search failed"))?;
        info!("Primary search returned {} results", primary.len());

        let secondary = match self
            .search_with_pagination(&preferred_sites_query(dish_name), per_query)
            .await
        {
            Ok(found) => {
                info!("Secondary search returned {} results", found.len());
                found
            }
            Err(e) => {
                warn!("Secondary search failed: {:#}", e);
                Vec::new()
            }
        };

        let all = combine_candidates(primary, secondary);
        info!("Combined {} unique candidates for ranking", all.len());
        for (i, c) in all.iter().enumerate() {
            debug!("  Candidate[{}]: {} ({})", i + 1, c.title, c.domain);
        }
        Ok(all)
    }

    async fn search_with_pagination(&self, query: &str, limit: usize) -> Result<Vec<RecipeCandidate>> {
        let mut remaining = limit;
        let mut start = 1;
        let mut out = Vec::with_capacity(limit);
        let mut seen = HashSet::new();

        while remaining > 0 {
            let batch_size = remaining.min(SEARCH_PAGE_SIZE);
            let hits = self.engine.search_page(query, start, batch_size).await?;
            let exhausted = hits.len() < batch_size;

            for hit in hits {
                if !seen.insert(hit.link.clone()) {
                    continue;
                }
                let Some(domain) = candidate_domain(&hit.link) else {
                    continue;
                };
                out.push(RecipeCandidate {
                    url: hit.link,
                    title: hit.title,
                    snippet: hit.snippet,
                    domain,
                });
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }

            if exhausted {
                break;
            }
            start += batch_size;
        }

        Ok(out)
    }
}

/// Lower-cased host with a literal `www.` prefix removed.
pub fn candidate_domain(link: &str) -> Option<String> {
    let parsed = Url::parse(link).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

pub fn preferred_sites_query(dish_name: &str) -> String {
    let sites = PREFERRED_RECIPE_SITES
        .iter()
        .map(|site| format!("site:{}", site))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("{} recipe {}", dish_name, sites)
}

/// URL-deduplicated union; on conflict the primary entry wins.
fn combine_candidates(primary: Vec<RecipeCandidate>, secondary: Vec<RecipeCandidate>) -> Vec<RecipeCandidate> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(secondary)
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}
