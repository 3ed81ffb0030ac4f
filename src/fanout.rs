//! Bounded fetch-extract-parse over the ranked URLs.
//!
//! Every URL gets its own task. Fetches and oracle parses draw from two
//! separate semaphores, so a URL holds at most one slot at a time and a slow
//! parse never blocks the next fetch. Results land in a slot per rank and
//! are compacted in rank order once every task has settled.

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MergeSettings;
use crate::error::{PipelineError, Result};
use crate::extract::RecipeExtractor;
use crate::oracle::RecipeOracle;
use crate::pipeline::guarded;
use crate::scrape::PageFetcher;
use crate::types::ParsedRecipe;

#[derive(Debug, Clone)]
pub struct FanOutLimits {
    pub fetch_concurrency: usize,
    pub parse_concurrency: usize,
    pub fetch_timeout: Duration,
    pub parse_timeout: Duration,
    pub min_recipes: usize,
}

impl From<&MergeSettings> for FanOutLimits {
    fn from(settings: &MergeSettings) -> Self {
        Self {
            fetch_concurrency: settings.fetch_concurrency,
            parse_concurrency: settings.parse_concurrency,
            fetch_timeout: settings.fetch_timeout,
            parse_timeout: settings.oracle_timeout,
            min_recipes: settings.min_recipes,
        }
    }
}

#[derive(Debug)]
pub struct UrlFailure {
    pub url: String,
    pub error: PipelineError,
}

#[derive(Debug)]
pub struct FanOutReport {
    /// Successfully parsed recipes in rank order.
    pub recipes: Vec<ParsedRecipe>,
    /// Per-URL failures in rank order.
    pub failures: Vec<UrlFailure>,
}

pub struct FanOut<'a> {
    fetcher: &'a dyn PageFetcher,
    oracle: &'a dyn RecipeOracle,
    extractor: &'a RecipeExtractor,
    limits: FanOutLimits,
    fetch_slots: Semaphore,
    parse_slots: Semaphore,
}

impl<'a> FanOut<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        oracle: &'a dyn RecipeOracle,
        extractor: &'a RecipeExtractor,
        limits: FanOutLimits,
    ) -> Self {
        Self {
            fetcher,
            oracle,
            extractor,
            fetch_slots: Semaphore::new(limits.fetch_concurrency.max(1)),
            parse_slots: Semaphore::new(limits.parse_concurrency.max(1)),
            limits,
        }
    }

    /// Runs all URLs to completion and fails only when fewer than the
    /// minimum number of recipes parsed.
    pub async fn fetch_and_parse(&self, cancel: &CancellationToken, urls: &[String]) -> Result<FanOutReport> {
        let mut slots: Vec<Option<ParsedRecipe>> = (0..urls.len()).map(|_| None).collect();
        let mut failures = Vec::new();

        let mut pending: FuturesUnordered<_> = urls
            .iter()
            .enumerate()
            .map(|(index, url)| async move { (index, self.process(cancel, url).await) })
            .collect();

        while let Some((index, outcome)) = pending.next().await {
            let url = &urls[index];
            match outcome {
                Ok(recipe) => {
                    info!("Parsed recipe {} from {}", recipe.title, url);
                    slots[index] = Some(recipe);
                }
                Err(error) => {
                    warn!("Skipping {}: {}", url, error);
                    failures.push((index, UrlFailure { url: url.clone(), error }));
                }
            }
        }

        failures.sort_by_key(|(index, _)| *index);
        let recipes: Vec<ParsedRecipe> = slots.into_iter().flatten().collect();
        info!(
            "Fan-out finished: {} parsed, {} failed",
            recipes.len(),
            failures.len()
        );

        if recipes.len() < self.limits.min_recipes {
            return Err(PipelineError::InsufficientSources {
                parsed: recipes.len(),
                required: self.limits.min_recipes,
            });
        }

        Ok(FanOutReport {
            recipes,
            failures: failures.into_iter().map(|(_, failure)| failure).collect(),
        })
    }

    async fn process(&self, cancel: &CancellationToken, url: &str) -> Result<ParsedRecipe> {
        let html = {
            let _slot = acquire(cancel, &self.fetch_slots).await?;
            guarded(
                cancel,
                "fetch",
                self.limits.fetch_timeout,
                self.fetcher.fetch(url),
                PipelineError::Fetch,
            )
            .await?
        };

        let extracted = self.extractor.extract(&html)?;
        debug!(
            "Extracted {} bytes from {} via {:?} (structured: {})",
            extracted.content.len(),
            url,
            extracted.source,
            extracted.source.is_structured()
        );

        let _slot = acquire(cancel, &self.parse_slots).await?;
        let mut recipe = guarded(
            cancel,
            "parse",
            self.limits.parse_timeout,
            self.oracle.parse_recipe(&extracted.content, url),
            PipelineError::Parse,
        )
        .await?;
        recipe.source_url = url.to_string();
        Ok(recipe)
    }
}

async fn acquire<'s>(cancel: &CancellationToken, slots: &'s Semaphore) -> Result<SemaphorePermit<'s>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        permit = slots.acquire() => permit.map_err(|_| PipelineError::Cancelled),
    }
}
