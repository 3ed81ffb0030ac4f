//! The merge pipeline: search, rank, fetch and parse, then merge.
//!
//! [`RecipeMerger::run`] drives one job and reports every stage change
//! through a progress callback. A job is bounded by a single cancellation
//! token: the deadline trips it, and every suspension point observes it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, MergeSettings};
use crate::error::{PipelineError, Result};
use crate::extract::RecipeExtractor;
use crate::fanout::{FanOut, FanOutLimits};
use crate::oracle::{ChatClient, OpenAIOracle, RecipeOracle};
use crate::scrape::{HttpFetcher, PageFetcher};
use crate::search::{CandidateSearch, GoogleSearch};
use crate::types::*;

/// Receives progress events in the order the pipeline emits them.
pub type ProgressFn<'a> = &'a (dyn Fn(ProgressEvent) + Send + Sync);

/// Awaits `call` unless the token fires or `limit` elapses first.
pub(crate) async fn guarded<T, E, F>(
    cancel: &CancellationToken,
    stage: &'static str,
    limit: Duration,
    call: F,
    wrap: fn(E) -> PipelineError,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(result) => result.map_err(wrap),
            Err(_) => Err(PipelineError::Timeout {
                stage,
                seconds: limit.as_secs(),
            }),
        },
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

pub struct RecipeMerger {
    search: CandidateSearch,
    fetcher: Arc<dyn PageFetcher>,
    oracle: Arc<dyn RecipeOracle>,
    extractor: RecipeExtractor,
    settings: MergeSettings,
}

impl RecipeMerger {
    pub fn new(
        search: CandidateSearch,
        fetcher: Arc<dyn PageFetcher>,
        oracle: Arc<dyn RecipeOracle>,
        settings: MergeSettings,
    ) -> Self {
        Self {
            search,
            fetcher,
            oracle,
            extractor: RecipeExtractor::default(),
            settings,
        }
    }

    /// Wires the production search, fetch and oracle backends.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let search = CandidateSearch::new(Arc::new(GoogleSearch::new(&config.search)?));
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let client = ChatClient::new(&config.oracle, config.merge.oracle_timeout)?;
        Ok(Self::new(
            search,
            fetcher,
            Arc::new(OpenAIOracle::new(client)),
            config.merge.clone(),
        ))
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// Runs a job to completion without progress reporting.
    pub async fn merge_recipes(&self, request: &MergeRecipeRequest) -> Result<MergeRecipeResponse> {
        self.run_with_deadline(request, &|_: ProgressEvent| {}).await
    }

    /// Runs a job under the configured wall-clock deadline.
    ///
    /// When the deadline passes the token is cancelled and the run unwinds
    /// from its next suspension point, so the job still ends with a
    /// `Failed` event.
    pub async fn run_with_deadline(
        &self,
        request: &MergeRecipeRequest,
        on_progress: ProgressFn<'_>,
    ) -> Result<MergeRecipeResponse> {
        let cancel = CancellationToken::new();
        let run = self.run(&cancel, request, on_progress);
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep(self.settings.job_deadline) => {
                warn!(
                    "Job deadline of {}s exceeded, cancelling",
                    self.settings.job_deadline.as_secs()
                );
                cancel.cancel();
                run.await
            }
        }
    }

    /// Runs every stage and emits exactly one terminal event.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        request: &MergeRecipeRequest,
        on_progress: ProgressFn<'_>,
    ) -> Result<MergeRecipeResponse> {
        info!("=== Merging recipes for: {} ===", request.dish_name);

        match self.run_stages(cancel, request, on_progress).await {
            Ok(result) => {
                info!(
                    "Merged {} sources into {}",
                    result.source_urls.len(),
                    result.merged_recipe.title
                );
                on_progress(ProgressEvent::complete(result.clone()));
                Ok(result)
            }
            Err(error) => {
                let error = if cancel.is_cancelled() {
                    PipelineError::Cancelled
                } else {
                    error
                };
                warn!("Merge failed: {}", error);
                on_progress(ProgressEvent::failed(error.to_string()));
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        cancel: &CancellationToken,
        request: &MergeRecipeRequest,
        on_progress: ProgressFn<'_>,
    ) -> Result<MergeRecipeResponse> {
        let s = &self.settings;

        // Search
        checkpoint(cancel)?;
        on_progress(ProgressEvent::new(JobStatus::Searching, "Searching for recipes..."));
        let candidates = guarded(
            cancel,
            "search",
            s.search_timeout,
            self.search.search(&request.dish_name, s.candidate_limit),
            PipelineError::Search,
        )
        .await?;
        on_progress(
            ProgressEvent::new(
                JobStatus::Searching,
                format!("Found {} recipes", candidates.len()),
            )
            .with_data(ProgressPayload::Candidates {
                count: candidates.len(),
            }),
        );

        // Rank
        checkpoint(cancel)?;
        on_progress(ProgressEvent::new(JobStatus::Ranking, "Sifting through the recipes..."));
        let mut selected = guarded(
            cancel,
            "ranking",
            s.oracle_timeout,
            self.oracle
                .rank(&request.dish_name, request, &candidates, s.max_ranked_urls),
            PipelineError::Rank,
        )
        .await?;
        selected.truncate(s.max_ranked_urls);
        if selected.is_empty() {
            return Err(PipelineError::NoRecipeUrls);
        }
        on_progress(
            ProgressEvent::new(
                JobStatus::Ranking,
                format!("Chose the {} best recipes", selected.len()),
            )
            .with_data(ProgressPayload::Selected {
                count: selected.len(),
            }),
        );

        // Fetch, extract, parse
        checkpoint(cancel)?;
        on_progress(ProgressEvent::new(JobStatus::Fetching, "Fetching recipe details..."));
        let fan_out = FanOut::new(
            self.fetcher.as_ref(),
            self.oracle.as_ref(),
            &self.extractor,
            FanOutLimits::from(s),
        );
        let report = fan_out.fetch_and_parse(cancel, &selected).await;
        // A deadline hit during the fan-out fails the job even if enough
        // recipes made it through.
        checkpoint(cancel)?;
        let report = report?;

        let parsed = report.recipes.len();
        on_progress(
            ProgressEvent::new(
                JobStatus::Fetching,
                format!(
                    "Fetched {} of {} recipes ({} failed)",
                    parsed,
                    selected.len(),
                    report.failures.len()
                ),
            )
            .with_data(ProgressPayload::Fetched {
                succeeded: parsed,
                failed: report.failures.len(),
            }),
        );

        let mut recipes = report.recipes;
        if recipes.len() > s.target_recipes {
            info!("Capping {} parsed recipes to {}", recipes.len(), s.target_recipes);
            recipes.truncate(s.target_recipes);
        }
        on_progress(
            ProgressEvent::new(
                JobStatus::Parsing,
                format!("Parsed {} recipes, merging the best {}", parsed, recipes.len()),
            )
            .with_data(ProgressPayload::Parsed {
                parsed,
                merging: recipes.len(),
            }),
        );

        // Merge
        checkpoint(cancel)?;
        on_progress(ProgressEvent::new(
            JobStatus::Merging,
            "Merging recipes into one...",
        ));
        let outcome = guarded(
            cancel,
            "merge",
            s.oracle_timeout,
            self.oracle.merge(&recipes, request),
            PipelineError::Merge,
        )
        .await?;

        Ok(MergeRecipeResponse {
            merged_recipe: outcome.merged_recipe,
            source_urls: recipes.iter().map(|r| r.source_url.clone()).collect(),
            allergen_substitutions: outcome.allergen_substitutions,
            variation_suggestions: outcome.variation_suggestions,
        })
    }
}
