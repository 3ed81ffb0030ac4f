pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod jobs;
pub mod oracle;
pub mod pipeline;
pub mod scrape;
pub mod search;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::jobs::JobStore;
use crate::pipeline::RecipeMerger;

pub use types::*;

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
    pub merger: Arc<RecipeMerger>,
}

impl AppState {
    pub fn new(merger: Arc<RecipeMerger>, jobs: JobStore) -> Self {
        Self { jobs, merger }
    }

    /// Registers a job and starts it in the background; returns its id at once.
    pub fn submit_job(&self, request: MergeRecipeRequest) -> String {
        let job = self.jobs.create_job(request.clone());
        let job_id = job.id;

        let jobs = self.jobs.clone();
        let merger = self.merger.clone();
        let id = job_id.clone();
        let span = info_span!("merge_job", job_id = %job_id, dish = %request.dish_name);
        tokio::spawn(
            async move {
                let on_progress = |event: ProgressEvent| jobs.record(&id, event);
                match merger.run_with_deadline(&request, &on_progress).await {
                    Ok(result) => info!("Job completed: {}", result.merged_recipe.title),
                    Err(e) => warn!("Job failed: {}", e),
                }
            }
            .instrument(span),
        );

        job_id
    }

    pub fn job_status(&self, job_id: &str) -> Option<MergeJob> {
        self.jobs.get_job(job_id)
    }
}
