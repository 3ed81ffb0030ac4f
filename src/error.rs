//! Error types for the merge pipeline.

use thiserror::Error;

use crate::extract::ExtractError;
use crate::oracle::OracleError;

/// Failures raised while running a merge job.
///
/// The stage-fatal variants abort the job. `Fetch`, `Extract` and `Parse`
/// are per-URL failures that the fan-out records and moves past.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("search failed: {0:#}")]
    Search(anyhow::Error),

    #[error("ranking recipe candidates: {0}")]
    Rank(#[source] OracleError),

    #[error("no recipe URLs were selected by ranking")]
    NoRecipeUrls,

    #[error("fetching page: {0:#}")]
    Fetch(anyhow::Error),

    #[error("extracting recipe: {0}")]
    Extract(#[from] ExtractError),

    #[error("parsing recipe: {0}")]
    Parse(#[source] OracleError),

    #[error("need at least {required} successfully parsed recipes, got {parsed}")]
    InsufficientSources { parsed: usize, required: usize },

    #[error("merging recipes: {0}")]
    Merge(#[source] OracleError),

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error("job cancelled: deadline exceeded")]
    Cancelled,
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
