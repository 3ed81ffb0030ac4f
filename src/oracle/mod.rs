//! Text-generation collaborators used by the pipeline.
//!
//! Ranking, parsing and merging go through [`RecipeOracle`]. Implementations
//! own prompting and decoding; replies are JSON that may arrive wrapped in
//! code fences or prose, see [`json`].

pub mod json;
pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{MergeOutcome, MergeRecipeRequest, ParsedRecipe, RecipeCandidate};

pub use openai::{ChatClient, OpenAIOracle};

#[derive(Debug, Error)]
pub enum OracleError {
    /// Missing API key or invalid settings
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failure or timeout
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("API error: {0}")]
    Api(String),

    /// Reply did not contain the expected JSON
    #[error("parse error: {0}")]
    Parse(String),

    #[error("empty response from model")]
    Empty,
}

pub type Result<T> = std::result::Result<T, OracleError>;

#[async_trait]
pub trait RecipeOracle: Send + Sync {
    /// Picks up to `max` candidate URLs, best first.
    async fn rank(
        &self,
        dish_name: &str,
        request: &MergeRecipeRequest,
        candidates: &[RecipeCandidate],
        max: usize,
    ) -> Result<Vec<String>>;

    /// Turns extracted page content into a normalized recipe.
    async fn parse_recipe(&self, content: &str, source_url: &str) -> Result<ParsedRecipe>;

    /// Synthesizes one recipe plus substitutions and variations.
    async fn merge(&self, recipes: &[ParsedRecipe], request: &MergeRecipeRequest) -> Result<MergeOutcome>;
}
