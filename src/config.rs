use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-5-mini";

/// Limits and timeouts for one merge job.
#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// Candidates requested from search, split evenly between both queries.
    pub candidate_limit: usize,
    /// URLs the ranking oracle may select.
    pub max_ranked_urls: usize,
    /// Parsed recipes beyond this count are dropped before merging.
    pub target_recipes: usize,
    pub min_recipes: usize,
    pub fetch_concurrency: usize,
    pub parse_concurrency: usize,
    pub search_timeout: Duration,
    pub fetch_timeout: Duration,
    pub oracle_timeout: Duration,
    /// Wall-clock budget for the whole job.
    pub job_deadline: Duration,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            candidate_limit: 30,
            max_ranked_urls: 8,
            target_recipes: 5,
            min_recipes: 2,
            fetch_concurrency: 3,
            parse_concurrency: 3,
            search_timeout: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(45),
            oracle_timeout: Duration::from_secs(240),
            job_deadline: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: String,
    pub engine_id: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub requests_per_second: u32,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Unset means permissive CORS.
    pub allowed_origin: Option<String>,
    pub search: SearchConfig,
    pub oracle: OracleConfig,
    pub fetch: FetchConfig,
    pub merge: MergeSettings,
}

impl Config {
    /// Reads configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let fetch_defaults = FetchConfig::default();
        let mut merge = MergeSettings::default();
        if let Some(secs) = optional_parse::<u64>("JOB_DEADLINE_SECS")? {
            merge.job_deadline = Duration::from_secs(secs);
        }

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            allowed_origin: env::var("ALLOWED_ORIGIN").ok().filter(|v| !v.is_empty()),
            search: SearchConfig {
                api_key: required("GOOGLE_SEARCH_API_KEY")?,
                engine_id: required("GOOGLE_SEARCH_ENGINE_ID")?,
                base_url: env::var("GOOGLE_SEARCH_URL")
                    .unwrap_or_else(|_| DEFAULT_SEARCH_URL.to_string()),
            },
            oracle: OracleConfig {
                api_key: required("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_URL.to_string()),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            },
            fetch: FetchConfig {
                requests_per_second: optional_parse("FETCH_RATE_PER_SECOND")?
                    .unwrap_or(fetch_defaults.requests_per_second),
                timeout: optional_parse::<u64>("FETCH_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(fetch_defaults.timeout),
            },
            merge,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{} is required", key))
}

fn optional_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {}", key)),
        _ => Ok(None),
    }
}
