//! Scripted collaborators for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::config::MergeSettings;
use crate::oracle::{OracleError, RecipeOracle};
use crate::pipeline::RecipeMerger;
use crate::scrape::PageFetcher;
use crate::search::{CandidateSearch, SearchHit, WebSearch};
use crate::types::*;

/// Tracks how many calls are in flight at once.
#[derive(Clone, Default)]
pub struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

pub struct GaugeGuard(Arc<AtomicUsize>);

impl Gauge {
    pub fn enter(&self) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        GaugeGuard(self.current.clone())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How a scripted call for one URL behaves.
#[derive(Clone, Debug)]
pub enum Step {
    Succeed,
    Fail,
    /// Sleeps before succeeding.
    Slow(Duration),
}

impl Step {
    async fn play(&self, base_delay: Duration) -> bool {
        match self {
            Step::Succeed => {
                tokio::time::sleep(base_delay).await;
                true
            }
            Step::Fail => false,
            Step::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                true
            }
        }
    }
}

#[derive(Default)]
pub struct ScriptedSearch {
    results: HashMap<String, Vec<SearchHit>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    /// Serves `urls` as hits for the primary `<dish> recipe` query.
    pub fn with_urls(self, dish_name: &str, urls: &[String]) -> Self {
        let hits = urls
            .iter()
            .map(|url| SearchHit {
                link: url.clone(),
                title: format!("Recipe at {}", url),
                snippet: String::new(),
            })
            .collect();
        self.with_results(&format!("{} recipe", dish_name), hits)
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for ScriptedSearch {
    async fn search_page(&self, query: &str, start: usize, num: usize) -> anyhow::Result<Vec<SearchHit>> {
        self.calls.lock().unwrap().push((start, num));
        if self.failing.contains(query) {
            return Err(anyhow!("search API returned status 500"));
        }
        let hits = self.results.get(query).cloned().unwrap_or_default();
        Ok(hits.into_iter().skip(start - 1).take(num).collect())
    }
}

/// Serves `<article>` pages for any URL, with per-URL overrides.
#[derive(Default)]
pub struct ScriptedFetcher {
    base_delay: Duration,
    steps: HashMap<String, Step>,
    pub gauge: Gauge,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn step(mut self, url: &str, step: Step) -> Self {
        self.steps.insert(url.to_string(), step);
        self
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let _in_flight = self.gauge.enter();
        let step = self.steps.get(url).cloned().unwrap_or(Step::Succeed);
        if step.play(self.base_delay).await {
            Ok(format!(
                "<html><body><nav>menu</nav><article><h1>{}</h1><p>Cook it.</p></article></body></html>",
                url
            ))
        } else {
            Err(anyhow!("scraping error (status 503)"))
        }
    }
}

pub struct ScriptedOracle {
    ranking: Mutex<Option<Vec<String>>>,
    fail_merge: bool,
    parse_delay: Duration,
    parse_steps: HashMap<String, Step>,
    merged_sources: Mutex<Vec<String>>,
    pub parse_gauge: Gauge,
}

impl ScriptedOracle {
    /// Ranks the given URLs in order; `None` makes ranking fail.
    pub fn ranking(urls: Option<Vec<String>>) -> Self {
        Self {
            ranking: Mutex::new(urls),
            fail_merge: false,
            parse_delay: Duration::ZERO,
            parse_steps: HashMap::new(),
            merged_sources: Mutex::new(Vec::new()),
            parse_gauge: Gauge::default(),
        }
    }

    pub fn with_parse_delay(mut self, delay: Duration) -> Self {
        self.parse_delay = delay;
        self
    }

    pub fn parse_step(mut self, url: &str, step: Step) -> Self {
        self.parse_steps.insert(url.to_string(), step);
        self
    }

    pub fn failing_merge(mut self) -> Self {
        self.fail_merge = true;
        self
    }

    /// Source URLs handed to the last merge call.
    pub fn merged_sources(&self) -> Vec<String> {
        self.merged_sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeOracle for ScriptedOracle {
    async fn rank(
        &self,
        _dish_name: &str,
        _request: &MergeRecipeRequest,
        _candidates: &[RecipeCandidate],
        max: usize,
    ) -> Result<Vec<String>, OracleError> {
        match self.ranking.lock().unwrap().clone() {
            Some(urls) => Ok(urls.into_iter().take(max).collect()),
            None => Err(OracleError::Api("status 500: ranking unavailable".into())),
        }
    }

    async fn parse_recipe(&self, content: &str, source_url: &str) -> Result<ParsedRecipe, OracleError> {
        let _in_flight = self.parse_gauge.enter();
        let step = self.parse_steps.get(source_url).cloned().unwrap_or(Step::Succeed);
        if !step.play(self.parse_delay).await {
            return Err(OracleError::Parse("no JSON object or array found in response".into()));
        }
        Ok(ParsedRecipe {
            title: format!("Parsed {}", source_url),
            source_url: source_url.to_string(),
            ingredients: vec!["noodles".into()],
            steps: vec![content.chars().take(40).collect()],
            servings: 2,
            ..Default::default()
        })
    }

    async fn merge(&self, recipes: &[ParsedRecipe], request: &MergeRecipeRequest) -> Result<MergeOutcome, OracleError> {
        *self.merged_sources.lock().unwrap() = recipes.iter().map(|r| r.source_url.clone()).collect();
        if self.fail_merge {
            return Err(OracleError::Network("connection reset".into()));
        }
        Ok(MergeOutcome {
            merged_recipe: MergedRecipe {
                title: format!("Merged {}", request.dish_name),
                servings: 4,
                ..Default::default()
            },
            allergen_substitutions: vec![AllergenSubstitution {
                original: "fish sauce".into(),
                replacement: "soy sauce".into(),
                allergens_addressed: vec!["fish".into()],
                notes: String::new(),
            }],
            variation_suggestions: Vec::new(),
        })
    }
}

pub fn urls(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://site{}.com/{}/{}", i, prefix, i))
        .collect()
}

pub fn merger(
    search: Arc<ScriptedSearch>,
    fetcher: Arc<ScriptedFetcher>,
    oracle: Arc<ScriptedOracle>,
    settings: MergeSettings,
) -> RecipeMerger {
    RecipeMerger::new(CandidateSearch::new(search), fetcher, oracle, settings)
}
