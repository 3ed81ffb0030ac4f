//! OpenAI chat-completions backend for [`RecipeOracle`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::json::from_llm_text;
use super::{prompts, OracleError, RecipeOracle, Result};
use crate::config::OracleConfig;
use crate::types::{MergeOutcome, MergeRecipeRequest, ParsedRecipe, RecipeCandidate};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Minimal chat-completions client: one user message in, text out.
#[derive(Clone)]
pub struct ChatClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(config: &OracleConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(OracleError::Config("OPENAI_API_KEY not set".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Config(e.to_string()))?;
        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                OracleError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(OracleError::Api(format!("status {}: {}", status.as_u16(), error_text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "OpenAI chat completion"
        );

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OracleError::Empty)
    }
}

#[derive(Debug, Deserialize)]
struct RankingReply {
    #[serde(rename = "selectedUrls", default)]
    selected_urls: Vec<String>,
}

#[derive(Clone)]
pub struct OpenAIOracle {
    client: ChatClient,
}

impl OpenAIOracle {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecipeOracle for OpenAIOracle {
    async fn rank(
        &self,
        dish_name: &str,
        request: &MergeRecipeRequest,
        candidates: &[RecipeCandidate],
        max: usize,
    ) -> Result<Vec<String>> {
        let prompt = prompts::ranking_prompt(dish_name, request, candidates, max);
        let reply: RankingReply = from_llm_text(&self.client.complete(&prompt).await?)?;
        Ok(select_known_urls(reply.selected_urls, candidates, max))
    }

    async fn parse_recipe(&self, content: &str, source_url: &str) -> Result<ParsedRecipe> {
        let reply = self.client.complete(&prompts::parse_prompt(content)).await?;
        let mut parsed: ParsedRecipe = from_llm_text(&reply)?;
        parsed.source_url = source_url.to_string();
        Ok(parsed)
    }

    async fn merge(&self, recipes: &[ParsedRecipe], request: &MergeRecipeRequest) -> Result<MergeOutcome> {
        let reply = self.client.complete(&prompts::merge_prompt(recipes, request)).await?;
        from_llm_text(&reply)
    }
}

/// Keeps the model's order but drops duplicates and URLs it invented.
fn select_known_urls(selected: Vec<String>, candidates: &[RecipeCandidate], max: usize) -> Vec<String> {
    let known: HashSet<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
    let mut seen = HashSet::new();
    selected
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| {
            let ok = known.contains(url.as_str());
            if !ok {
                debug!("Ranking returned unknown URL {}", url);
            }
            ok
        })
        .filter(|url| seen.insert(url.clone()))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidate(url: &str) -> RecipeCandidate {
        RecipeCandidate {
            url: url.into(),
            title: String::new(),
            snippet: String::new(),
            domain: "a.com".into(),
        }
    }

    async fn oracle_replying(server: &MockServer, content: &str) -> OpenAIOracle {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })))
            .mount(server)
            .await;

        let client = ChatClient::new(
            &OracleConfig {
                api_key: "sk-test".into(),
                base_url: server.uri(),
                model: "gpt-test".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        OpenAIOracle::new(client)
    }

    #[test]
    fn ranking_keeps_order_and_drops_unknown() {
        let candidates = vec![candidate("https://a.com/1"), candidate("https://a.com/2"), candidate("https://a.com/3")];
        let selected = vec![
            "https://a.com/3".to_string(),
            "https://made-up.com/x".to_string(),
            " https://a.com/1 ".to_string(),
            "https://a.com/3".to_string(),
            "https://a.com/2".to_string(),
        ];
        assert_eq!(
            select_known_urls(selected, &candidates, 2),
            vec!["https://a.com/3".to_string(), "https://a.com/1".to_string()]
        );
    }

    #[tokio::test]
    async fn parse_recipe_tolerates_fenced_reply() {
        let server = MockServer::start().await;
        let oracle = oracle_replying(
            &server,
            "```json\n{\"title\":\"Pad Thai\",\"ingredients\":[\"noodles\"],\"steps\":[\"soak\"],\"servings\":2}\n```",
        )
        .await;

        let parsed = oracle.parse_recipe("<p>...</p>", "https://a.com/pad-thai").await.unwrap();
        assert_eq!(parsed.title, "Pad Thai");
        assert_eq!(parsed.source_url, "https://a.com/pad-thai");
        assert_eq!(parsed.servings, 2);
        assert_eq!(parsed.cook_time_minutes, 0);
    }

    #[tokio::test]
    async fn rank_filters_reply_to_candidates() {
        let server = MockServer::start().await;
        let oracle = oracle_replying(
            &server,
            "Picks:\n{\"selectedUrls\":[\"https://a.com/2\",\"https://other.com\"]}",
        )
        .await;

        let urls = oracle
            .rank(
                "pad thai",
                &MergeRecipeRequest::new("pad thai"),
                &[candidate("https://a.com/1"), candidate("https://a.com/2")],
                8,
            )
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://a.com/2".to_string()]);
    }

    #[tokio::test]
    async fn api_errors_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        let client = ChatClient::new(
            &OracleConfig {
                api_key: "sk-test".into(),
                base_url: server.uri(),
                model: "gpt-test".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client.complete("hi").await.unwrap_err();
        assert!(matches!(err, OracleError::Api(ref msg) if msg.contains("429")));
    }

    #[test]
    fn missing_key_is_config_error() {
        let result = ChatClient::new(
            &OracleConfig {
                api_key: String::new(),
                base_url: "http://localhost".into(),
                model: "m".into(),
            },
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(OracleError::Config(_))));
    }
}
