//! Web search over the SearchAPI service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::AgentToolParameters;
use crate::error::Result;
use crate::provider::http::{shared_client, status_to_error};

pub const DEFAULT_SEARCH_URL: &str = "https://www.searchapi.io/api/v1/search";
pub const DEFAULT_ENGINE: &str = "baidu";
const MAX_RESULTS: usize = 5;

/// `web_search` tool: looks up current information on the internet.
///
/// Search failures are reported back to the model as text so the turn can
/// continue without the result.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    api_key: String,
    engine: String,
    base_url: String,
    parameters: AgentToolParameters,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            engine: DEFAULT_ENGINE.to_string(),
            base_url: DEFAULT_SEARCH_URL.to_string(),
            parameters: AgentToolParameters::object()
                .string("query", "What to search for", true)
                .build(),
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run one search and summarize the top results as text.
    pub async fn search(&self, query: &str) -> Result<String> {
        debug!(engine = %self.engine, query, "web search");
        let resp = shared_client()
            .get(&self.base_url)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body));
        }

        let data: SearchResponse = resp.json().await?;
        Ok(data.summarize())
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for up-to-date information such as weather, news and other real-time data."
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(&self, args: &ToolArguments, _ctx: &ToolExecutionContext) -> Result<Value> {
        let query = args.get_str("query")?;
        match self.search(query).await {
            Ok(text) => Ok(Value::String(text)),
            Err(e) => {
                warn!(error = %e, "web search failed");
                Ok(Value::String(format!("Search failed: {e}")))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: Option<String>,
}

impl SearchResponse {
    fn summarize(self) -> String {
        if let Some(answer) = self.answer_box.and_then(|b| b.answer.or(b.snippet)) {
            return answer;
        }
        let lines: Vec<String> = self
            .organic_results
            .into_iter()
            .take(MAX_RESULTS)
            .map(|r| match r.snippet {
                Some(snippet) => format!("{}: {}", r.title, snippet),
                None => r.title,
            })
            .collect();
        if lines.is_empty() {
            "No good search result found".to_string()
        } else {
            lines.join("\n")
        }
    }
}
