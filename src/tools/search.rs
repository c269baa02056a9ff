use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::AUTHORIZATION };
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };

use super::{ AgentContext, Tool, ToolError };

pub const SEARCH_TOOL_NAME: &str = "search";

#[derive(Debug, Deserialize)]
pub struct SearchArgs {
    #[serde(default)]
    pub query: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

/// Web search through the Tavily API.
pub struct SearchTool {
    http: HttpClient,
    api_key: Option<String>,
    base_url: String,
}

impl SearchTool {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into(),
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Value, ToolError> {
        let api_key = self.api_key.as_deref().ok_or(ToolError::MissingApiKey("TAVILY_API_KEY"))?;
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        info!("Searching for '{}' (max {} results)", query, max_results);

        let resp = self.http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&(TavilyRequest { query, max_results }))
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::Status { status, body });
        }
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information. Use it for questions about recent events \
         or facts you are unsure of."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value, context: &AgentContext) -> Result<String, ToolError> {
        let args: SearchArgs = serde_json::from_value(args)?;
        let results = self.search(&args.query, context.max_search_results).await?;
        Ok(results.to_string())
    }
}
