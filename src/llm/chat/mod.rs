pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use super::{ LlmConfig, LlmError, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::message::Message;

/// What the model is told about a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends the conversation and returns the next assistant message, which
    /// may carry tool calls instead of (or next to) text.
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError>;

    fn model_name(&self) -> String;
}

/// Wraps `http` for the configured provider and model. The wrapper is cheap;
/// the connection pool lives in `http`.
pub fn new_client(config: &LlmConfig, http: &HttpClient) -> Result<Arc<dyn ChatModel>, LlmError> {
    let client: Arc<dyn ChatModel> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config, http.clone())?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI | LlmType::DeepSeek | LlmType::Groq | LlmType::XAI => {
            let specific_client = OpenAIChatClient::from_config(config, http.clone())?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// Reads a provider error body so the status can be reported with it.
pub(crate) async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Status { status, body })
}
