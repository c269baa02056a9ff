use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use async_trait::async_trait;
use super::{ error_for_status, ChatModel, ToolSpec };
use crate::llm::{ LlmConfig, LlmError, LlmType };
use crate::models::message::{ Message, ToolCall };
use uuid::Uuid;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSpec,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        Self::with_http(HttpClient::new(), base_url, completion_model)
    }

    pub fn with_http(
        http: HttpClient,
        base_url: Option<String>,
        completion_model: Option<String>
    ) -> Self {
        Self {
            http,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".into()),
            completion_model: completion_model.unwrap_or_else(|| "llama3.1".to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig, http: HttpClient) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Ollama {
            return Err(LlmError::UnsupportedProvider(config.llm_type.to_string()));
        }

        Ok(Self::with_http(http, config.base_url.clone(), config.completion_model.clone()))
    }

    fn to_ollama_message(message: &Message) -> OllamaMessage {
        let role = match message {
            Message::System { .. } => "system",
            Message::Human { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        };
        OllamaMessage {
            role: role.to_string(),
            content: message.content().to_string(),
            tool_calls: message
                .tool_calls()
                .iter()
                .map(|call| OllamaToolCall {
                    function: OllamaFunctionCall {
                        name: call.name.clone(),
                        arguments: call.args.clone(),
                    },
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = ChatRequest {
            model: &self.completion_model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            tools: tools
                .iter()
                .map(|spec| OllamaTool { tool_type: "function", function: spec })
                .collect(),
            stream: false,
        };

        let resp = self.http.post(&url).json(&req).send().await?;
        let data = error_for_status(resp).await?.json::<ChatResponse>().await?;

        // Ollama does not number its tool calls.
        let tool_calls = data.message.tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: Uuid::new_v4().to_string(),
                name: call.function.name,
                args: match call.function.arguments {
                    Value::Null => Value::Object(Default::default()),
                    args => args,
                },
            })
            .collect();

        Ok(Message::Assistant { content: data.message.content, tool_calls })
    }

    fn model_name(&self) -> String {
        self.completion_model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{ body_partial_json, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    #[tokio::test]
    async fn generates_ids_for_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({ "model": "llama3.1", "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{ "function": { "name": "search", "arguments": { "query": "tokio" } } }]
                },
                "done": true
            })))
            .mount(&server).await;

        let client = OllamaClient::new(Some(server.uri()), Some("llama3.1".into()));
        let reply = client.invoke(&[Message::human("look up tokio")], &[]).await.unwrap();

        let calls = reply.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].args, json!({ "query": "tokio" }));
        assert!(!calls[0].id.is_empty());
    }

    #[tokio::test]
    async fn plain_answer_has_no_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "Hello!" },
                "done": true
            })))
            .mount(&server).await;

        let client = OllamaClient::new(Some(server.uri()), None);
        let reply = client.invoke(&[Message::human("hi")], &[]).await.unwrap();
        assert_eq!(reply, Message::assistant("Hello!"));
    }

    #[test]
    fn rejects_foreign_config() {
        let config = LlmConfig { llm_type: LlmType::OpenAI, ..LlmConfig::default() };
        assert!(OllamaClient::from_config(&config, HttpClient::new()).is_err());
    }
}
