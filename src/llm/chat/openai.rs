use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use serde_json::Value;

use super::{ error_for_status, ChatModel, ToolSpec };
use crate::llm::{ LlmConfig, LlmError, LlmType };
use crate::models::message::{ Message, ToolCall };

/// Client for the OpenAI chat completions API and the providers that mirror
/// it (DeepSeek, Groq, xAI).
pub struct OpenAIChatClient {
    http: HttpClient,
    auth: HeaderValue,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAITool<'a>>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct OpenAITool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSpec,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

fn function_type() -> String {
    "function".to_string()
}

pub fn default_base_url(llm_type: LlmType) -> &'static str {
    match llm_type {
        LlmType::DeepSeek => "https://api.deepseek.com",
        LlmType::Groq => "https://api.groq.com/openai",
        LlmType::XAI => "https://api.x.ai",
        LlmType::OpenAI | LlmType::Ollama => "https://api.openai.com",
    }
}

impl OpenAIChatClient {
    pub fn new(api_key: String, model: Option<String>, base_url: String) -> Result<Self, LlmError> {
        Self::with_http(HttpClient::new(), &api_key, model, base_url)
    }

    /// Builds a client on a shared connection pool.
    pub fn with_http(
        http: HttpClient,
        api_key: &str,
        model: Option<String>,
        base_url: String
    ) -> Result<Self, LlmError> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key))?;

        Ok(Self {
            http,
            auth,
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig, http: HttpClient) -> Result<Self, LlmError> {
        let api_key = config.api_key.as_deref().ok_or(LlmError::MissingApiKey(config.llm_type))?;
        let base_url = config.base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.llm_type).to_string());

        Self::with_http(http, api_key, config.completion_model.clone(), base_url)
    }

    fn to_openai_message(message: &Message) -> OpenAIMessage {
        let (role, tool_calls, tool_call_id) = match message {
            Message::System { .. } => ("system", None, None),
            Message::Human { .. } => ("user", None, None),
            Message::Assistant { tool_calls, .. } => {
                let calls = (!tool_calls.is_empty()).then(|| {
                    tool_calls
                        .iter()
                        .map(|call| OpenAIToolCall {
                            id: call.id.clone(),
                            call_type: function_type(),
                            function: OpenAIFunctionCall {
                                name: call.name.clone(),
                                arguments: call.args.to_string(),
                            },
                        })
                        .collect()
                });
                ("assistant", calls, None)
            }
            Message::Tool { tool_call_id, .. } => ("tool", None, Some(tool_call_id.clone())),
        };

        OpenAIMessage {
            role: role.to_string(),
            content: Some(message.content().to_string()),
            tool_calls,
            tool_call_id,
        }
    }

    fn from_openai_message(message: OpenAIMessage) -> Message {
        let tool_calls = message.tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let args = if call.function.arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                        warn!(
                            "Invalid arguments for tool '{}': {} ({})",
                            call.function.name,
                            call.function.arguments,
                            e
                        );
                        Value::Object(Default::default())
                    })
                };
                ToolCall { id: call.id, name: call.function.name, args }
            })
            .collect();

        Message::Assistant {
            content: message.content.unwrap_or_default(),
            tool_calls,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAIChatClient {
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let req = OpenAIChatRequest {
            model: &self.model,
            messages: messages.iter().map(Self::to_openai_message).collect(),
            tools: tools
                .iter()
                .map(|spec| OpenAITool { tool_type: "function", function: spec })
                .collect(),
        };
        debug!("OpenAI-compatible request to {} with {} messages", url, req.messages.len());

        let resp = self.http
            .post(&url)
            .header(AUTHORIZATION, self.auth.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&req)
            .send().await?;
        let resp = error_for_status(resp).await?.json::<OpenAIResponse>().await?;

        let choice = resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))?;

        Ok(Self::from_openai_message(choice.message))
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{ body_partial_json, header, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn client(server: &MockServer) -> OpenAIChatClient {
        OpenAIChatClient::new("test-key".into(), Some("gpt-4o-mini".into()), server.uri()).unwrap()
    }

    fn search_spec() -> ToolSpec {
        ToolSpec {
            name: "search".into(),
            description: "Search the web".into(),
            parameters: json!({ "type": "object", "properties": { "query": { "type": "string" } } }),
        }
    }

    #[tokio::test]
    async fn parses_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "tools": [{ "type": "function", "function": { "name": "search" } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": { "name": "search", "arguments": "{\"query\":\"rust\"}" }
                        }]
                    }
                }]
            })))
            .mount(&server).await;

        let reply = client(&server)
            .invoke(&[Message::human("find rust news")], &[search_spec()]).await
            .unwrap();

        assert_eq!(reply.content(), "");
        assert_eq!(reply.tool_calls().len(), 1);
        assert_eq!(reply.tool_calls()[0].id, "call_abc");
        assert_eq!(reply.tool_calls()[0].args, json!({ "query": "rust" }));
    }

    #[tokio::test]
    async fn sends_tool_results_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hi" },
                    { "role": "assistant", "tool_calls": [{ "id": "c1", "function": { "name": "search" } }] },
                    { "role": "tool", "tool_call_id": "c1", "content": "result" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "done" } }]
            })))
            .mount(&server).await;

        let messages = vec![
            Message::system("be brief"),
            Message::human("hi"),
            Message::Assistant {
                content: String::new(),
                tool_calls: vec![ToolCall { id: "c1".into(), name: "search".into(), args: json!({}) }],
            },
            Message::Tool { content: "result".into(), tool_call_id: "c1".into(), name: "search".into() }
        ];
        let reply = client(&server).invoke(&messages, &[]).await.unwrap();
        assert_eq!(reply, Message::assistant("done"));
    }

    #[tokio::test]
    async fn reports_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server).await;

        let err = client(&server).invoke(&[Message::human("hi")], &[]).await.unwrap_err();
        match err {
            LlmError::Status { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn missing_key_is_rejected() {
        let config = LlmConfig { llm_type: LlmType::DeepSeek, ..LlmConfig::default() };
        assert!(matches!(
            OpenAIChatClient::from_config(&config, HttpClient::new()),
            Err(LlmError::MissingApiKey(LlmType::DeepSeek))
        ));
    }
}
